//! Configuration for the in-process cache benchmark.

use offheap_cache::CacheConfig;
use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration.
#[derive(Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    /// Cache settings, validated by the cache itself.
    #[serde(default)]
    pub cache: CacheConfig,
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General benchmark settings.
#[derive(Deserialize)]
pub struct GeneralConfig {
    /// How long to run the measurement phase.
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// How long to warm up before recording metrics.
    #[serde(deserialize_with = "deserialize_duration")]
    pub warmup: Duration,
    /// Number of worker threads.
    pub threads: usize,
    /// Optional list of CPU cores to pin workers to (e.g., "0-3,6-8").
    pub cpu_list: Option<String>,
}

/// Workload configuration.
#[derive(Deserialize)]
pub struct WorkloadConfig {
    /// Whether to prefill the cache before measurement.
    #[serde(default)]
    pub prefill: bool,
    /// Keyspace parameters.
    pub keyspace: KeyspaceConfig,
    /// Command mix (must sum to 100).
    pub commands: CommandsConfig,
    /// Value parameters.
    pub values: ValuesConfig,
}

/// Keyspace configuration.
#[derive(Deserialize)]
pub struct KeyspaceConfig {
    /// Key length in bytes.
    pub length: usize,
    /// Number of distinct keys.
    pub count: usize,
}

/// Command mix (percentages, must sum to 100).
#[derive(Deserialize)]
pub struct CommandsConfig {
    pub get: u8,
    pub set: u8,
    pub delete: u8,
}

/// Value configuration.
#[derive(Deserialize)]
pub struct ValuesConfig {
    /// Value length in bytes.
    pub length: usize,
}

/// Log output format.
#[derive(Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

/// Logging configuration. `RUST_LOG` overrides `level` when set.
#[derive(Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            thread_names: false,
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        // Validate command mix
        let total = config.workload.commands.get as u16
            + config.workload.commands.set as u16
            + config.workload.commands.delete as u16;
        if total != 100 {
            return Err(format!(
                "command mix must sum to 100 (got {}): get={} set={} delete={}",
                total,
                config.workload.commands.get,
                config.workload.commands.set,
                config.workload.commands.delete,
            )
            .into());
        }

        if config.general.threads == 0 {
            return Err("threads must be at least 1".into());
        }

        if config.workload.keyspace.count == 0 {
            return Err("keyspace count must be at least 1".into());
        }

        config.cache.validate()?;

        Ok(config)
    }
}

/// Deserialize a duration from a human-readable string (e.g., "60s", "5m").
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parse a CPU list string like "0-3,6-8" into a Vec of CPU IDs.
pub fn parse_cpu_list(s: &str) -> Result<Vec<usize>, String> {
    let mut cpus = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start
                .trim()
                .parse()
                .map_err(|e| format!("invalid CPU id '{}': {}", start, e))?;
            let end: usize = end
                .trim()
                .parse()
                .map_err(|e| format!("invalid CPU id '{}': {}", end, e))?;
            if start > end {
                return Err(format!("invalid range {}-{}", start, end));
            }
            cpus.extend(start..=end);
        } else {
            let cpu: usize = part
                .parse()
                .map_err(|e| format!("invalid CPU id '{}': {}", part, e))?;
            cpus.push(cpu);
        }
    }
    Ok(cpus)
}
