//! Cache configuration.
//!
//! A [`CacheConfig`] can be built in code or loaded from TOML:
//!
//! ```toml
//! segment_count = 16
//! hash_table_size = 8192
//! capacity = "256MB"
//! max_entry_size = "1MB"
//! eviction_policy = "lru"
//! ```
//!
//! Missing fields take their defaults. Sizes accept plain byte counts or
//! strings with a `KB`/`MB`/`GB`/`TB` suffix.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::segment::MAX_TABLE_LENGTH;

/// Largest supported number of segments.
pub const MAX_SEGMENT_COUNT: usize = 1 << 30;

/// Default initial bucket table length per segment.
pub const DEFAULT_HASH_TABLE_SIZE: usize = 8192;

/// Default bucket length hint.
pub const DEFAULT_BUCKET_LENGTH: usize = 8;

/// Default total capacity (64MB).
pub const DEFAULT_CAPACITY: usize = 64 * 1024 * 1024;

/// Default load factor.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Which entry a full segment gives up first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least recently used entry. Hits promote entries.
    #[default]
    Lru,
    /// Evict the oldest inserted entry. Hits do not change the order.
    Fifo,
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "lru"),
            EvictionPolicy::Fifo => write!(f, "fifo"),
        }
    }
}

/// Configuration for an [`OffHeapCache`].
///
/// [`OffHeapCache`]: crate::OffHeapCache
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Number of independently locked segments (power of two).
    pub segment_count: usize,
    /// Initial bucket table length of each segment (power of two).
    pub hash_table_size: usize,
    /// Expected chain length. Reported but does not drive resizing.
    pub bucket_length: usize,
    /// Total byte budget, split evenly between segments.
    #[serde(deserialize_with = "deserialize_size")]
    pub capacity: usize,
    /// Entries per bucket above which a segment's table doubles.
    pub load_factor: f32,
    /// Largest encoded entry accepted, 0 for no limit beyond the segment
    /// share.
    #[serde(deserialize_with = "deserialize_size")]
    pub max_entry_size: usize,
    /// Eviction order within a segment.
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            segment_count: round_up_to_power_of_two(parallelism * 2, MAX_SEGMENT_COUNT),
            hash_table_size: DEFAULT_HASH_TABLE_SIZE,
            bucket_length: DEFAULT_BUCKET_LENGTH,
            capacity: DEFAULT_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            max_entry_size: 0,
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field and the relations between them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.segment_count.is_power_of_two() || self.segment_count > MAX_SEGMENT_COUNT {
            return Err(ConfigError::InvalidSegmentCount {
                got: self.segment_count,
                max: MAX_SEGMENT_COUNT,
            });
        }

        if !self.hash_table_size.is_power_of_two() || self.hash_table_size > MAX_TABLE_LENGTH {
            return Err(ConfigError::InvalidHashTableSize {
                got: self.hash_table_size,
                max: MAX_TABLE_LENGTH,
            });
        }

        if self.bucket_length == 0 {
            return Err(ConfigError::InvalidBucketLength);
        }

        if !self.load_factor.is_finite() || self.load_factor <= 0.0 {
            return Err(ConfigError::InvalidLoadFactor(self.load_factor.to_string()));
        }

        if self.capacity < self.segment_count {
            return Err(ConfigError::InvalidCapacity {
                capacity: self.capacity,
                segments: self.segment_count,
            });
        }

        let segment_capacity = self.segment_capacity();
        if self.max_entry_size > segment_capacity {
            return Err(ConfigError::InvalidMaxEntrySize {
                max_entry_size: self.max_entry_size,
                segment_capacity,
            });
        }

        Ok(())
    }

    /// Byte budget of a single segment.
    #[inline]
    pub fn segment_capacity(&self) -> usize {
        self.capacity / self.segment_count.max(1)
    }
}

/// Smallest power of two `>= n`, clamped to `[1, max]`. `max` must itself be
/// a power of two.
pub fn round_up_to_power_of_two(n: usize, max: usize) -> usize {
    debug_assert!(max.is_power_of_two());

    if n >= max {
        return max;
    }
    n.max(1).next_power_of_two()
}

/// Deserialize a size given as a number or a string like "64MB".
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Number(usize),
        String(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(D::Error::custom),
    }
}

/// Parse a size string like "512KB", "64MB" or "4GB" into bytes.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| c.is_alphabetic()) {
        Some(idx) => (&s[..idx], s[idx..].to_uppercase()),
        None => (s, String::new()),
    };

    let num: usize = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {num_str}"))?;

    let multiplier: usize = match suffix.as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(format!("unknown size suffix: {suffix}")),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size overflow".to_string())
}
