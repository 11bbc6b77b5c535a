//! In-process benchmark for the off-heap cache.
//!
//! Worker threads call the cache directly with a configurable get/put/remove
//! mix. Every second the monitor prints throughput and latency alongside the
//! cache's own view of the run: put rejections, evictions, table growth,
//! memory utilization and how evenly keys spread over segments.

mod affinity;
mod config;
mod logging;
mod metrics;
mod report;
mod worker;

use crate::config::Config;
use crate::report::{Interval, Sample};
use crate::worker::{BenchCache, Control};

use clap::Parser;
use offheap_cache::{BytesSerializer, CacheBuilder};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type BoxError = Box<dyn std::error::Error>;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "offheap-cache-bench")]
#[command(about = "In-process off-heap cache benchmark")]
struct Args {
    /// Path to configuration file
    config: PathBuf,
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    if let Err(e) = run(&config) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), BoxError> {
    let cpus = match &config.general.cpu_list {
        Some(list) => config::parse_cpu_list(list).map_err(|e| format!("invalid cpu_list: {e}"))?,
        None => Vec::new(),
    };

    let cache: BenchCache = CacheBuilder::from_config(config.cache.clone())
        .key_serializer(BytesSerializer)
        .value_serializer(BytesSerializer)
        .build()?;
    tracing::info!(
        segments = cache.segment_count(),
        capacity = cache.capacity(),
        table = config.cache.hash_table_size,
        policy = %config.cache.eviction_policy,
        threads = config.general.threads,
        keys = config.workload.keyspace.count,
        "cache ready"
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    if config.workload.prefill {
        prefill(config, &cache);
    }

    let control = Control::default();
    let samples = thread::scope(|scope| -> Result<_, BoxError> {
        for id in 0..config.general.threads {
            let cpu = affinity::cpu_for(id, &cpus);
            let control = &control;
            let cache = &cache;
            let spawned = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn_scoped(scope, move || {
                    if let Some(cpu) = cpu
                        && let Err(e) = affinity::pin_current_thread(cpu)
                    {
                        tracing::warn!(worker = id, cpu, error = %e, "failed to pin worker");
                    }
                    worker::run(id, &config.workload, cache, control);
                });
            if let Err(e) = spawned {
                control.stop();
                return Err(e.into());
            }
        }

        let samples = monitor(config, &cache, &control, &interrupted);
        control.stop();
        Ok(samples)
    })?;

    if let Some((first, last)) = samples {
        report::print_summary(&first, &last);
    }

    cache.close();
    Ok(())
}

/// Write every key once, split evenly across the worker threads.
fn prefill(config: &Config, cache: &BenchCache) {
    let started = Instant::now();
    let ranges = prefill_ranges(config.workload.keyspace.count, config.general.threads);

    let rejected: usize = thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .into_iter()
            .enumerate()
            .map(|(id, range)| {
                scope.spawn(move || worker::prefill(cache, &config.workload, range, id as u64))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
    });

    if rejected > 0 {
        tracing::warn!(rejected, "prefill puts rejected");
    }
    tracing::info!(
        entries = cache.size(),
        memory_used = cache.memory_used(),
        elapsed = ?started.elapsed(),
        "prefill complete"
    );
}

/// Contiguous, non-overlapping ranges covering `0..count`, one per thread.
fn prefill_ranges(count: usize, threads: usize) -> Vec<Range<usize>> {
    let chunk = count.div_ceil(threads.max(1));
    (0..threads)
        .map(|i| (i * chunk).min(count)..((i + 1) * chunk).min(count))
        .collect()
}

/// Run warmup then the measured phase, printing one row per interval.
/// Returns the first and last samples of the measured phase, or `None` if
/// interrupted during warmup.
fn monitor(
    config: &Config,
    cache: &BenchCache,
    control: &Control,
    interrupted: &AtomicBool,
) -> Option<(Sample, Sample)> {
    if !config.general.warmup.is_zero() {
        tracing::info!(warmup = ?config.general.warmup, "warming up");
    }
    if !sleep_until(Instant::now() + config.general.warmup, interrupted) {
        return None;
    }

    control.start_recording();
    tracing::info!(duration = ?config.general.duration, "recording");
    let end = Instant::now() + config.general.duration;
    let first = Sample::take(cache);
    let mut previous = Sample::take(cache);
    report::print_header();

    loop {
        let tick = (Instant::now() + REPORT_INTERVAL).min(end);
        let finished = !sleep_until(tick, interrupted) || Instant::now() >= end;

        let current = Sample::take(cache);
        report::print_row(&Interval::between(&previous, &current));
        previous = current;

        if finished {
            break;
        }
    }

    Some((first, previous))
}

/// Sleep until `deadline`. Returns false if interrupted first.
fn sleep_until(deadline: Instant, interrupted: &AtomicBool) -> bool {
    loop {
        if interrupted.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(Duration::from_millis(50)));
    }
}
