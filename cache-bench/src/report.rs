//! Per-second and end-of-run reporting.
//!
//! Each row is the difference between two [`Sample`]s: worker counters plus
//! a [`CacheStats`] snapshot, so eviction pressure, table growth and segment
//! imbalance show up next to throughput.

use crate::metrics;
use crate::worker::BenchCache;

use metriken::{AtomicHistogram, histogram::Histogram};
use offheap_cache::CacheStats;
use std::time::Instant;

/// Counters and cache statistics at one instant.
pub struct Sample {
    at: Instant,
    completed: u64,
    hits: u64,
    misses: u64,
    puts: u64,
    put_rejects: u64,
    latency: Option<Histogram>,
    stats: CacheStats,
}

impl Sample {
    pub fn take(cache: &BenchCache) -> Self {
        Self {
            at: Instant::now(),
            completed: metrics::completed(),
            hits: metrics::CACHE_HITS.value(),
            misses: metrics::CACHE_MISSES.value(),
            puts: metrics::PUT_COUNT.value(),
            put_rejects: metrics::put_rejects(),
            latency: metrics::RESPONSE_LATENCY.load(),
            stats: cache.stats(),
        }
    }
}

/// Latency percentiles in microseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Latency {
    pub p50: f64,
    pub p99: f64,
    pub p999: f64,
    pub max: f64,
}

impl Latency {
    pub fn of(histogram: &Histogram) -> Self {
        let Ok(Some(results)) = histogram.percentiles(&[50.0, 99.0, 99.9, 100.0]) else {
            return Self::default();
        };
        let us = |i: usize| {
            results
                .get(i)
                .map_or(0.0, |(_, bucket)| bucket.end() as f64 / 1000.0)
        };
        Self {
            p50: us(0),
            p99: us(1),
            p999: us(2),
            max: us(3),
        }
    }

    fn load(histogram: &AtomicHistogram) -> Self {
        histogram.load().map(|h| Self::of(&h)).unwrap_or_default()
    }

    fn between(previous: Option<&Histogram>, current: Option<&Histogram>) -> Self {
        match (current, previous) {
            (Some(current), Some(previous)) => current
                .wrapping_sub(previous)
                .map(|delta| Self::of(&delta))
                .unwrap_or_default(),
            (Some(current), None) => Self::of(current),
            (None, _) => Self::default(),
        }
    }
}

/// Rates between two samples.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Interval {
    pub secs: f64,
    pub ops_per_sec: f64,
    pub hit_pct: f64,
    /// Share of puts the cache rejected.
    pub reject_pct: f64,
    pub evictions_per_sec: f64,
    pub resizes: u64,
    pub utilization: f64,
    pub skew: f64,
    pub latency: Latency,
}

impl Interval {
    pub fn between(previous: &Sample, current: &Sample) -> Self {
        let secs = current.at.duration_since(previous.at).as_secs_f64();
        let per_sec = |n: u64| if secs > 0.0 { n as f64 / secs } else { 0.0 };

        let hits = current.hits - previous.hits;
        let gets = hits + current.misses - previous.misses;
        let puts = current.puts - previous.puts;

        Self {
            secs,
            ops_per_sec: per_sec(current.completed - previous.completed),
            hit_pct: percent(hits, gets),
            reject_pct: percent(current.put_rejects - previous.put_rejects, puts),
            evictions_per_sec: per_sec(current.stats.evictions - previous.stats.evictions),
            resizes: current.stats.resizes - previous.stats.resizes,
            utilization: current.stats.utilization(),
            skew: skew(&current.stats.segment_sizes),
            latency: Latency::between(previous.latency.as_ref(), current.latency.as_ref()),
        }
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Largest segment over the mean segment size. 1.0 is perfectly even.
pub fn skew(segment_sizes: &[usize]) -> f64 {
    let total: usize = segment_sizes.iter().sum();
    let largest = segment_sizes.iter().copied().max().unwrap_or(0);
    if total == 0 {
        return 1.0;
    }
    largest as f64 * segment_sizes.len() as f64 / total as f64
}

pub fn print_header() {
    println!(
        "{:>11} {:>6} {:>8} {:>10} {:>6} {:>6} {:>5} {:>9} {:>9}",
        "ops/s", "hit%", "reject%", "evict/s", "resize", "util%", "skew", "p50(us)", "p99(us)",
    );
}

pub fn print_row(interval: &Interval) {
    println!(
        "{:>11.0} {:>6.1} {:>8.2} {:>10.0} {:>6} {:>6.1} {:>5.2} {:>9.1} {:>9.1}",
        interval.ops_per_sec,
        interval.hit_pct,
        interval.reject_pct,
        interval.evictions_per_sec,
        interval.resizes,
        interval.utilization,
        interval.skew,
        interval.latency.p50,
        interval.latency.p99,
    );
}

/// Print the whole measured run, from `first` to `last`.
pub fn print_summary(first: &Sample, last: &Sample) {
    let run = Interval::between(first, last);
    let stats = &last.stats;

    eprintln!();
    eprintln!("measured {:.1}s", run.secs);
    eprintln!(
        "  throughput   {:.0} ops/s ({} ops)",
        run.ops_per_sec,
        last.completed - first.completed
    );
    eprintln!("  hit rate     {:.1}%", run.hit_pct);
    eprintln!(
        "  put rejects  {:.2}% (out of capacity {}, other {})",
        run.reject_pct,
        metrics::PUT_OUT_OF_CAPACITY.value(),
        metrics::PUT_ERRORS.value()
    );
    eprintln!(
        "  read errors  get {}, remove {}",
        metrics::GET_ERRORS.value(),
        metrics::REMOVE_ERRORS.value()
    );
    eprintln!();
    eprintln!(
        "  entries      {} in {} segments (skew {:.2})",
        stats.size,
        stats.segment_sizes.len(),
        run.skew
    );
    eprintln!(
        "  memory       {} / {} bytes ({:.1}%)",
        stats.memory_used, stats.capacity, run.utilization
    );
    eprintln!(
        "  evictions    {} ({:.0}/s)",
        stats.evictions - first.stats.evictions,
        run.evictions_per_sec
    );
    eprintln!(
        "  resizes      {} (largest table {})",
        run.resizes,
        stats.table_lengths.iter().max().copied().unwrap_or(0)
    );
    eprintln!();

    for (label, histogram) in [
        ("get", &metrics::GET_LATENCY),
        ("put", &metrics::PUT_LATENCY),
        ("remove", &metrics::REMOVE_LATENCY),
        ("all", &metrics::RESPONSE_LATENCY),
    ] {
        let l = Latency::load(histogram);
        eprintln!(
            "  {label:<7} p50 {:.1}us  p99 {:.1}us  p999 {:.1}us  max {:.1}us",
            l.p50, l.p99, l.p999, l.max
        );
    }
}
