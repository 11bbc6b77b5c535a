//! Threads that drive the cache.

use crate::config::{CommandsConfig, WorkloadConfig};
use crate::metrics;

use metriken::{AtomicHistogram, Counter};
use offheap_cache::{CacheError, CacheResult, OffHeapCache};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// The cache type under test.
pub type BenchCache = OffHeapCache<Vec<u8>, Vec<u8>>;

/// Flags the monitor flips to steer running workers.
#[derive(Default)]
pub struct Control {
    recording: AtomicBool,
    stop: AtomicBool,
}

impl Control {
    /// Start counting operations. Everything before this is warmup.
    pub fn start_recording(&self) {
        self.recording.store(true, Ordering::Release);
    }

    /// Ask every worker to return.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Put,
    Remove,
}

/// Maps a roll in `0..100` onto the configured command percentages.
#[derive(Debug, Clone, Copy)]
pub struct Mix {
    get_below: u8,
    put_below: u8,
}

impl Mix {
    pub fn new(commands: &CommandsConfig) -> Self {
        Self {
            get_below: commands.get,
            put_below: commands.get + commands.set,
        }
    }

    pub fn pick(&self, roll: u8) -> Op {
        if roll < self.get_below {
            Op::Get
        } else if roll < self.put_below {
            Op::Put
        } else {
            Op::Remove
        }
    }
}

/// Write each key id in `range` once. Returns how many puts were rejected.
pub fn prefill(cache: &BenchCache, workload: &WorkloadConfig, range: Range<usize>, seed: u64) -> usize {
    let mut key = vec![0u8; workload.keyspace.length];
    let mut value = vec![0u8; workload.values.length];
    Xoshiro256PlusPlus::seed_from_u64(seed).fill_bytes(&mut value);

    range
        .filter(|&id| {
            encode_key(&mut key, id);
            cache.put(&key, &value).is_err()
        })
        .count()
}

/// Issue random operations until `control` says stop.
pub fn run(id: usize, workload: &WorkloadConfig, cache: &BenchCache, control: &Control) {
    let mix = Mix::new(&workload.commands);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x0ff_4ea9 ^ id as u64);
    let mut key = vec![0u8; workload.keyspace.length];
    let mut value = vec![0u8; workload.values.length];

    while !control.is_stopped() {
        encode_key(&mut key, rng.random_range(0..workload.keyspace.count));
        let op = mix.pick(rng.random_range(0..100));
        if op == Op::Put {
            rng.fill_bytes(&mut value);
        }

        let start = Instant::now();
        let outcome = match op {
            Op::Get => cache.get(&key).map(|v| v.is_some()),
            Op::Put => cache.put(&key, &value).map(|_| true),
            Op::Remove => cache.remove(&key).map(|v| v.is_some()),
        };
        let latency_ns = start.elapsed().as_nanos() as u64;

        if control.is_recording() {
            record(op, &outcome, latency_ns);
        }
    }
}

fn record(op: Op, outcome: &CacheResult<bool>, latency_ns: u64) {
    let (count, latency): (&Counter, &AtomicHistogram) = match op {
        Op::Get => (&metrics::GET_COUNT, &metrics::GET_LATENCY),
        Op::Put => (&metrics::PUT_COUNT, &metrics::PUT_LATENCY),
        Op::Remove => (&metrics::REMOVE_COUNT, &metrics::REMOVE_LATENCY),
    };
    count.increment();
    let _ = latency.increment(latency_ns);
    let _ = metrics::RESPONSE_LATENCY.increment(latency_ns);

    if let Some(counter) = outcome_counter(op, outcome) {
        counter.increment();
    }
}

fn outcome_counter(op: Op, outcome: &CacheResult<bool>) -> Option<&'static Counter> {
    match (op, outcome) {
        (Op::Get, Ok(true)) => Some(&metrics::CACHE_HITS),
        (Op::Get, Ok(false)) => Some(&metrics::CACHE_MISSES),
        (Op::Get, Err(_)) => Some(&metrics::GET_ERRORS),
        (Op::Put, Err(CacheError::OutOfCapacity)) => Some(&metrics::PUT_OUT_OF_CAPACITY),
        (Op::Put, Err(_)) => Some(&metrics::PUT_ERRORS),
        (Op::Remove, Err(_)) => Some(&metrics::REMOVE_ERRORS),
        (Op::Put | Op::Remove, Ok(_)) => None,
    }
}

/// Fill `buf` with the big-endian id, zero padded on the left. Keys shorter
/// than eight bytes keep the low-order bytes.
fn encode_key(buf: &mut [u8], id: usize) {
    let id = (id as u64).to_be_bytes();
    let n = buf.len().min(id.len());
    let split = buf.len() - n;
    buf[..split].fill(0);
    buf[split..].copy_from_slice(&id[id.len() - n..]);
}
