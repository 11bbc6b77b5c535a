//! Worker-side metrics. Only operations issued while recording are counted.

use metriken::{AtomicHistogram, Counter, metric};

#[metric(name = "get_count", description = "GET operations")]
pub static GET_COUNT: Counter = Counter::new();

#[metric(name = "put_count", description = "PUT operations")]
pub static PUT_COUNT: Counter = Counter::new();

#[metric(name = "remove_count", description = "REMOVE operations")]
pub static REMOVE_COUNT: Counter = Counter::new();

#[metric(name = "cache_hits", description = "GETs that found their key")]
pub static CACHE_HITS: Counter = Counter::new();

#[metric(name = "cache_misses", description = "GETs that did not")]
pub static CACHE_MISSES: Counter = Counter::new();

#[metric(
    name = "put_out_of_capacity",
    description = "PUTs rejected because the entry could not fit its segment"
)]
pub static PUT_OUT_OF_CAPACITY: Counter = Counter::new();

#[metric(name = "put_errors", description = "PUTs failing for any other reason")]
pub static PUT_ERRORS: Counter = Counter::new();

#[metric(name = "get_errors", description = "GETs returning an error")]
pub static GET_ERRORS: Counter = Counter::new();

#[metric(name = "remove_errors", description = "REMOVEs returning an error")]
pub static REMOVE_ERRORS: Counter = Counter::new();

#[metric(
    name = "response_latency",
    description = "Latency of every operation (nanoseconds)"
)]
pub static RESPONSE_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(name = "get_latency", description = "GET latency (nanoseconds)")]
pub static GET_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(name = "put_latency", description = "PUT latency (nanoseconds)")]
pub static PUT_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(name = "remove_latency", description = "REMOVE latency (nanoseconds)")]
pub static REMOVE_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

/// Total operations recorded so far.
pub fn completed() -> u64 {
    GET_COUNT.value() + PUT_COUNT.value() + REMOVE_COUNT.value()
}

/// PUTs rejected for any reason.
pub fn put_rejects() -> u64 {
    PUT_OUT_OF_CAPACITY.value() + PUT_ERRORS.value()
}
