//! Cache statistics.
//!
//! - [`SegmentStats`] - counters and gauges of one segment
//! - [`CacheStats`] - totals across every segment of a cache

/// Snapshot of a single segment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStats {
    /// Number of entries.
    pub entries: usize,
    /// Bytes held by entry blocks.
    pub bytes_used: usize,
    /// Byte budget of the segment.
    pub capacity: usize,
    /// Current bucket table length.
    pub table_length: usize,
    /// Lookups that found their key.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
    /// Writes that added a new key.
    pub puts_added: u64,
    /// Writes that replaced an existing value.
    pub puts_replaced: u64,
    /// Writes rejected with an error.
    pub put_failures: u64,
    /// Successful removals.
    pub removes: u64,
    /// Entries evicted to make room.
    pub evictions: u64,
    /// Table doublings.
    pub resizes: u64,
}

/// Snapshot of a whole cache.
///
/// Segments are read one at a time, so totals taken under concurrent
/// writes are not an atomic snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries.
    pub size: usize,
    /// Bytes held by entry blocks.
    pub memory_used: usize,
    /// Configured total capacity.
    pub capacity: usize,
    /// Lookups that found their key.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
    /// Writes that added a new key.
    pub puts_added: u64,
    /// Writes that replaced an existing value.
    pub puts_replaced: u64,
    /// Writes rejected with an error.
    pub put_failures: u64,
    /// Successful removals.
    pub removes: u64,
    /// Entries evicted to make room.
    pub evictions: u64,
    /// Table doublings.
    pub resizes: u64,
    /// Entry count of each segment.
    pub segment_sizes: Vec<usize>,
    /// Bucket table length of each segment.
    pub table_lengths: Vec<usize>,
}

impl CacheStats {
    /// Sum per-segment snapshots.
    pub fn from_segments(capacity: usize, segments: impl IntoIterator<Item = SegmentStats>) -> Self {
        let mut stats = CacheStats {
            capacity,
            ..Default::default()
        };

        for segment in segments {
            stats.size += segment.entries;
            stats.memory_used += segment.bytes_used;
            stats.hits += segment.hits;
            stats.misses += segment.misses;
            stats.puts_added += segment.puts_added;
            stats.puts_replaced += segment.puts_replaced;
            stats.put_failures += segment.put_failures;
            stats.removes += segment.removes;
            stats.evictions += segment.evictions;
            stats.resizes += segment.resizes;
            stats.segment_sizes.push(segment.entries);
            stats.table_lengths.push(segment.table_length);
        }

        stats
    }

    /// Get hit rate as a percentage (0.0 - 100.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Get memory utilization as a percentage (0.0 - 100.0).
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.memory_used as f64 / self.capacity as f64) * 100.0
        }
    }
}
