//! Error types for cache operations.

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The entry cannot be stored even after evicting every other entry in
    /// its segment, or the arena ceiling was reached.
    #[error("out of capacity")]
    OutOfCapacity,

    /// The encoded entry is larger than the configured maximum entry size.
    #[error("entry too large ({size} bytes, max {max})")]
    EntryTooLarge {
        /// Encoded record size in bytes.
        size: usize,
        /// Configured maximum entry size in bytes.
        max: usize,
    },

    /// A serializer could not decode the stored bytes.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The cache configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while validating or loading a [`CacheConfig`].
///
/// [`CacheConfig`]: crate::CacheConfig
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Segment count is zero, not a power of two, or above the ceiling.
    #[error("segment count must be a power of two between 1 and {max} (got {got})")]
    InvalidSegmentCount {
        /// Requested segment count.
        got: usize,
        /// Largest accepted segment count.
        max: usize,
    },
    /// Initial hash table size is zero, not a power of two, or too large.
    #[error("hash table size must be a power of two between 1 and {max} (got {got})")]
    InvalidHashTableSize {
        /// Requested table size.
        got: usize,
        /// Largest accepted table size.
        max: usize,
    },
    /// Bucket length of zero.
    #[error("bucket length must be at least 1")]
    InvalidBucketLength,
    /// Capacity too small to give every segment a share.
    #[error(
        "capacity must be at least one byte per segment (got {capacity} for {segments} segments)"
    )]
    InvalidCapacity {
        /// Requested capacity in bytes.
        capacity: usize,
        /// Configured segment count.
        segments: usize,
    },
    /// Load factor that is not a positive finite number.
    #[error("load factor must be a positive finite number (got {0})")]
    InvalidLoadFactor(String),
    /// Max entry size that no segment could ever hold.
    #[error(
        "max entry size {max_entry_size} exceeds the per-segment capacity of {segment_capacity}"
    )]
    InvalidMaxEntrySize {
        /// Requested max entry size.
        max_entry_size: usize,
        /// Capacity share of a single segment.
        segment_capacity: usize,
    },
    /// Key or value serializer not supplied to the builder.
    #[error("no {0} serializer configured")]
    MissingSerializer(&'static str),
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(String),
    /// Config file is not valid TOML for a cache config.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
