//! Segmented key-value cache with entries stored in manually managed memory.
//!
//! Keys and values are serialized into blocks allocated from a
//! capacity-bounded arena. The keyspace is split across independently locked
//! segments, each with its own chained hash table and recency list, so
//! operations on different segments never contend.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------+
//! |                 OffHeapCache<K, V>               |
//! |  key/value serializers -> bytes                  |
//! |                                                  |
//! |  +--------------------------------------------+  |
//! |  | SegmentRouter                              |  |
//! |  | - ahash of key bytes                       |  |
//! |  | - high bits pick the segment               |  |
//! |  +--------------------------------------------+  |
//! |        |                                         |
//! |        v                                         |
//! |  +--------------------------------------------+  |
//! |  | Segment (x segment_count, one Mutex each)  |  |
//! |  | - bucket table, low hash bits              |  |
//! |  | - LRU list, byte budget, eviction, resize  |  |
//! |  +--------------------------------------------+  |
//! |        |                                         |
//! |        v                                         |
//! |  +--------------------------------------------+  |
//! |  | Arena (shared, atomic byte accounting)     |  |
//! |  | [header][key][value] blocks                |  |
//! |  +--------------------------------------------+  |
//! +--------------------------------------------------+
//! ```
//!
//! # Memory Management
//!
//! The total capacity is split evenly between segments. A write that would
//! push its segment over its share first evicts from the tail of that
//! segment's recency list. Entries are owned exclusively by their segment and
//! go back to the arena on removal, eviction, [`OffHeapCache::clear`],
//! [`OffHeapCache::close`] or drop.
//!
//! # Example
//!
//! ```
//! use offheap_cache::{BytesSerializer, OffHeapCache};
//!
//! let cache: OffHeapCache<Vec<u8>, Vec<u8>> = OffHeapCache::builder()
//!     .capacity(16 * 1024 * 1024)
//!     .segment_count(8)
//!     .max_entry_size(64 * 1024)
//!     .key_serializer(BytesSerializer)
//!     .value_serializer(BytesSerializer)
//!     .build()
//!     .unwrap();
//!
//! cache.put(&b"key".to_vec(), &b"value".to_vec()).unwrap();
//! assert_eq!(cache.get(&b"key".to_vec()).unwrap(), Some(b"value".to_vec()));
//!
//! cache.close();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod arena;
mod cache;
mod config;
mod entry;
mod error;
mod router;
mod segment;
mod serializer;
mod stats;
mod sync;

pub use cache::{CacheBuilder, OffHeapCache};
pub use config::{CacheConfig, EvictionPolicy, MAX_SEGMENT_COUNT, parse_size};
pub use entry::{HEADER_SIZE, record_size};
pub use error::{CacheError, CacheResult, ConfigError};
pub use segment::MAX_TABLE_LENGTH;
pub use serializer::{BytesSerializer, CacheSerializer, StringSerializer, U64Serializer};
pub use stats::{CacheStats, SegmentStats};
