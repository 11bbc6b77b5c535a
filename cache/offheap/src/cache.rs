//! Typed cache facade.
//!
//! [`OffHeapCache`] serializes keys and values, hashes the key bytes, routes
//! to a segment and runs the operation under that segment's lock. At most one
//! segment lock is held at any time.

use std::sync::Arc;

use crate::arena::Arena;
use crate::config::{CacheConfig, EvictionPolicy};
use crate::entry;
use crate::error::{CacheResult, ConfigError};
use crate::router::SegmentRouter;
use crate::segment::{Segment, SegmentOptions};
use crate::serializer::{CacheSerializer, to_bytes};
use crate::stats::CacheStats;

/// A segmented key-value cache whose entries live outside the Rust heap
/// objects of the caller, in blocks drawn from a capacity-bounded arena.
///
/// # Example
///
/// ```
/// use offheap_cache::{OffHeapCache, StringSerializer, U64Serializer};
///
/// let cache: OffHeapCache<String, u64> = OffHeapCache::builder()
///     .capacity(1024 * 1024)
///     .segment_count(4)
///     .key_serializer(StringSerializer)
///     .value_serializer(U64Serializer)
///     .build()
///     .unwrap();
///
/// cache.put(&"answer".to_string(), &42).unwrap();
/// assert_eq!(cache.get(&"answer".to_string()).unwrap(), Some(42));
/// ```
pub struct OffHeapCache<K, V> {
    segments: Box<[Segment]>,
    router: SegmentRouter,
    arena: Arc<Arena>,
    config: CacheConfig,
    key_serializer: Box<dyn CacheSerializer<K>>,
    value_serializer: Box<dyn CacheSerializer<V>>,
}

impl<K, V> OffHeapCache<K, V> {
    /// Create a builder with default settings.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    fn new(
        config: CacheConfig,
        key_serializer: Box<dyn CacheSerializer<K>>,
        value_serializer: Box<dyn CacheSerializer<V>>,
    ) -> Self {
        let arena = Arc::new(Arena::new(config.capacity));
        let options = SegmentOptions {
            capacity: config.segment_capacity(),
            table_length: config.hash_table_size,
            load_factor: config.load_factor,
            max_entry_size: config.max_entry_size,
            eviction_policy: config.eviction_policy,
        };

        let segments = (0..config.segment_count)
            .map(|_| Segment::new(arena.clone(), options))
            .collect();

        tracing::debug!(
            segments = config.segment_count,
            capacity = config.capacity,
            segment_capacity = options.capacity,
            hash_table_size = config.hash_table_size,
            max_entry_size = config.max_entry_size,
            eviction_policy = %config.eviction_policy,
            "built off-heap cache"
        );

        Self {
            segments,
            router: SegmentRouter::new(config.segment_count),
            arena,
            config,
            key_serializer,
            value_serializer,
        }
    }

    #[inline]
    fn segment(&self, hash: u64) -> &Segment {
        &self.segments[self.router.route(hash)]
    }

    /// Serialize and hash a key.
    #[inline]
    fn key_bytes(&self, key: &K) -> (u64, Vec<u8>) {
        let bytes = to_bytes(&*self.key_serializer, key);
        (self.router.hash(&bytes), bytes)
    }

    /// Serialize a value and check the resulting entry against the max
    /// entry size.
    fn value_bytes(&self, key: &[u8], value: &V) -> CacheResult<Vec<u8>> {
        let bytes = to_bytes(&*self.value_serializer, value);
        entry::check_size(key.len(), bytes.len(), self.config.max_entry_size)?;
        Ok(bytes)
    }

    fn decode_value(&self, bytes: &[u8]) -> CacheResult<V> {
        let mut buf = bytes;
        self.value_serializer.deserialize(&mut buf)
    }

    /// Insert or replace a value, returning the previous one.
    ///
    /// Fails with [`EntryTooLarge`] before any segment is touched, or with
    /// [`OutOfCapacity`] if the entry cannot fit in its segment even when
    /// empty. If the previous value cannot be deserialized the call fails
    /// with [`CorruptData`] and the stored entry is left unchanged.
    ///
    /// [`EntryTooLarge`]: crate::CacheError::EntryTooLarge
    /// [`OutOfCapacity`]: crate::CacheError::OutOfCapacity
    /// [`CorruptData`]: crate::CacheError::CorruptData
    pub fn put(&self, key: &K, value: &V) -> CacheResult<Option<V>> {
        let (hash, key) = self.key_bytes(key);
        let value = self.value_bytes(&key, value)?;

        self.segment(hash)
            .insert(hash, &key, &value, |old| self.decode_value(old))
    }

    /// Insert a value only if the key is absent. Returns whether it was
    /// inserted.
    pub fn put_if_absent(&self, key: &K, value: &V) -> CacheResult<bool> {
        let (hash, key) = self.key_bytes(key);
        let value = self.value_bytes(&key, value)?;

        self.segment(hash).insert_if_absent(hash, &key, &value)
    }

    /// Replace the value for `key` only if it currently equals `old`,
    /// compared by serialized bytes. Returns whether it was replaced.
    pub fn add_or_replace(&self, key: &K, old: &V, new: &V) -> CacheResult<bool> {
        let (hash, key) = self.key_bytes(key);
        let expected = to_bytes(&*self.value_serializer, old);
        let value = self.value_bytes(&key, new)?;

        self.segment(hash).replace_if(hash, &key, &expected, &value)
    }

    /// Look up a value. A hit marks the entry most recently used.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        let (hash, key) = self.key_bytes(key);

        self.segment(hash)
            .lookup(hash, &key)
            .map(|value| self.decode_value(&value))
            .transpose()
    }

    /// Check for a key without affecting its recency.
    pub fn contains_key(&self, key: &K) -> CacheResult<bool> {
        let (hash, key) = self.key_bytes(key);
        Ok(self.segment(hash).contains(hash, &key))
    }

    /// Remove a key, returning its value.
    ///
    /// A value that cannot be deserialized fails the call with
    /// [`CorruptData`](crate::CacheError::CorruptData) and stays cached.
    pub fn remove(&self, key: &K) -> CacheResult<Option<V>> {
        let (hash, key) = self.key_bytes(key);

        self.segment(hash)
            .remove(hash, &key, |value| self.decode_value(value))
    }

    /// Remove every key in `keys`, returning how many were present.
    pub fn remove_all<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> usize
    where
        K: 'a,
    {
        keys.into_iter()
            .filter(|key| {
                let (hash, key) = self.key_bytes(key);
                matches!(self.segment(hash).remove(hash, &key, |_| Ok(())), Ok(Some(())))
            })
            .count()
    }

    /// Up to `n` of the most recently used keys.
    ///
    /// Recency is only ordered within a segment, so the result interleaves
    /// each segment's hottest keys rank by rank.
    pub fn hot_keys(&self, n: usize) -> CacheResult<Vec<K>> {
        let per_segment: Vec<Vec<Vec<u8>>> = self
            .segments
            .iter()
            .map(|segment| segment.hot_keys(n))
            .collect();

        let mut keys = Vec::with_capacity(n.min(self.size()));
        let mut rank = 0;
        while keys.len() < n {
            let mut found = false;
            for segment_keys in &per_segment {
                if let Some(key) = segment_keys.get(rank) {
                    found = true;
                    let mut buf = key.as_slice();
                    keys.push(self.key_serializer.deserialize(&mut buf)?);
                    if keys.len() == n {
                        break;
                    }
                }
            }
            if !found {
                break;
            }
            rank += 1;
        }

        Ok(keys)
    }

    /// Remove every entry from every segment.
    pub fn clear(&self) {
        for segment in self.segments.iter() {
            segment.clear();
        }
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(Segment::is_empty)
    }

    /// Bytes held by entries, including headers.
    pub fn memory_used(&self) -> usize {
        self.segments.iter().map(Segment::bytes_used).sum()
    }

    /// Configured total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Capacity not currently held by entries.
    pub fn free_capacity(&self) -> usize {
        self.capacity().saturating_sub(self.memory_used())
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.router.segment_count()
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Counters and gauges summed across segments.
    pub fn stats(&self) -> CacheStats {
        CacheStats::from_segments(
            self.config.capacity,
            self.segments.iter().map(Segment::stats),
        )
    }

    /// Zero every segment's operation counters.
    pub fn reset_stats(&self) {
        for segment in self.segments.iter() {
            segment.reset_stats();
        }
    }

    /// Release every entry and then the arena.
    ///
    /// Dropping the cache does the same; `close` only makes the point of
    /// release explicit.
    pub fn close(self) {
        let entries = self.size();
        self.clear();
        tracing::debug!(entries, "closed off-heap cache");
    }
}

impl<K, V> std::fmt::Debug for OffHeapCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffHeapCache")
            .field("segments", &self.segments.len())
            .field("config", &self.config)
            .field("arena", &self.arena)
            .finish()
    }
}

/// Builder for [`OffHeapCache`].
///
/// Starts from [`CacheConfig::default`]. Both serializers are required.
pub struct CacheBuilder<K, V> {
    config: CacheConfig,
    key_serializer: Option<Box<dyn CacheSerializer<K>>>,
    value_serializer: Option<Box<dyn CacheSerializer<V>>>,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheBuilder<K, V> {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(CacheConfig::default())
    }

    /// Create a builder starting from an existing config, for example one
    /// loaded with [`CacheConfig::load`].
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            key_serializer: None,
            value_serializer: None,
        }
    }

    /// Set the number of segments (power of two).
    pub fn segment_count(mut self, count: usize) -> Self {
        self.config.segment_count = count;
        self
    }

    /// Set the initial bucket table length per segment (power of two).
    pub fn hash_table_size(mut self, size: usize) -> Self {
        self.config.hash_table_size = size;
        self
    }

    /// Set the expected bucket chain length.
    pub fn bucket_length(mut self, length: usize) -> Self {
        self.config.bucket_length = length;
        self
    }

    /// Set the total capacity in bytes.
    pub fn capacity(mut self, bytes: usize) -> Self {
        self.config.capacity = bytes;
        self
    }

    /// Set the load factor that triggers a table resize.
    pub fn load_factor(mut self, load_factor: f32) -> Self {
        self.config.load_factor = load_factor;
        self
    }

    /// Set the max encoded entry size in bytes (0 = unlimited).
    pub fn max_entry_size(mut self, bytes: usize) -> Self {
        self.config.max_entry_size = bytes;
        self
    }

    /// Set the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    /// Set the key serializer.
    pub fn key_serializer(mut self, serializer: impl CacheSerializer<K> + 'static) -> Self {
        self.key_serializer = Some(Box::new(serializer));
        self
    }

    /// Set the value serializer.
    pub fn value_serializer(mut self, serializer: impl CacheSerializer<V> + 'static) -> Self {
        self.value_serializer = Some(Box::new(serializer));
        self
    }

    /// Validate the configuration and build the cache.
    pub fn build(self) -> CacheResult<OffHeapCache<K, V>> {
        let key_serializer = self
            .key_serializer
            .ok_or(ConfigError::MissingSerializer("key"))?;
        let value_serializer = self
            .value_serializer
            .ok_or(ConfigError::MissingSerializer("value"))?;

        self.config.validate()?;

        Ok(OffHeapCache::new(
            self.config,
            key_serializer,
            value_serializer,
        ))
    }
}
