//! Behavioural tests for OffHeapCache through its public API.

#![cfg(not(feature = "loom"))]

use offheap_cache::{
    BytesSerializer, CacheConfig, CacheError, CacheResult, CacheSerializer, EvictionPolicy,
    OffHeapCache, StringSerializer, U64Serializer, record_size,
};

type ByteCache = OffHeapCache<Vec<u8>, Vec<u8>>;

/// Key/value bytes are stored with a 4-byte length prefix each.
const PREFIX: usize = 4;

fn byte_cache(segments: usize, capacity: usize, max_entry_size: usize) -> ByteCache {
    OffHeapCache::builder()
        .segment_count(segments)
        .hash_table_size(16)
        .capacity(capacity)
        .max_entry_size(max_entry_size)
        .key_serializer(BytesSerializer)
        .value_serializer(BytesSerializer)
        .build()
        .expect("Failed to create cache")
}

/// A value that makes `key` encode to exactly `size` bytes.
fn value_for_record(key: &[u8], size: usize) -> Vec<u8> {
    let len = size - record_size(key.len() + PREFIX, PREFIX);
    vec![key[key.len() - 1]; len]
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_round_trip() {
    let cache: OffHeapCache<String, String> = OffHeapCache::builder()
        .segment_count(4)
        .capacity(1024 * 1024)
        .key_serializer(StringSerializer)
        .value_serializer(StringSerializer)
        .build()
        .expect("Failed to create cache");

    for i in 0..1000 {
        cache
            .put(&format!("key-{i}"), &format!("value-{i}"))
            .expect("PUT failed");
    }

    assert_eq!(cache.size(), 1000);
    for i in 0..1000 {
        assert_eq!(
            cache.get(&format!("key-{i}")).unwrap(),
            Some(format!("value-{i}"))
        );
    }
}

#[test]
fn test_empty_key_and_value() {
    let cache = byte_cache(1, 4096, 0);

    cache.put(&vec![], &vec![]).unwrap();
    assert_eq!(cache.get(&vec![]).unwrap(), Some(vec![]));
    assert_eq!(cache.memory_used(), record_size(PREFIX, PREFIX));
}

#[test]
fn test_put_returns_previous() {
    let cache = byte_cache(2, 4096, 0);
    let key = b"key".to_vec();

    assert_eq!(cache.put(&key, &b"a".to_vec()).unwrap(), None);
    assert_eq!(cache.put(&key, &b"bb".to_vec()).unwrap(), Some(b"a".to_vec()));
    assert_eq!(
        cache.put(&key, &b"c".to_vec()).unwrap(),
        Some(b"bb".to_vec())
    );
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_idempotent_remove() {
    let cache = byte_cache(2, 4096, 0);
    let key = b"key".to_vec();

    assert_eq!(cache.remove(&key).unwrap(), None);
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.memory_used(), 0);

    cache.put(&b"other".to_vec(), &b"x".to_vec()).unwrap();
    cache.put(&key, &b"value".to_vec()).unwrap();
    let size = cache.size();
    let used = cache.memory_used();

    assert_eq!(cache.remove(&key).unwrap(), Some(b"value".to_vec()));
    assert_eq!(cache.size(), size - 1);
    assert!(cache.memory_used() < used);

    let used = cache.memory_used();
    assert_eq!(cache.remove(&key).unwrap(), None);
    assert_eq!(cache.size(), size - 1);
    assert_eq!(cache.memory_used(), used);
}

#[test]
fn test_contains_key_does_not_promote() {
    let record = 100;
    let cache = byte_cache(1, 3 * record, 0);

    let keys: Vec<Vec<u8>> = [b"A", b"B", b"C", b"D"].iter().map(|k| k.to_vec()).collect();
    for key in &keys[..3] {
        cache.put(key, &value_for_record(key, record)).unwrap();
    }

    assert!(cache.contains_key(&keys[0]).unwrap());
    cache.put(&keys[3], &value_for_record(&keys[3], record)).unwrap();

    assert!(!cache.contains_key(&keys[0]).unwrap());
}

#[test]
fn test_entry_too_large() {
    let cache = byte_cache(1, 4096, 200);
    cache.put(&b"small".to_vec(), &b"value".to_vec()).unwrap();

    let size = cache.size();
    let used = cache.memory_used();

    let err = cache.put(&b"big".to_vec(), &vec![0u8; 200]).unwrap_err();
    assert_eq!(
        err,
        CacheError::EntryTooLarge {
            size: record_size(3 + PREFIX, 200 + PREFIX),
            max: 200
        }
    );

    assert_eq!(cache.size(), size);
    assert_eq!(cache.memory_used(), used);
    assert_eq!(cache.get(&b"big".to_vec()).unwrap(), None);
}

#[test]
fn test_out_of_capacity() {
    // No max entry size, but a value bigger than the segment share
    let cache = byte_cache(4, 4096, 0);
    let err = cache.put(&b"key".to_vec(), &vec![0u8; 2000]).unwrap_err();

    assert_eq!(err, CacheError::OutOfCapacity);
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.stats().put_failures, 1);
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_lru_correctness() {
    let record = 100;
    let cache = byte_cache(1, 3 * record, 0);
    let key = |k: &[u8]| k.to_vec();

    for k in [b"A", b"B", b"C"] {
        cache.put(&key(k), &value_for_record(k, record)).unwrap();
    }

    // Touching B does not protect A
    assert!(cache.get(&key(b"B")).unwrap().is_some());
    cache.put(&key(b"D"), &value_for_record(b"D", record)).unwrap();
    assert_eq!(cache.get(&key(b"A")).unwrap(), None);

    // C is now the least recently used
    cache.put(&key(b"E"), &value_for_record(b"E", record)).unwrap();
    assert_eq!(cache.get(&key(b"C")).unwrap(), None);
    assert!(cache.get(&key(b"B")).unwrap().is_some());
    assert!(cache.get(&key(b"D")).unwrap().is_some());
    assert!(cache.get(&key(b"E")).unwrap().is_some());

    assert_eq!(cache.stats().evictions, 2);
}

#[test]
fn test_fifo_policy() {
    let record = 100;
    let cache: ByteCache = OffHeapCache::builder()
        .segment_count(1)
        .capacity(3 * record)
        .eviction_policy(EvictionPolicy::Fifo)
        .key_serializer(BytesSerializer)
        .value_serializer(BytesSerializer)
        .build()
        .unwrap();
    let key = |k: &[u8]| k.to_vec();

    for k in [b"A", b"B", b"C"] {
        cache.put(&key(k), &value_for_record(k, record)).unwrap();
    }

    // Hits do not change insertion order
    assert!(cache.get(&key(b"A")).unwrap().is_some());
    cache.put(&key(b"D"), &value_for_record(b"D", record)).unwrap();

    assert_eq!(cache.get(&key(b"A")).unwrap(), None);
    assert!(cache.get(&key(b"B")).unwrap().is_some());
}

/// 1024 bytes, one segment, 200-byte max entry, 150-byte records.
#[test]
fn test_capacity_scenario() {
    let record = 150;
    let cache = byte_cache(1, 1024, 200);
    let keys: Vec<Vec<u8>> = (1..=8).map(|i| format!("K{i}").into_bytes()).collect();

    for key in &keys[..5] {
        cache.put(key, &value_for_record(key, record)).unwrap();
    }

    // Six 150-byte records fit under 1024, so nothing is evicted yet
    assert_eq!(cache.size(), 5);
    assert_eq!(cache.memory_used(), 5 * record);
    assert_eq!(cache.stats().evictions, 0);

    for key in &keys[5..] {
        cache.put(key, &value_for_record(key, record)).unwrap();
        assert!(cache.memory_used() <= 1024);
    }

    assert_eq!(cache.size(), 6);
    assert_eq!(cache.get(&keys[0]).unwrap(), None);
    assert_eq!(cache.get(&keys[1]).unwrap(), None);
    for key in &keys[2..] {
        assert!(cache.get(key).unwrap().is_some(), "{key:?} missing");
    }
    assert_eq!(
        cache.get(&keys[7]).unwrap(),
        Some(value_for_record(&keys[7], record))
    );
}

#[test]
fn test_capacity_bound() {
    let capacity = 64 * 1024;
    let cache = byte_cache(4, capacity, 0);

    for i in 0..5000u32 {
        let key = i.to_le_bytes().to_vec();
        let value = vec![i as u8; (i % 300) as usize];
        cache.put(&key, &value).unwrap();
        assert!(cache.memory_used() <= capacity);
    }

    let stats = cache.stats();
    assert!(stats.evictions > 0);
    assert_eq!(stats.memory_used, cache.memory_used());
    assert_eq!(cache.free_capacity(), capacity - cache.memory_used());
}

// =============================================================================
// Resize
// =============================================================================

#[test]
fn test_resize_preserves_data() {
    let cache: OffHeapCache<u64, u64> = OffHeapCache::builder()
        .segment_count(1)
        .hash_table_size(4)
        .capacity(16 * 1024 * 1024)
        .key_serializer(U64Serializer)
        .value_serializer(U64Serializer)
        .build()
        .unwrap();

    for i in 0..10_000u64 {
        cache.put(&i, &(i * 3)).unwrap();
    }

    let stats = cache.stats();
    assert!(stats.resizes >= 10, "only {} resizes", stats.resizes);
    assert_eq!(stats.evictions, 0);
    assert!(stats.table_lengths[0] as f32 * 0.75 >= 10_000.0);

    for i in 0..10_000u64 {
        assert_eq!(cache.get(&i).unwrap(), Some(i * 3));
    }
}

// =============================================================================
// Conditional and Bulk Operations
// =============================================================================

#[test]
fn test_put_if_absent() {
    let cache = byte_cache(2, 4096, 0);
    let key = b"key".to_vec();

    assert!(cache.put_if_absent(&key, &b"first".to_vec()).unwrap());
    assert!(!cache.put_if_absent(&key, &b"second".to_vec()).unwrap());
    assert_eq!(cache.get(&key).unwrap(), Some(b"first".to_vec()));
}

#[test]
fn test_add_or_replace() {
    let cache = byte_cache(2, 4096, 0);
    let key = b"key".to_vec();

    assert!(
        !cache
            .add_or_replace(&key, &b"old".to_vec(), &b"new".to_vec())
            .unwrap()
    );

    cache.put(&key, &b"old".to_vec()).unwrap();
    assert!(
        !cache
            .add_or_replace(&key, &b"stale".to_vec(), &b"new".to_vec())
            .unwrap()
    );
    assert!(
        cache
            .add_or_replace(&key, &b"old".to_vec(), &b"new".to_vec())
            .unwrap()
    );
    assert_eq!(cache.get(&key).unwrap(), Some(b"new".to_vec()));
}

#[test]
fn test_remove_all() {
    let cache: OffHeapCache<u64, u64> = OffHeapCache::builder()
        .segment_count(4)
        .capacity(64 * 1024)
        .key_serializer(U64Serializer)
        .value_serializer(U64Serializer)
        .build()
        .unwrap();

    for i in 0..100u64 {
        cache.put(&i, &i).unwrap();
    }

    let keys: Vec<u64> = (50..150).collect();
    assert_eq!(cache.remove_all(&keys), 50);
    assert_eq!(cache.size(), 50);
    assert!(cache.contains_key(&49).unwrap());
    assert!(!cache.contains_key(&50).unwrap());
}

#[test]
fn test_hot_keys() {
    let cache: OffHeapCache<u64, u64> = OffHeapCache::builder()
        .segment_count(1)
        .capacity(64 * 1024)
        .key_serializer(U64Serializer)
        .value_serializer(U64Serializer)
        .build()
        .unwrap();

    for i in 0..10u64 {
        cache.put(&i, &i).unwrap();
    }
    cache.get(&3).unwrap();

    assert_eq!(cache.hot_keys(4).unwrap(), vec![3, 9, 8, 7]);
}

#[test]
fn test_clear() {
    let cache = byte_cache(4, 64 * 1024, 0);
    for i in 0..100u32 {
        cache.put(&i.to_le_bytes().to_vec(), &vec![0u8; 32]).unwrap();
    }

    cache.clear();

    assert_eq!(cache.size(), 0);
    assert_eq!(cache.memory_used(), 0);
    assert!(cache.is_empty());
    assert_eq!(cache.get(&0u32.to_le_bytes().to_vec()).unwrap(), None);
}

// =============================================================================
// Corrupt Data
// =============================================================================

/// Raw bytes that refuse to deserialize when they start with 0xff.
struct RejectingSerializer;

impl CacheSerializer<Vec<u8>> for RejectingSerializer {
    fn serialized_size(&self, value: &Vec<u8>) -> usize {
        value.len()
    }

    fn serialize(&self, value: &Vec<u8>, buf: &mut [u8]) {
        buf.copy_from_slice(value);
    }

    fn deserialize(&self, buf: &mut &[u8]) -> CacheResult<Vec<u8>> {
        if buf.first() == Some(&0xff) {
            return Err(CacheError::CorruptData("unreadable value".to_string()));
        }
        let value = buf.to_vec();
        *buf = &[];
        Ok(value)
    }
}

fn rejecting_cache() -> OffHeapCache<u64, Vec<u8>> {
    OffHeapCache::builder()
        .segment_count(1)
        .capacity(4096)
        .key_serializer(U64Serializer)
        .value_serializer(RejectingSerializer)
        .build()
        .expect("Failed to create cache")
}

#[test]
fn test_corrupt_value_survives_remove() {
    let cache = rejecting_cache();
    let unreadable = vec![0xff; 8];
    cache.put(&1, &unreadable).unwrap();
    let used = cache.memory_used();

    assert!(matches!(cache.remove(&1), Err(CacheError::CorruptData(_))));
    assert!(matches!(cache.remove(&1), Err(CacheError::CorruptData(_))));

    assert!(cache.contains_key(&1).unwrap());
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.memory_used(), used);
    assert_eq!(cache.stats().removes, 0);
    assert_eq!(cache.remove_all([&1u64]), 1);
    assert!(cache.is_empty());
}

#[test]
fn test_corrupt_value_survives_put() {
    let cache = rejecting_cache();
    let unreadable = vec![0xff; 8];
    cache.put(&1, &unreadable).unwrap();
    let used = cache.memory_used();

    // Shorter values rewrite in place, longer ones reallocate.
    for value in [vec![1u8; 2], vec![1u8; 64]] {
        assert!(matches!(
            cache.put(&1, &value),
            Err(CacheError::CorruptData(_))
        ));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.memory_used(), used);
    }
    assert_eq!(cache.stats().puts_replaced, 0);

    // The stored bytes are still the original ones.
    let replacement = vec![2u8; 64];
    assert!(cache.add_or_replace(&1, &unreadable, &replacement).unwrap());
    assert_eq!(cache.get(&1).unwrap(), Some(replacement.clone()));
    assert_eq!(cache.put(&1, &vec![3u8; 4]).unwrap(), Some(replacement));
}

// =============================================================================
// Stats and Config
// =============================================================================

#[test]
fn test_stats() {
    let cache = byte_cache(2, 4096, 0);
    let key = b"key".to_vec();

    cache.put(&key, &b"v1".to_vec()).unwrap();
    cache.put(&key, &b"v2".to_vec()).unwrap();
    cache.get(&key).unwrap();
    cache.get(&b"missing".to_vec()).unwrap();
    cache.remove(&key).unwrap();

    let stats = cache.stats();
    assert_eq!(stats.puts_added, 1);
    assert_eq!(stats.puts_replaced, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.removes, 1);
    assert_eq!(stats.capacity, 4096);
    assert_eq!(stats.segment_sizes.len(), 2);
    assert!((stats.hit_rate() - 50.0).abs() < 0.001);

    cache.reset_stats();
    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.puts_added, 0);
}

#[test]
fn test_build_from_toml_config() {
    let config = CacheConfig::from_toml_str(
        r#"
        segment_count = 2
        hash_table_size = 32
        capacity = "1MB"
        max_entry_size = "64KB"
        "#,
    )
    .unwrap();

    let cache: ByteCache = offheap_cache::CacheBuilder::from_config(config.clone())
        .key_serializer(BytesSerializer)
        .value_serializer(BytesSerializer)
        .build()
        .unwrap();

    assert_eq!(cache.segment_count(), 2);
    assert_eq!(cache.capacity(), 1024 * 1024);
    assert_eq!(cache.config(), &config);
    assert_eq!(cache.stats().table_lengths, vec![32, 32]);
}
