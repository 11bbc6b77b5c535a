//! Key hashing and segment selection.
//!
//! Segment selection uses the high bits of the 64-bit hash while buckets
//! inside a segment use the low bits, so the two never draw on the same
//! bits.

use ahash::RandomState;

/// Hashes serialized keys and maps hashes to segment indices.
pub struct SegmentRouter {
    hash_builder: Box<RandomState>,
    segment_count: usize,
    /// `64 - log2(segment_count)`. 64 for a single segment.
    shift: u32,
}

impl SegmentRouter {
    /// Create a router for `segment_count` segments (a power of two).
    pub fn new(segment_count: usize) -> Self {
        debug_assert!(segment_count.is_power_of_two());

        #[cfg(test)]
        let hash_builder = RandomState::with_seeds(
            0xbb8c484891ec6c86,
            0x0522a25ae9c769f9,
            0xeed2797b9571bc75,
            0x4feb29c1fbbd59d0,
        );
        #[cfg(not(test))]
        let hash_builder = RandomState::new();

        Self {
            hash_builder: Box::new(hash_builder),
            segment_count,
            shift: 64 - segment_count.trailing_zeros(),
        }
    }

    /// Hash serialized key bytes.
    #[inline]
    pub fn hash(&self, key: &[u8]) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Segment index for a hash.
    #[inline]
    pub fn route(&self, hash: u64) -> usize {
        (hash.checked_shr(self.shift).unwrap_or(0) as usize) & (self.segment_count - 1)
    }

    /// Number of segments routed across.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let router = SegmentRouter::new(16);
        assert_eq!(router.hash(b"test_key"), router.hash(b"test_key"));
        assert_ne!(router.hash(b"key1"), router.hash(b"key2"));
    }

    #[test]
    fn test_single_segment() {
        let router = SegmentRouter::new(1);
        for hash in [0, 1, u64::MAX, 0x8000_0000_0000_0000] {
            assert_eq!(router.route(hash), 0);
        }
    }

    #[test]
    fn test_route_uses_high_bits() {
        let router = SegmentRouter::new(4);

        assert_eq!(router.route(0x0000_0000_0000_0000), 0);
        assert_eq!(router.route(0x4000_0000_0000_0000), 1);
        assert_eq!(router.route(0x8000_0000_0000_0000), 2);
        assert_eq!(router.route(0xc000_0000_0000_0000), 3);
        // Low bits are ignored
        assert_eq!(router.route(0x0000_0000_ffff_ffff), 0);
    }

    #[test]
    fn test_route_in_range() {
        let router = SegmentRouter::new(64);
        for i in 0..10_000u32 {
            let hash = router.hash(&i.to_le_bytes());
            assert!(router.route(hash) < 64);
        }
    }

    #[test]
    fn test_route_distribution() {
        let router = SegmentRouter::new(8);
        let mut counts = [0usize; 8];

        for i in 0..80_000u32 {
            counts[router.route(router.hash(&i.to_le_bytes()))] += 1;
        }

        // Every segment within 10% of the mean
        for count in counts {
            assert!((9_000..=11_000).contains(&count), "skewed routing: {counts:?}");
        }
    }
}
