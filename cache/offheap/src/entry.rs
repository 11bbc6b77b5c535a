//! Binary layout of a cache entry stored in an arena block.
//!
//! Each entry occupies one [`Block`] with a fixed header followed by the
//! key and value bytes.
//!
//! # Memory Layout
//!
//! ```text
//! +----------------+
//! |      hash      |  8 bytes - full 64-bit key hash
//! +----------------+
//! |    key_len     |  4 bytes - key length
//! +----------------+
//! |   value_len    |  4 bytes - value length
//! +----------------+
//! |   chain_next   |  4 bytes - next slot in the bucket chain
//! +----------------+
//! |    lru_prev    |  4 bytes - more recently used neighbour
//! +----------------+
//! |    lru_next    |  4 bytes - less recently used neighbour
//! +----------------+
//! |    reserved    |  4 bytes - zero
//! +----------------+
//! |      key       |  key_len bytes
//! +----------------+
//! |     value      |  value_len bytes
//! +----------------+
//! ```
//!
//! All integers are little-endian. Links are slot indices into the owning
//! segment's slot table, with [`NIL`] marking the end of a list. A block may
//! be longer than `HEADER_SIZE + key_len + value_len` after an in-place value
//! update that shrank the value.

use crate::arena::{Arena, Block};
use crate::error::{CacheError, CacheResult};

/// Size of the fixed entry header.
pub const HEADER_SIZE: usize = 32;

/// Sentinel for an absent link.
pub const NIL: u32 = u32::MAX;

const HASH_OFFSET: usize = 0;
const KEY_LEN_OFFSET: usize = 8;
const VALUE_LEN_OFFSET: usize = 12;
const CHAIN_NEXT_OFFSET: usize = 16;
const LRU_PREV_OFFSET: usize = 20;
const LRU_NEXT_OFFSET: usize = 24;

/// Calculate the encoded size of an entry with the given key and value
/// lengths.
#[inline]
pub fn record_size(key_len: usize, value_len: usize) -> usize {
    HEADER_SIZE
        .saturating_add(key_len)
        .saturating_add(value_len)
}

/// Check that a key/value pair can be encoded under `max_entry_size`
/// (0 = unlimited) and return its record size.
pub fn check_size(key_len: usize, value_len: usize, max_entry_size: usize) -> CacheResult<usize> {
    let size = record_size(key_len, value_len);

    if key_len > u32::MAX as usize || value_len > u32::MAX as usize {
        return Err(CacheError::EntryTooLarge {
            size,
            max: u32::MAX as usize,
        });
    }

    if max_entry_size != 0 && size > max_entry_size {
        return Err(CacheError::EntryTooLarge {
            size,
            max: max_entry_size,
        });
    }

    Ok(size)
}

/// Encode an entry into a freshly allocated block.
///
/// The size check happens before allocation, so an oversized entry never
/// touches the arena. All links start out as [`NIL`].
pub fn encode(
    arena: &Arena,
    hash: u64,
    key: &[u8],
    value: &[u8],
    max_entry_size: usize,
) -> CacheResult<Block> {
    let size = check_size(key.len(), value.len(), max_entry_size)?;
    let mut block = arena.allocate(size)?;

    let bytes = block.as_mut_slice();
    write_u64(bytes, HASH_OFFSET, hash);
    write_u32(bytes, KEY_LEN_OFFSET, key.len() as u32);
    write_u32(bytes, VALUE_LEN_OFFSET, value.len() as u32);
    write_u32(bytes, CHAIN_NEXT_OFFSET, NIL);
    write_u32(bytes, LRU_PREV_OFFSET, NIL);
    write_u32(bytes, LRU_NEXT_OFFSET, NIL);

    let key_end = HEADER_SIZE + key.len();
    bytes[HEADER_SIZE..key_end].copy_from_slice(key);
    bytes[key_end..key_end + value.len()].copy_from_slice(value);

    Ok(block)
}

/// Decode an entry into `(hash, key, value)`.
#[inline]
pub fn decode(bytes: &[u8]) -> (u64, &[u8], &[u8]) {
    let entry = EntryRef::new(bytes);
    (entry.hash(), entry.key(), entry.value())
}

/// Read-only view of an encoded entry.
#[derive(Clone, Copy)]
pub struct EntryRef<'a> {
    bytes: &'a [u8],
}

impl<'a> EntryRef<'a> {
    /// Wrap the bytes of an encoded entry.
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self {
        debug_assert!(bytes.len() >= HEADER_SIZE, "block shorter than header");
        Self { bytes }
    }

    /// Stored key hash.
    #[inline]
    pub fn hash(&self) -> u64 {
        read_u64(self.bytes, HASH_OFFSET)
    }

    /// Key length.
    #[inline]
    pub fn key_len(&self) -> usize {
        read_u32(self.bytes, KEY_LEN_OFFSET) as usize
    }

    /// Value length.
    #[inline]
    pub fn value_len(&self) -> usize {
        read_u32(self.bytes, VALUE_LEN_OFFSET) as usize
    }

    /// Key bytes.
    #[inline]
    pub fn key(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..HEADER_SIZE + self.key_len()]
    }

    /// Value bytes.
    #[inline]
    pub fn value(&self) -> &'a [u8] {
        let start = HEADER_SIZE + self.key_len();
        &self.bytes[start..start + self.value_len()]
    }

    /// Whether this entry holds `key` with the given hash. Compares the
    /// hash first.
    #[inline]
    pub fn matches(&self, hash: u64, key: &[u8]) -> bool {
        self.hash() == hash && self.key() == key
    }

    /// Next slot in the bucket chain.
    #[inline]
    pub fn chain_next(&self) -> u32 {
        read_u32(self.bytes, CHAIN_NEXT_OFFSET)
    }

    /// More recently used neighbour.
    #[inline]
    pub fn lru_prev(&self) -> u32 {
        read_u32(self.bytes, LRU_PREV_OFFSET)
    }

    /// Less recently used neighbour.
    #[inline]
    pub fn lru_next(&self) -> u32 {
        read_u32(self.bytes, LRU_NEXT_OFFSET)
    }
}

/// Mutable view of an encoded entry, used to rewrite links and values.
pub struct EntryMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> EntryMut<'a> {
    /// Wrap the bytes of an encoded entry.
    #[inline]
    pub fn new(bytes: &'a mut [u8]) -> Self {
        debug_assert!(bytes.len() >= HEADER_SIZE, "block shorter than header");
        Self { bytes }
    }

    #[inline]
    pub fn set_chain_next(&mut self, slot: u32) {
        write_u32(self.bytes, CHAIN_NEXT_OFFSET, slot);
    }

    #[inline]
    pub fn set_lru_prev(&mut self, slot: u32) {
        write_u32(self.bytes, LRU_PREV_OFFSET, slot);
    }

    #[inline]
    pub fn set_lru_next(&mut self, slot: u32) {
        write_u32(self.bytes, LRU_NEXT_OFFSET, slot);
    }

    /// Whether a new value of `len` bytes fits in this block in place.
    #[inline]
    pub fn fits_value(&self, len: usize) -> bool {
        let key_len = read_u32(self.bytes, KEY_LEN_OFFSET) as usize;
        HEADER_SIZE + key_len + len <= self.bytes.len()
    }

    /// Overwrite the value in place.
    ///
    /// # Panics
    ///
    /// Panics if the value does not fit; check with [`fits_value`] first.
    ///
    /// [`fits_value`]: EntryMut::fits_value
    pub fn set_value(&mut self, value: &[u8]) {
        debug_assert!(self.fits_value(value.len()), "value does not fit block");
        let start = HEADER_SIZE + read_u32(self.bytes, KEY_LEN_OFFSET) as usize;
        self.bytes[start..start + value.len()].copy_from_slice(value);
        write_u32(self.bytes, VALUE_LEN_OFFSET, value.len() as u32);
    }
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

#[inline]
fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[inline]
fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn test_encode_and_decode() {
        let arena = Arena::new(1024);
        let block = encode(&arena, 0xdead_beef_cafe_f00d, b"test_key", b"test_value", 0)
            .expect("encode failed");

        assert_eq!(block.len(), HEADER_SIZE + 8 + 10);

        let (hash, key, value) = decode(block.as_slice());
        assert_eq!(hash, 0xdead_beef_cafe_f00d);
        assert_eq!(key, b"test_key");
        assert_eq!(value, b"test_value");

        let entry = EntryRef::new(block.as_slice());
        assert_eq!(entry.chain_next(), NIL);
        assert_eq!(entry.lru_prev(), NIL);
        assert_eq!(entry.lru_next(), NIL);

        arena.release(block);
    }

    #[test]
    fn test_empty_key_value() {
        let arena = Arena::new(1024);
        let block = encode(&arena, 7, b"", b"", 0).expect("encode failed");

        let (hash, key, value) = decode(block.as_slice());
        assert_eq!(hash, 7);
        assert!(key.is_empty());
        assert!(value.is_empty());

        arena.release(block);
    }

    #[test]
    fn test_too_large_does_not_allocate() {
        let arena = Arena::new(1024);
        let err = encode(&arena, 1, b"key", &[0u8; 100], 64).unwrap_err();

        assert_eq!(
            err,
            CacheError::EntryTooLarge {
                size: HEADER_SIZE + 3 + 100,
                max: 64
            }
        );
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.outstanding(), 0);
    }

    #[test]
    fn test_arena_exhaustion() {
        let arena = Arena::new(39);
        let err = encode(&arena, 1, b"key", b"value", 0).unwrap_err();
        assert_eq!(err, CacheError::OutOfCapacity);
    }

    #[test]
    fn test_links() {
        let arena = Arena::new(1024);
        let mut block = encode(&arena, 1, b"k", b"v", 0).unwrap();

        {
            let mut entry = EntryMut::new(block.as_mut_slice());
            entry.set_chain_next(3);
            entry.set_lru_prev(4);
            entry.set_lru_next(5);
        }

        let entry = EntryRef::new(block.as_slice());
        assert_eq!(entry.chain_next(), 3);
        assert_eq!(entry.lru_prev(), 4);
        assert_eq!(entry.lru_next(), 5);
        // Links never disturb the payload
        assert_eq!(entry.key(), b"k");
        assert_eq!(entry.value(), b"v");

        arena.release(block);
    }

    #[test]
    fn test_set_value_in_place() {
        let arena = Arena::new(1024);
        let mut block = encode(&arena, 1, b"key", b"long value", 0).unwrap();

        let mut entry = EntryMut::new(block.as_mut_slice());
        assert!(entry.fits_value(10));
        assert!(!entry.fits_value(11));
        entry.set_value(b"short");

        let entry = EntryRef::new(block.as_slice());
        assert_eq!(entry.value(), b"short");
        assert_eq!(entry.key(), b"key");
        assert!(entry.matches(1, b"key"));
        assert!(!entry.matches(2, b"key"));

        arena.release(block);
    }
}
