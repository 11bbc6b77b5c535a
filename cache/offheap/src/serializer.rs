//! Conversion between typed keys/values and the bytes stored in entries.
//!
//! The cache never interprets stored bytes itself. Every typed operation goes
//! through a [`CacheSerializer`] for its key and value type.

use crate::error::{CacheError, CacheResult};

/// Converts values of type `T` to and from bytes.
///
/// `serialize` is always handed a buffer of exactly `serialized_size(value)`
/// bytes. `deserialize` reads from the front of `buf` and advances it past the
/// bytes it consumed.
pub trait CacheSerializer<T>: Send + Sync {
    /// Number of bytes `serialize` will write for `value`.
    fn serialized_size(&self, value: &T) -> usize;

    /// Write `value` into `buf`.
    fn serialize(&self, value: &T, buf: &mut [u8]);

    /// Read a value from the front of `buf`.
    ///
    /// Fails with [`CacheError::CorruptData`] if the buffer is too short or
    /// malformed.
    fn deserialize(&self, buf: &mut &[u8]) -> CacheResult<T>;
}

/// Serialize `value` into a freshly allocated buffer.
pub(crate) fn to_bytes<T, S>(serializer: &S, value: &T) -> Vec<u8>
where
    S: CacheSerializer<T> + ?Sized,
{
    let mut buf = vec![0u8; serializer.serialized_size(value)];
    serializer.serialize(value, &mut buf);
    buf
}

const LENGTH_PREFIX: usize = 4;

fn read_length_prefixed<'a>(buf: &mut &'a [u8]) -> CacheResult<&'a [u8]> {
    let data = take(buf, LENGTH_PREFIX)?;
    let mut len = [0u8; LENGTH_PREFIX];
    len.copy_from_slice(data);
    take(buf, u32::from_le_bytes(len) as usize)
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> CacheResult<&'a [u8]> {
    if buf.len() < len {
        return Err(CacheError::CorruptData(format!(
            "expected {len} bytes, {} remaining",
            buf.len()
        )));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn write_length_prefixed(bytes: &[u8], buf: &mut [u8]) {
    buf[..LENGTH_PREFIX].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf[LENGTH_PREFIX..LENGTH_PREFIX + bytes.len()].copy_from_slice(bytes);
}

/// Byte vectors with a 4-byte little-endian length prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesSerializer;

impl CacheSerializer<Vec<u8>> for BytesSerializer {
    fn serialized_size(&self, value: &Vec<u8>) -> usize {
        LENGTH_PREFIX + value.len()
    }

    fn serialize(&self, value: &Vec<u8>, buf: &mut [u8]) {
        write_length_prefixed(value, buf);
    }

    fn deserialize(&self, buf: &mut &[u8]) -> CacheResult<Vec<u8>> {
        read_length_prefixed(buf).map(<[u8]>::to_vec)
    }
}

/// UTF-8 strings with a 4-byte little-endian length prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerializer;

impl CacheSerializer<String> for StringSerializer {
    fn serialized_size(&self, value: &String) -> usize {
        LENGTH_PREFIX + value.len()
    }

    fn serialize(&self, value: &String, buf: &mut [u8]) {
        write_length_prefixed(value.as_bytes(), buf);
    }

    fn deserialize(&self, buf: &mut &[u8]) -> CacheResult<String> {
        let bytes = read_length_prefixed(buf)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| CacheError::CorruptData(e.to_string()))
    }
}

/// `u64` as 8 little-endian bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct U64Serializer;

impl CacheSerializer<u64> for U64Serializer {
    fn serialized_size(&self, _value: &u64) -> usize {
        8
    }

    fn serialize(&self, value: &u64, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&value.to_le_bytes());
    }

    fn deserialize(&self, buf: &mut &[u8]) -> CacheResult<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(take(buf, 8)?);
        Ok(u64::from_le_bytes(bytes))
    }
}
