//! Off-heap memory arena.
//!
//! The arena hands out raw [`Block`]s from the system allocator and keeps an
//! arena-wide count of reserved bytes against a fixed ceiling. Blocks are
//! move-only: the only way to give one back is [`Arena::release`], which
//! consumes it, so a block cannot be released twice or touched afterwards.
//!
//! # Thread Safety
//!
//! Reservation is a CAS loop on a single atomic counter, so segments on
//! different threads can allocate and release concurrently without a lock.
//! Memory itself comes from the system allocator and never overlaps.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

use crate::error::{CacheError, CacheResult};
use crate::sync::{AtomicUsize, Ordering, spin_loop};

/// Alignment of every block. Entry headers hold a u64 at offset 0.
const BLOCK_ALIGN: usize = 8;

/// An exclusively owned range of raw memory obtained from an [`Arena`].
///
/// Dropping a block without releasing it leaks its memory; the arena reports
/// such blocks when it is dropped.
#[must_use = "blocks must be returned with Arena::release"]
pub struct Block {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: a Block is the unique handle to its memory; moving it between
// threads moves that ownership. Shared references only permit reads.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    /// Size of the block in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// View the block as bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes (allocated zeroed) for as long
        // as the block is alive, and the borrow ties the slice to self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the block as mutable bytes.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Allocator and accountant for off-heap blocks.
pub struct Arena {
    /// Ceiling on reserved bytes.
    capacity: usize,
    /// Bytes currently reserved by outstanding blocks.
    allocated: AtomicUsize,
    /// Number of outstanding blocks.
    outstanding: AtomicUsize,
}

impl Arena {
    /// Create an arena that will never hand out more than `capacity` bytes
    /// at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            allocated: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Allocate a zeroed block of `size` bytes.
    ///
    /// Fails with [`CacheError::OutOfCapacity`] if the ceiling would be
    /// exceeded or the system allocator is exhausted. Nothing is reserved
    /// on failure.
    pub fn allocate(&self, size: usize) -> CacheResult<Block> {
        debug_assert!(size > 0, "zero-sized block requested");

        self.reserve(size)?;

        let layout = match Layout::from_size_align(size, BLOCK_ALIGN) {
            Ok(layout) => layout,
            Err(_) => {
                self.unreserve(size);
                return Err(CacheError::OutOfCapacity);
            }
        };

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            self.unreserve(size);
            return Err(CacheError::OutOfCapacity);
        };

        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(Block { ptr, len: size })
    }

    /// Return a block's memory to the system and its bytes to the ceiling.
    pub fn release(&self, block: Block) {
        let len = block.len;
        // SAFETY: the block was allocated by `allocate` with this exact
        // size and alignment, and ownership is consumed here.
        unsafe {
            let layout = Layout::from_size_align_unchecked(len, BLOCK_ALIGN);
            dealloc(block.ptr.as_ptr(), layout);
        }
        self.unreserve(len);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    /// The byte ceiling.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently reserved by outstanding blocks.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Number of blocks handed out and not yet released.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn reserve(&self, size: usize) -> CacheResult<()> {
        let mut current = self.allocated.load(Ordering::Acquire);
        loop {
            let next = current
                .checked_add(size)
                .filter(|next| *next <= self.capacity)
                .ok_or(CacheError::OutOfCapacity)?;

            match self.allocated.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => {
                    current = actual;
                    spin_loop();
                }
            }
        }
    }

    #[inline]
    fn unreserve(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::AcqRel);
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            tracing::warn!(
                blocks = outstanding,
                bytes = self.allocated(),
                "arena dropped with outstanding blocks"
            );
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
