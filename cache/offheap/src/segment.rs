//! A single partition of the cache keyspace.
//!
//! A [`Segment`] owns a chained hash table over arena blocks and a doubly
//! linked recency list threaded through the same blocks. Both the bucket
//! chains and the recency list link entries by slot index, never by address.
//!
//! ```text
//!  table (Vec<u32>)          slots (Vec<Option<Block>>)
//!  +----+                    +-------------------------------------+
//!  |  3 | ---------------->  | 3: [hdr: chain=7 prev=.. next=..][k][v]
//!  +----+                    | 7: [hdr: chain=NIL ...][k][v]       |
//!  | NIL|                    | ...                                 |
//!  +----+                    +-------------------------------------+
//!
//!  lru_head -> most recently used ... lru_tail -> next eviction victim
//! ```
//!
//! # Thread Safety
//!
//! All state lives behind one `parking_lot::Mutex`, held for the full
//! duration of an operation including any eviction or resize it triggers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::arena::{Arena, Block};
use crate::config::EvictionPolicy;
use crate::entry::{self, EntryMut, EntryRef, NIL};
use crate::error::{CacheError, CacheResult};
use crate::stats::SegmentStats;

/// Largest bucket table a segment will grow to.
pub const MAX_TABLE_LENGTH: usize = 1 << 30;

/// Slot indices must stay below the NIL sentinel.
const MAX_SLOTS: usize = NIL as usize;

/// Construction parameters shared by every segment of a cache.
#[derive(Debug, Clone, Copy)]
pub struct SegmentOptions {
    /// Byte budget of this segment.
    pub capacity: usize,
    /// Initial bucket table length (power of two).
    pub table_length: usize,
    /// Entries per bucket above which the table doubles.
    pub load_factor: f32,
    /// Maximum encoded entry size, 0 for unlimited.
    pub max_entry_size: usize,
    /// Recency handling on hits.
    pub eviction_policy: EvictionPolicy,
}

/// One lock-guarded partition of the cache.
pub struct Segment {
    inner: Mutex<SegmentInner>,
}

impl Segment {
    /// Create an empty segment drawing blocks from `arena`.
    pub fn new(arena: Arc<Arena>, options: SegmentOptions) -> Self {
        debug_assert!(options.table_length.is_power_of_two());

        Self {
            inner: Mutex::new(SegmentInner::new(arena, options)),
        }
    }

    /// Look up a key, promoting it to most recently used on a hit.
    pub fn lookup(&self, hash: u64, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.lock().lookup(hash, key)
    }

    /// Check for a key without touching recency.
    pub fn contains(&self, hash: u64, key: &[u8]) -> bool {
        self.inner.lock().find(hash, key).is_some()
    }

    /// Insert or replace a key, returning the previous value as produced by
    /// `decode`.
    ///
    /// `decode` runs under the lock against the stored value before anything
    /// is written. If it fails, the error is returned and the entry is left
    /// as it was.
    pub fn insert<T>(
        &self,
        hash: u64,
        key: &[u8],
        value: &[u8],
        decode: impl FnOnce(&[u8]) -> CacheResult<T>,
    ) -> CacheResult<Option<T>> {
        let mut inner = self.inner.lock();
        let size = match inner.check_insert(key, value) {
            Ok(size) => size,
            Err(e) => {
                inner.counters.put_failures += 1;
                return Err(e);
            }
        };

        let slot = inner.find(hash, key);
        let old = match slot {
            Some(slot) => Some(decode(inner.entry(slot).value())?),
            None => None,
        };

        let result = match slot {
            Some(slot) => inner.replace(slot, hash, key, value, size),
            None => inner.insert_new(hash, key, value, size),
        };
        if result.is_err() {
            inner.counters.put_failures += 1;
        }
        result.map(|()| old)
    }

    /// Insert only if the key is absent. Returns whether it was inserted.
    pub fn insert_if_absent(&self, hash: u64, key: &[u8], value: &[u8]) -> CacheResult<bool> {
        let mut inner = self.inner.lock();
        if inner.find(hash, key).is_some() {
            return Ok(false);
        }
        let size = inner.check_insert(key, value)?;
        match inner.insert_new(hash, key, value, size) {
            Ok(()) => Ok(true),
            Err(e) => {
                inner.counters.put_failures += 1;
                Err(e)
            }
        }
    }

    /// Replace the value only if the stored value equals `expected`.
    /// Returns whether the value was replaced.
    pub fn replace_if(
        &self,
        hash: u64,
        key: &[u8],
        expected: &[u8],
        value: &[u8],
    ) -> CacheResult<bool> {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.find(hash, key) else {
            return Ok(false);
        };
        if inner.entry(slot).value() != expected {
            return Ok(false);
        }
        let size = inner.check_insert(key, value)?;
        match inner.replace(slot, hash, key, value, size) {
            Ok(()) => Ok(true),
            Err(e) => {
                inner.counters.put_failures += 1;
                Err(e)
            }
        }
    }

    /// Remove a key, returning its value as produced by `decode`.
    ///
    /// The entry is only unlinked once `decode` succeeds. On failure it stays
    /// in the table untouched.
    pub fn remove<T>(
        &self,
        hash: u64,
        key: &[u8],
        decode: impl FnOnce(&[u8]) -> CacheResult<T>,
    ) -> CacheResult<Option<T>> {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.find(hash, key) else {
            return Ok(None);
        };

        let (_, _, value) = entry::decode(inner.block(slot).as_slice());
        let value = decode(value)?;
        inner.remove(slot);
        Ok(Some(value))
    }

    /// Release every entry. The bucket table keeps its current length.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Up to `n` keys ordered from most to least recently used.
    pub fn hot_keys(&self, n: usize) -> Vec<Vec<u8>> {
        self.inner.lock().hot_keys(n)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    /// Whether the segment holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by this segment's blocks.
    pub fn bytes_used(&self) -> usize {
        self.inner.lock().bytes_used
    }

    /// Snapshot of this segment's counters and gauges.
    pub fn stats(&self) -> SegmentStats {
        self.inner.lock().stats()
    }

    /// Zero the operation counters. Gauges are unaffected.
    pub fn reset_stats(&self) {
        self.inner.lock().counters = Counters::default();
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    puts_added: u64,
    puts_replaced: u64,
    put_failures: u64,
    removes: u64,
    evictions: u64,
    resizes: u64,
}

struct SegmentInner {
    arena: Arc<Arena>,
    /// Chain heads, indexed by `hash & mask`.
    table: Vec<u32>,
    mask: u64,
    /// Entry blocks, indexed by slot. `None` slots are on `free_slots`.
    slots: Vec<Option<Block>>,
    free_slots: Vec<u32>,
    lru_head: u32,
    lru_tail: u32,
    count: usize,
    bytes_used: usize,
    capacity: usize,
    load_factor: f32,
    max_entry_size: usize,
    eviction_policy: EvictionPolicy,
    counters: Counters,
}

impl SegmentInner {
    fn new(arena: Arc<Arena>, options: SegmentOptions) -> Self {
        Self {
            arena,
            table: vec![NIL; options.table_length],
            mask: (options.table_length - 1) as u64,
            slots: Vec::new(),
            free_slots: Vec::new(),
            lru_head: NIL,
            lru_tail: NIL,
            count: 0,
            bytes_used: 0,
            capacity: options.capacity,
            load_factor: options.load_factor,
            max_entry_size: options.max_entry_size,
            eviction_policy: options.eviction_policy,
            counters: Counters::default(),
        }
    }

    #[inline]
    fn bucket(&self, hash: u64) -> usize {
        (hash & self.mask) as usize
    }

    #[inline]
    fn block(&self, slot: u32) -> &Block {
        match self.slots.get(slot as usize) {
            Some(Some(block)) => block,
            _ => unreachable!("slot {slot} is not occupied"),
        }
    }

    #[inline]
    fn block_mut(&mut self, slot: u32) -> &mut Block {
        match self.slots.get_mut(slot as usize) {
            Some(Some(block)) => block,
            _ => unreachable!("slot {slot} is not occupied"),
        }
    }

    #[inline]
    fn entry(&self, slot: u32) -> EntryRef<'_> {
        EntryRef::new(self.block(slot).as_slice())
    }

    #[inline]
    fn entry_mut(&mut self, slot: u32) -> EntryMut<'_> {
        EntryMut::new(self.block_mut(slot).as_mut_slice())
    }

    /// Walk the bucket chain for `key`, comparing hashes before bytes.
    fn find(&self, hash: u64, key: &[u8]) -> Option<u32> {
        let mut slot = self.table[self.bucket(hash)];
        while slot != NIL {
            let entry = self.entry(slot);
            if entry.matches(hash, key) {
                return Some(slot);
            }
            slot = entry.chain_next();
        }
        None
    }

    fn lookup(&mut self, hash: u64, key: &[u8]) -> Option<Vec<u8>> {
        match self.find(hash, key) {
            Some(slot) => {
                self.touch(slot);
                self.counters.hits += 1;
                Some(self.entry(slot).value().to_vec())
            }
            None => {
                self.counters.misses += 1;
                None
            }
        }
    }

    /// Validate sizes for a write. Nothing is mutated.
    fn check_insert(&self, key: &[u8], value: &[u8]) -> CacheResult<usize> {
        let size = entry::check_size(key.len(), value.len(), self.max_entry_size)?;
        if size > self.capacity {
            return Err(CacheError::OutOfCapacity);
        }
        Ok(size)
    }

    fn insert_new(&mut self, hash: u64, key: &[u8], value: &[u8], size: usize) -> CacheResult<()> {
        if self.free_slots.is_empty() && self.slots.len() >= MAX_SLOTS {
            return Err(CacheError::OutOfCapacity);
        }

        self.make_room(size, 0, NIL)?;
        let block = entry::encode(&self.arena, hash, key, value, self.max_entry_size)?;
        self.link(block);
        self.counters.puts_added += 1;

        self.maybe_resize();
        Ok(())
    }

    /// Replace the value of the entry at `slot`.
    fn replace(
        &mut self,
        slot: u32,
        hash: u64,
        key: &[u8],
        value: &[u8],
        size: usize,
    ) -> CacheResult<()> {
        let old_len = self.block(slot).len();

        if size <= old_len {
            self.entry_mut(slot).set_value(value);
            self.touch(slot);
            self.counters.puts_replaced += 1;
            return Ok(());
        }

        // The old block is credited, not evicted, and goes back to the arena
        // before the new one is reserved. A failed allocation here leaves
        // the key unmapped.
        self.make_room(size, old_len, slot)?;
        let old = self.take(slot);
        self.arena.release(old);

        let block = entry::encode(&self.arena, hash, key, value, self.max_entry_size)?;
        self.link(block);
        self.counters.puts_replaced += 1;

        Ok(())
    }

    fn remove(&mut self, slot: u32) {
        let block = self.take(slot);
        self.arena.release(block);
        self.counters.removes += 1;
    }

    /// Evict from the LRU tail until `size` more bytes fit in the budget.
    ///
    /// `credit` bytes are about to be freed by the caller and `exclude`
    /// must not be chosen as a victim.
    fn make_room(&mut self, size: usize, credit: usize, exclude: u32) -> CacheResult<()> {
        if size > self.capacity {
            return Err(CacheError::OutOfCapacity);
        }

        while self.bytes_used - credit + size > self.capacity {
            if !self.evict_one(exclude) {
                return Err(CacheError::OutOfCapacity);
            }
        }

        Ok(())
    }

    fn evict_one(&mut self, exclude: u32) -> bool {
        let mut victim = self.lru_tail;
        if victim != NIL && victim == exclude {
            victim = self.entry(victim).lru_prev();
        }
        if victim == NIL {
            return false;
        }

        let block = self.take(victim);
        tracing::trace!(slot = victim, bytes = block.len(), "evicting entry");
        self.arena.release(block);
        self.counters.evictions += 1;
        true
    }

    /// Place a freshly encoded block in a slot and link it at the head of
    /// its bucket chain and of the recency list.
    fn link(&mut self, block: Block) -> u32 {
        let hash = EntryRef::new(block.as_slice()).hash();
        let len = block.len();

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(block);
                slot
            }
            None => {
                self.slots.push(Some(block));
                (self.slots.len() - 1) as u32
            }
        };

        let bucket = self.bucket(hash);
        let head = self.table[bucket];
        self.entry_mut(slot).set_chain_next(head);
        self.table[bucket] = slot;

        self.lru_push_front(slot);

        self.count += 1;
        self.bytes_used += len;
        slot
    }

    /// Unlink the entry at `slot` from its chain and the recency list and
    /// hand back its block.
    fn take(&mut self, slot: u32) -> Block {
        let (hash, chain_next) = {
            let entry = self.entry(slot);
            (entry.hash(), entry.chain_next())
        };

        let bucket = self.bucket(hash);
        if self.table[bucket] == slot {
            self.table[bucket] = chain_next;
        } else {
            let mut current = self.table[bucket];
            while current != NIL {
                let next = self.entry(current).chain_next();
                if next == slot {
                    self.entry_mut(current).set_chain_next(chain_next);
                    break;
                }
                current = next;
            }
        }

        self.lru_unlink(slot);

        let block = match self.slots[slot as usize].take() {
            Some(block) => block,
            None => unreachable!("slot {slot} is not occupied"),
        };
        self.free_slots.push(slot);

        self.count -= 1;
        self.bytes_used -= block.len();
        block
    }

    fn touch(&mut self, slot: u32) {
        if self.eviction_policy == EvictionPolicy::Lru && self.lru_head != slot {
            self.lru_unlink(slot);
            self.lru_push_front(slot);
        }
    }

    fn lru_push_front(&mut self, slot: u32) {
        let head = self.lru_head;
        {
            let mut entry = self.entry_mut(slot);
            entry.set_lru_prev(NIL);
            entry.set_lru_next(head);
        }

        if head == NIL {
            self.lru_tail = slot;
        } else {
            self.entry_mut(head).set_lru_prev(slot);
        }
        self.lru_head = slot;
    }

    fn lru_unlink(&mut self, slot: u32) {
        let (prev, next) = {
            let entry = self.entry(slot);
            (entry.lru_prev(), entry.lru_next())
        };

        if prev == NIL {
            self.lru_head = next;
        } else {
            self.entry_mut(prev).set_lru_next(next);
        }

        if next == NIL {
            self.lru_tail = prev;
        } else {
            self.entry_mut(next).set_lru_prev(prev);
        }

        let mut entry = self.entry_mut(slot);
        entry.set_lru_prev(NIL);
        entry.set_lru_next(NIL);
    }

    fn maybe_resize(&mut self) {
        let length = self.table.len();
        if length >= MAX_TABLE_LENGTH {
            return;
        }
        if self.count as f64 > length as f64 * self.load_factor as f64 {
            self.resize();
        }
    }

    /// Double the bucket table and re-link every entry into it.
    ///
    /// The new table is fully allocated before any chain link is rewritten,
    /// and only chain links change; blocks stay where they are.
    fn resize(&mut self) {
        let old_length = self.table.len();
        let new_length = old_length * 2;

        let mut table: Vec<u32> = Vec::new();
        if let Err(e) = table.try_reserve_exact(new_length) {
            tracing::warn!(
                error = %e,
                old_length,
                new_length,
                "failed to allocate larger table, keeping current table"
            );
            return;
        }
        table.resize(new_length, NIL);
        let new_mask = (new_length - 1) as u64;

        for bucket in 0..old_length {
            let mut slot = self.table[bucket];
            while slot != NIL {
                let (hash, next) = {
                    let entry = self.entry(slot);
                    (entry.hash(), entry.chain_next())
                };
                let index = (hash & new_mask) as usize;
                self.entry_mut(slot).set_chain_next(table[index]);
                table[index] = slot;
                slot = next;
            }
        }

        self.table = table;
        self.mask = new_mask;
        self.counters.resizes += 1;

        tracing::debug!(
            old_length,
            new_length,
            entries = self.count,
            "resized segment table"
        );
    }

    fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(block) = slot.take() {
                self.arena.release(block);
            }
        }
        self.slots.clear();
        self.free_slots.clear();
        self.table.fill(NIL);
        self.lru_head = NIL;
        self.lru_tail = NIL;
        self.count = 0;
        self.bytes_used = 0;
    }

    fn hot_keys(&self, n: usize) -> Vec<Vec<u8>> {
        let mut keys = Vec::with_capacity(n.min(self.count));
        let mut slot = self.lru_head;
        while slot != NIL && keys.len() < n {
            let entry = self.entry(slot);
            keys.push(entry.key().to_vec());
            slot = entry.lru_next();
        }
        keys
    }

    fn stats(&self) -> SegmentStats {
        SegmentStats {
            entries: self.count,
            bytes_used: self.bytes_used,
            capacity: self.capacity,
            table_length: self.table.len(),
            hits: self.counters.hits,
            misses: self.counters.misses,
            puts_added: self.counters.puts_added,
            puts_replaced: self.counters.puts_replaced,
            put_failures: self.counters.put_failures,
            removes: self.counters.removes,
            evictions: self.counters.evictions,
            resizes: self.counters.resizes,
        }
    }
}

impl Drop for SegmentInner {
    fn drop(&mut self) {
        self.clear();
    }
}
