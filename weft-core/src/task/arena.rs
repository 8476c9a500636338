//! Chunked, generation-checked task arena.
//!
//! Task objects are carved out of fixed-capacity chunks by a monotonically
//! advancing cursor, so the common allocation path is a single atomic
//! `fetch_add` with no lock. When the active chunk runs out it is retired
//! into a blocked list and a fresh chunk is installed; freed slots inside a
//! still-active chunk are *not* reused — that fragmentation is the price of
//! the lock-free fast path. A blocked chunk whose live count returns to zero
//! leaves the blocked list and becomes recyclable wholesale.
//!
//! # Keys instead of pointers
//!
//! Cross-task references are [`TaskKey`]s: chunk index, slot index and a slot
//! generation. Removing a task bumps the slot's generation, so a stale key
//! held by a predecessor list or a resource user list resolves to "task
//! gone" instead of dangling. Lookups are an `RwLock` read over the slot,
//! which lets graph traversal share slots while removal takes the slot
//! exclusively.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::EmplaceError;
use super::Task;

/// Generation-checked reference to a task slot.
///
/// The only way tasks refer to each other; never an owning pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    chunk: u32,
    slot: u32,
    generation: u32,
}

/// One slot of a chunk: the cell plus the generation that validates keys.
struct Slot {
    generation: AtomicU32,
    cell: RwLock<Option<Task>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            cell: RwLock::new(None),
        }
    }
}

/// A fixed-capacity block of task slots.
struct Chunk {
    index: u32,
    slots: Box<[Slot]>,

    /// Next never-allocated slot. Only advances; reset when the chunk is
    /// recycled as a whole.
    cursor: AtomicUsize,

    /// Number of occupied slots.
    live: AtomicUsize,
}

impl Chunk {
    fn new(index: u32, capacity: usize) -> Self {
        let slots: Vec<Slot> = (0..capacity).map(|_| Slot::new()).collect();
        Self {
            index,
            slots: slots.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        }
    }

    /// Claim the next slot, if any remains.
    ///
    /// The live count is charged at claim time, before the task is placed
    /// into the slot, so a chunk with an in-flight placement never reads as
    /// fully freed and cannot be recycled out from under the placer.
    fn bump(&self) -> Option<usize> {
        self.live.fetch_add(1, Ordering::AcqRel);
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        if index < self.slots.len() {
            Some(index)
        } else {
            self.live.fetch_sub(1, Ordering::AcqRel);
            None
        }
    }

    fn is_exhausted(&self) -> bool {
        self.cursor.load(Ordering::Relaxed) >= self.slots.len()
    }

    /// Make a fully freed chunk allocatable again. Slot generations are kept,
    /// which is what invalidates keys from the chunk's previous life.
    fn reset(&self) {
        debug_assert_eq!(self.live.load(Ordering::Relaxed), 0);
        self.cursor.store(0, Ordering::Relaxed);
    }
}

/// The arena owning all task memory of a space tree.
pub struct TaskArena {
    chunk_capacity: usize,
    max_chunks: Option<usize>,

    /// Chunk table; index-stable for the arena's lifetime so keys stay
    /// resolvable. Recycled chunks are reused in place, never dropped.
    chunks: RwLock<Vec<Arc<Chunk>>>,

    /// The chunk currently served by the allocation fast path.
    active: RwLock<Arc<Chunk>>,

    /// Exhausted chunks still holding live tasks.
    blocked: Mutex<Vec<Arc<Chunk>>>,

    /// Fully freed chunks awaiting reuse.
    recycled: Mutex<Vec<Arc<Chunk>>>,
}

impl TaskArena {
    /// Create an arena with the given chunk capacity and optional chunk
    /// limit.
    pub fn new(chunk_capacity: usize, max_chunks: Option<usize>) -> Self {
        assert!(chunk_capacity > 0, "chunk capacity must be non-zero");
        let first = Arc::new(Chunk::new(0, chunk_capacity));
        Self {
            chunk_capacity,
            max_chunks,
            chunks: RwLock::new(vec![first.clone()]),
            active: RwLock::new(first),
            blocked: Mutex::new(Vec::new()),
            recycled: Mutex::new(Vec::new()),
        }
    }

    /// Place a task into a slot and return its key.
    ///
    /// Bump-allocates in the active chunk; on exhaustion, rotates in a fresh
    /// chunk and retries. Fails only when the chunk limit forbids growth.
    pub fn insert(&self, task: Task) -> Result<TaskKey, EmplaceError> {
        loop {
            let chunk = self.active.read().clone();
            match chunk.bump() {
                Some(slot) => return Ok(self.place(&chunk, slot, task)),
                None => {
                    // retry against a freshly installed chunk
                    self.rotate(&chunk)?;
                }
            }
        }
    }

    fn place(&self, chunk: &Arc<Chunk>, slot_index: usize, task: Task) -> TaskKey {
        let slot = &chunk.slots[slot_index];
        let generation = slot.generation.load(Ordering::Acquire);
        // the live count was already charged when the slot was claimed
        *slot.cell.write() = Some(task);
        TaskKey {
            chunk: chunk.index,
            slot: slot_index as u32,
            generation,
        }
    }

    /// Retire `exhausted` into the blocked list and install a replacement.
    ///
    /// Prefers a recycled chunk over growing the table.
    fn rotate(&self, exhausted: &Arc<Chunk>) -> Result<(), EmplaceError> {
        let mut active = self.active.write();
        if !Arc::ptr_eq(&active, exhausted) {
            // another thread already rotated
            return Ok(());
        }

        let fresh = match self.recycled.lock().pop() {
            Some(chunk) => {
                chunk.reset();
                trace!(chunk = chunk.index, "recycling arena chunk");
                chunk
            }
            None => {
                let mut chunks = self.chunks.write();
                if let Some(limit) = self.max_chunks {
                    if chunks.len() >= limit {
                        return Err(EmplaceError::OutOfMemory { limit });
                    }
                }
                let chunk = Arc::new(Chunk::new(chunks.len() as u32, self.chunk_capacity));
                chunks.push(chunk.clone());
                trace!(chunk = chunk.index, "created arena chunk");
                chunk
            }
        };

        let old = std::mem::replace(&mut *active, fresh);
        if old.live.load(Ordering::Acquire) == 0 {
            // Emptied while it was still the active chunk. Nothing revisits
            // the blocked list except removals, so recycle it here instead
            // of parking it there for good.
            old.reset();
            trace!(chunk = old.index, "retired chunk already empty");
            self.recycled.lock().push(old);
        } else {
            self.blocked.lock().push(old);
        }
        Ok(())
    }

    /// Run `f` against the task behind `key`, if it is still there.
    ///
    /// A stale key (freed slot, newer generation) yields `None`.
    pub fn with<R>(&self, key: TaskKey, f: impl FnOnce(&Task) -> R) -> Option<R> {
        let chunk = self.chunks.read().get(key.chunk as usize)?.clone();
        let slot = chunk.slots.get(key.slot as usize)?;
        let guard = slot.cell.read();
        if slot.generation.load(Ordering::Acquire) != key.generation {
            return None;
        }
        guard.as_ref().map(f)
    }

    /// Take the task behind `key` out of the arena.
    ///
    /// Bumps the slot generation (invalidating all outstanding copies of the
    /// key) and, if this empties a blocked chunk, moves that chunk to the
    /// recycled pool.
    pub fn remove(&self, key: TaskKey) -> Option<Task> {
        let chunk = self.chunks.read().get(key.chunk as usize)?.clone();
        let slot = chunk.slots.get(key.slot as usize)?;

        let task = {
            let mut guard = slot.cell.write();
            if slot.generation.load(Ordering::Acquire) != key.generation {
                return None;
            }
            let task = guard.take()?;
            slot.generation.fetch_add(1, Ordering::Release);
            task
        };

        let remaining = chunk.live.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && chunk.is_exhausted() && !Arc::ptr_eq(&self.active.read(), &chunk) {
            let mut blocked = self.blocked.lock();
            if let Some(position) = blocked.iter().position(|c| Arc::ptr_eq(c, &chunk)) {
                let emptied = blocked.remove(position);
                drop(blocked);
                trace!(chunk = emptied.index, "arena chunk fully freed");
                self.recycled.lock().push(emptied);
            }
        }

        Some(task)
    }

    /// Total number of chunks ever created (recycled ones included).
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Number of exhausted chunks still holding live tasks.
    pub fn blocked_count(&self) -> usize {
        self.blocked.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn arena(chunk_capacity: usize, max_chunks: Option<usize>) -> TaskArena {
        TaskArena::new(chunk_capacity, max_chunks)
    }

    fn dummy_task() -> Task {
        Task::for_tests()
    }

    #[test]
    fn insert_and_lookup() {
        let arena = arena(8, None);
        let key = arena.insert(dummy_task()).unwrap();
        let id = arena.with(key, |task| task.id());
        assert!(id.is_some());
    }

    #[test]
    fn stale_key_is_rejected() {
        let arena = arena(8, None);
        let key = arena.insert(dummy_task()).unwrap();
        assert!(arena.remove(key).is_some());
        assert!(arena.with(key, |_| ()).is_none());
        assert!(arena.remove(key).is_none());
    }

    #[test]
    fn allocations_within_one_chunk_do_not_grow() {
        let arena = arena(16, None);
        let keys: Vec<_> = (0..16).map(|_| arena.insert(dummy_task()).unwrap()).collect();
        assert_eq!(arena.chunk_count(), 1);
        for key in keys {
            arena.remove(key);
        }
        assert_eq!(arena.chunk_count(), 1);
    }

    #[test]
    fn exceeding_a_chunk_rotates() {
        let arena = arena(4, None);
        // 9 tasks across 4-slot chunks: ceil(9 / 4) = 3 chunks
        let _keys: Vec<_> = (0..9).map(|_| arena.insert(dummy_task()).unwrap()).collect();
        assert_eq!(arena.chunk_count(), 3);
        assert_eq!(arena.blocked_count(), 2);
    }

    #[test]
    fn fully_freed_blocked_chunk_is_recycled() {
        let arena = arena(2, None);
        let first = arena.insert(dummy_task()).unwrap();
        let second = arena.insert(dummy_task()).unwrap();
        // force rotation
        let _third = arena.insert(dummy_task()).unwrap();
        assert_eq!(arena.blocked_count(), 1);

        arena.remove(first);
        arena.remove(second);
        assert_eq!(arena.blocked_count(), 0);

        // the recycled chunk is reused before a new one is created
        let _fourth = arena.insert(dummy_task()).unwrap();
        let _fifth = arena.insert(dummy_task()).unwrap();
        assert_eq!(arena.chunk_count(), 2);
    }

    #[test]
    fn chunk_emptied_before_rotation_is_recycled() {
        let arena = arena(2, None);
        let first = arena.insert(dummy_task()).unwrap();
        let second = arena.insert(dummy_task()).unwrap();
        // empty the chunk while it is still the active one
        arena.remove(first);
        arena.remove(second);

        // rotation retires the already-empty chunk straight to the recycle
        // pool, not the blocked list
        let _third = arena.insert(dummy_task()).unwrap();
        assert_eq!(arena.blocked_count(), 0);
        assert_eq!(arena.chunk_count(), 2);

        // and it is reused before any new chunk is created
        let _fourth = arena.insert(dummy_task()).unwrap();
        let _fifth = arena.insert(dummy_task()).unwrap();
        assert_eq!(arena.chunk_count(), 2);
    }

    #[test]
    fn bounded_arena_survives_full_free_before_rotation() {
        let arena = arena(2, Some(2));
        let keys: Vec<_> = (0..2).map(|_| arena.insert(dummy_task()).unwrap()).collect();
        for key in keys {
            arena.remove(key);
        }

        // every slot was freed, so the chunk limit must not be hit
        for _ in 0..3 {
            arena.insert(dummy_task()).unwrap();
        }
        assert_eq!(arena.chunk_count(), 2);
    }

    #[test]
    fn chunk_limit_surfaces_out_of_memory() {
        let arena = arena(2, Some(2));
        for _ in 0..4 {
            arena.insert(dummy_task()).unwrap();
        }
        let err = arena.insert(dummy_task()).unwrap_err();
        assert_eq!(err, EmplaceError::OutOfMemory { limit: 2 });
    }

    #[test]
    fn concurrent_inserts_get_distinct_keys() {
        let arena = Arc::new(arena(8, None));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let arena = arena.clone();
            handles.push(std::thread::spawn(move || {
                (0..32)
                    .map(|_| arena.insert(Task::for_tests()).unwrap())
                    .collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<TaskKey> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let before = all.len();
        all.sort_by_key(|k| (k.chunk, k.slot, k.generation));
        all.dedup();
        assert_eq!(all.len(), before);
    }

    #[test]
    fn concurrent_churn_never_loses_in_flight_placements() {
        // Tiny chunks force constant rotation and recycling under the
        // churn; a placement overwritten by a premature recycle would
        // surface as a failed lookup or removal below.
        let arena = Arc::new(arena(2, None));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let arena = arena.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    let key = arena.insert(Task::for_tests()).unwrap();
                    assert!(arena.with(key, |_| ()).is_some());
                    assert!(arena.remove(key).is_some());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
