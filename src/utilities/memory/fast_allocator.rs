use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use super::arena::{Arena, ArenaIndex};

/// Smallest chunk handed to a worker, in bytes.
pub const MIN_BLOCK_SIZE: usize = 1024;
/// Largest chunk handed to a worker, in bytes.
pub const MAX_ALLOCATION_SIZE: usize = 2 * 1024 * 1024;
/// The estimate is carved into roughly this many worker chunks.
const MAIN_ALLOC_OVERHEAD: usize = 20;
/// Number of worker chunks a single thread is expected to fill before parallelism pays off.
const SINGLE_THREAD_BLOCKS: usize = 2;

/// Snapshot of the allocator's bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStatistics {
    /// Bytes passed to the last `init_estimate`.
    pub estimated_bytes: usize,
    /// Bytes reserved by all chunks handed out.
    pub reserved_bytes: usize,
    /// Bytes actually written.
    pub used_bytes: usize,
    pub node_chunks: usize,
    pub leaf_chunks: usize,
    /// Whether the reservations outgrew the estimate and more chunks had to be requested.
    pub exceeded_estimate: bool,
}

/// Chunk table shared by every worker. Workers own a chunk exclusively while they fill it and
/// commit it back when it is full or when they are done.
struct ChunkTable<T> {
    chunks: Mutex<Vec<Vec<T>>>,
    capacity: usize,
}

impl<T> ChunkTable<T> {
    fn new(capacity: usize) -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Registers a new chunk slot and returns its id. The slot stays empty until committed.
    fn request(&self) -> u32 {
        let mut chunks = self.chunks.lock();
        let id = chunks.len();
        chunks.push(Vec::new());
        id as u32
    }

    fn commit(&self, id: u32, chunk: Vec<T>) {
        let mut chunks = self.chunks.lock();
        debug_assert!(
            chunks[id as usize].is_empty(),
            "A chunk slot must be committed exactly once."
        );
        chunks[id as usize] = chunk;
    }

    fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    fn into_arena(self) -> Arena<T> {
        Arena::from_chunks(self.chunks.into_inner())
    }
}

/// Arena allocator used while building a hierarchy.
///
/// The allocator is sized once from a byte estimate. Every parallel task obtains its own
/// [`CachedAllocator`] which carves nodes and leaf blocks out of privately owned chunks, so no
/// locking happens per allocation. When a chunk runs out the task commits it and requests a
/// fresh one from the shared table; if that pushes the reservations past the estimate the
/// allocator keeps going and only records the fact.
pub struct FastAllocator<N, L> {
    nodes: ChunkTable<N>,
    leaves: ChunkTable<L>,
    estimated_bytes: usize,
    block_bytes: usize,
    reserved_bytes: CachePadded<AtomicUsize>,
    used_bytes: CachePadded<AtomicUsize>,
    exceeded_estimate: AtomicBool,
}

impl<N, L> Default for FastAllocator<N, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, L> FastAllocator<N, L> {
    /// Creates an allocator with minimum sized chunks. Call `init_estimate` before building.
    pub fn new() -> Self {
        Self::with_block_bytes(0, MIN_BLOCK_SIZE)
    }

    fn with_block_bytes(estimated_bytes: usize, block_bytes: usize) -> Self {
        let node_capacity = (block_bytes / mem::size_of::<N>().max(1)).max(1);
        let leaf_capacity = (block_bytes / mem::size_of::<L>().max(1)).max(MAX_LEAF_RUN);
        Self {
            nodes: ChunkTable::new(node_capacity),
            leaves: ChunkTable::new(leaf_capacity),
            estimated_bytes,
            block_bytes,
            reserved_bytes: CachePadded::new(AtomicUsize::new(0)),
            used_bytes: CachePadded::new(AtomicUsize::new(0)),
            exceeded_estimate: AtomicBool::new(false),
        }
    }

    /// Sizes the worker chunks from the expected total footprint of the build.
    ///
    /// # Arguments
    ///
    /// * `bytes_estimate` - Expected bytes of nodes and leaf blocks together.
    pub fn init_estimate(&mut self, bytes_estimate: usize) {
        debug_assert!(
            self.nodes.chunk_count() == 0 && self.leaves.chunk_count() == 0,
            "The estimate must be set before anything is allocated."
        );
        let block_bytes = (bytes_estimate / MAIN_ALLOC_OVERHEAD).clamp(MIN_BLOCK_SIZE, MAX_ALLOCATION_SIZE);
        *self = Self::with_block_bytes(bytes_estimate, block_bytes);
    }

    /// Bytes of a single worker chunk.
    #[inline]
    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Picks the subtree size below which a build should stop spawning parallel tasks.
    ///
    /// Small builds would otherwise spread a handful of nodes over many half empty worker chunks.
    /// If the estimate comfortably covers one single-threaded share per worker the default is
    /// kept; otherwise the threshold is raised so each task fills at least that share.
    pub fn fix_single_thread_threshold(
        &self,
        branching_factor: usize,
        default_threshold: usize,
        num_primitives: usize,
        bytes_estimate: usize,
    ) -> usize {
        let single_thread_bytes = SINGLE_THREAD_BLOCKS * self.block_bytes;
        let thread_count = rayon::current_num_threads().max(1);
        if num_primitives == 0 || bytes_estimate > single_thread_bytes * thread_count {
            return default_threshold;
        }
        let bytes_per_primitive = (bytes_estimate as f64 / num_primitives as f64).max(1.0);
        (branching_factor as f64 * single_thread_bytes as f64 / bytes_per_primitive).ceil() as usize
    }

    /// Creates a per-task allocator drawing from this arena.
    #[inline]
    pub fn cached(&self) -> CachedAllocator<'_, N, L> {
        CachedAllocator {
            parent: self,
            node_chunk: None,
            leaf_chunk: None,
        }
    }

    fn reserve(&self, bytes: usize) {
        let reserved = self.reserved_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if reserved > self.estimated_bytes && !self.exceeded_estimate.swap(true, Ordering::Relaxed) {
            log::debug!(
                "arena estimate of {} bytes exceeded, continuing with additional chunks",
                self.estimated_bytes
            );
        }
    }

    pub fn statistics(&self) -> AllocatorStatistics {
        AllocatorStatistics {
            estimated_bytes: self.estimated_bytes,
            reserved_bytes: self.reserved_bytes.load(Ordering::Relaxed),
            used_bytes: self.used_bytes.load(Ordering::Relaxed),
            node_chunks: self.nodes.chunk_count(),
            leaf_chunks: self.leaves.chunk_count(),
            exceeded_estimate: self.exceeded_estimate.load(Ordering::Relaxed),
        }
    }

    /// Consumes the allocator, yielding the node arena, the leaf arena and final statistics.
    /// All cached allocators must have been dropped, which the borrow checker guarantees.
    pub fn into_arenas(self) -> (Arena<N>, Arena<L>, AllocatorStatistics) {
        let statistics = self.statistics();
        (self.nodes.into_arena(), self.leaves.into_arena(), statistics)
    }
}

/// Longest run of leaf blocks a single leaf may request.
pub const MAX_LEAF_RUN: usize = 8;

/// Per-task view of a [`FastAllocator`]. Owns its current chunks exclusively and commits them
/// back to the shared table when they fill up or when it is dropped.
pub struct CachedAllocator<'a, N, L> {
    parent: &'a FastAllocator<N, L>,
    node_chunk: Option<(u32, Vec<N>)>,
    leaf_chunk: Option<(u32, Vec<L>)>,
}

impl<'a, N, L> CachedAllocator<'a, N, L> {
    /// Stores a node and returns its location.
    pub fn alloc_node(&mut self, node: N) -> ArenaIndex {
        let parent = self.parent;
        if matches!(&self.node_chunk, Some((_, chunk)) if chunk.len() == chunk.capacity()) {
            if let Some((id, chunk)) = self.node_chunk.take() {
                parent.nodes.commit(id, chunk);
            }
        }
        let (id, chunk) = self.node_chunk.get_or_insert_with(|| {
            let id = parent.nodes.request();
            parent.reserve(parent.nodes.capacity * mem::size_of::<N>());
            (id, Vec::with_capacity(parent.nodes.capacity))
        });
        parent.used_bytes.fetch_add(mem::size_of::<N>(), Ordering::Relaxed);
        let offset = chunk.len() as u32;
        chunk.push(node);
        ArenaIndex::new(*id, offset)
    }

    /// Stores `count` consecutive leaf blocks produced by `blocks` and returns the location of
    /// the first. The run never straddles chunks.
    pub fn alloc_leaf_blocks(&mut self, count: usize, blocks: impl IntoIterator<Item = L>) -> ArenaIndex {
        debug_assert!(
            count > 0 && count <= MAX_LEAF_RUN,
            "Leaf runs must hold between 1 and {MAX_LEAF_RUN} blocks, got {count}."
        );
        let parent = self.parent;
        if matches!(&self.leaf_chunk, Some((_, chunk)) if chunk.capacity() - chunk.len() < count) {
            if let Some((id, chunk)) = self.leaf_chunk.take() {
                parent.leaves.commit(id, chunk);
            }
        }
        let (id, chunk) = self.leaf_chunk.get_or_insert_with(|| {
            let id = parent.leaves.request();
            parent.reserve(parent.leaves.capacity * mem::size_of::<L>());
            (id, Vec::with_capacity(parent.leaves.capacity))
        });
        parent.used_bytes.fetch_add(count * mem::size_of::<L>(), Ordering::Relaxed);
        let offset = chunk.len();
        chunk.extend(blocks);
        debug_assert_eq!(
            chunk.len() - offset,
            count,
            "Leaf block iterator yielded a different number of blocks than requested."
        );
        ArenaIndex::new(*id, offset as u32)
    }
}

impl<'a, N, L> Drop for CachedAllocator<'a, N, L> {
    fn drop(&mut self) {
        if let Some((id, chunk)) = self.node_chunk.take() {
            self.parent.nodes.commit(id, chunk);
        }
        if let Some((id, chunk)) = self.leaf_chunk.take() {
            self.parent.leaves.commit(id, chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_survive_chunk_rollover() {
        let allocator: FastAllocator<u64, [u8; 64]> = FastAllocator::new();
        let mut indices = Vec::new();
        {
            let mut cached = allocator.cached();
            for i in 0..1000u64 {
                indices.push((i, cached.alloc_node(i)));
            }
        }
        let statistics = allocator.statistics();
        assert!(statistics.node_chunks > 1);
        assert!(statistics.exceeded_estimate);
        let (nodes, _, _) = allocator.into_arenas();
        for (value, index) in indices {
            assert_eq!(*nodes.get(index), value);
        }
    }

    #[test]
    fn test_leaf_runs_are_contiguous() {
        let mut allocator: FastAllocator<u64, u32> = FastAllocator::new();
        allocator.init_estimate(64 * 1024);
        let mut runs = Vec::new();
        {
            let mut cached = allocator.cached();
            for i in 0..500u32 {
                let count = (i % 7 + 1) as usize;
                let start = cached.alloc_leaf_blocks(count, (0..count as u32).map(|j| i * 10 + j));
                runs.push((i, count, start));
            }
        }
        let (_, leaves, statistics) = allocator.into_arenas();
        assert_eq!(statistics.estimated_bytes, 64 * 1024);
        for (i, count, start) in runs {
            let blocks = leaves.slice(start, count);
            assert!(blocks.iter().enumerate().all(|(j, b)| *b == i * 10 + j as u32));
        }
    }

    #[test]
    fn test_parallel_tasks_commit_their_chunks() {
        let mut allocator: FastAllocator<usize, u8> = FastAllocator::new();
        allocator.init_estimate(1 << 20);
        let indices: Vec<(usize, ArenaIndex)> = {
            use rayon::prelude::*;
            (0..64usize)
                .into_par_iter()
                .flat_map_iter(|task| {
                    let mut cached = allocator.cached();
                    (0..100)
                        .map(|i| (task * 100 + i, cached.alloc_node(task * 100 + i)))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        let (nodes, _, statistics) = allocator.into_arenas();
        assert_eq!(statistics.used_bytes, 6400 * std::mem::size_of::<usize>());
        for (value, index) in indices {
            assert_eq!(*nodes.get(index), value);
        }
    }

    #[test]
    fn test_single_thread_threshold_grows_for_small_builds() {
        let mut allocator: FastAllocator<u64, u64> = FastAllocator::new();
        allocator.init_estimate(10_000);
        let threshold = allocator.fix_single_thread_threshold(4, 1024, 100, 10_000);
        let expected = (4.0 * (2 * MIN_BLOCK_SIZE) as f64 / 100.0).ceil() as usize;
        if rayon::current_num_threads() * 2 * MIN_BLOCK_SIZE >= 10_000 {
            assert_eq!(threshold, expected);
        } else {
            assert_eq!(threshold, 1024);
        }
        assert_eq!(allocator.fix_single_thread_threshold(4, 1024, 0, 0), 1024);
    }
}
