/// Location of an element inside an [`Arena`]: the chunk it lives in and its offset there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ArenaIndex {
    pub chunk: u32,
    pub offset: u32,
}

impl ArenaIndex {
    #[inline(always)]
    pub fn new(chunk: u32, offset: u32) -> Self {
        Self { chunk, offset }
    }
}

/// Chunked, append-only storage produced by a finished build.
///
/// Elements are addressed by [`ArenaIndex`] and are never moved once a chunk is committed, so
/// handles handed out during the build stay valid for the lifetime of the arena.
pub struct Arena<T> {
    chunks: Vec<Vec<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { chunks: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub(crate) fn from_chunks(chunks: Vec<Vec<T>>) -> Self {
        Self { chunks }
    }

    /// Gets the element at `index`.
    #[inline(always)]
    pub fn get(&self, index: ArenaIndex) -> &T {
        &self.chunks[index.chunk as usize][index.offset as usize]
    }

    /// Gets `count` consecutive elements starting at `index`. Runs never straddle chunks.
    #[inline(always)]
    pub fn slice(&self, index: ArenaIndex, count: usize) -> &[T] {
        let start = index.offset as usize;
        &self.chunks[index.chunk as usize][start..start + count]
    }

    /// Number of elements stored across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes occupied by stored elements.
    pub fn used_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }

    /// Bytes held by the chunks, including unused capacity.
    pub fn reserved_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.capacity()).sum::<usize>() * std::mem::size_of::<T>()
    }

    /// Releases unused chunk capacity. Indices stay valid.
    pub fn shrink_to_fit(&mut self) {
        for chunk in &mut self.chunks {
            chunk.shrink_to_fit();
        }
    }

    /// Iterates all elements in chunk order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|c| c.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_addresses_within_chunk() {
        let arena = Arena::from_chunks(vec![vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(arena.len(), 5);
        assert_eq!(*arena.get(ArenaIndex::new(1, 1)), 5);
        assert_eq!(arena.slice(ArenaIndex::new(0, 1), 2), &[2, 3]);
    }
}
