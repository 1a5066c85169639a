//! Indices into slot-based containers that detect use of a stale index in debug builds.
//!
//! A container hands out a [GenerationalIndex] whenever a slot is (re)filled. The
//! [GenerationCounter] remembers, per slot, how often it has been filled, and
//! [GenerationCounter::get_index] panics when an index from an earlier filling is
//! used. In release builds the generation is not stored at all and the index is a
//! plain `usize`.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::ops::Deref;

#[derive(Copy, Clone)]
pub struct GenerationalIndex {
    index: usize,

    #[cfg(debug_assertions)]
    generation: u32,
}

impl GenerationalIndex {
    /// Returns the slot this index refers to, without checking its generation.
    pub fn value(&self) -> usize {
        self.index
    }
}

impl Deref for GenerationalIndex {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.index
    }
}

/// Keeps the current generation of every slot of a container.
#[derive(Clone, Debug, Default)]
pub struct GenerationCounter {
    #[cfg(debug_assertions)]
    generations: Vec<u32>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation for the given slot and returns an index for it.
    pub fn create_index(&mut self, index: usize) -> GenerationalIndex {
        #[cfg(debug_assertions)]
        {
            if self.generations.len() <= index {
                self.generations.resize(index + 1, 0);
            }

            let generation = &mut self.generations[index];
            *generation = generation.wrapping_add(1);

            GenerationalIndex {
                index,
                generation: *generation,
            }
        }

        #[cfg(not(debug_assertions))]
        GenerationalIndex { index }
    }

    /// Returns an index for the current generation of the given slot.
    pub fn recall_index(&self, index: usize) -> GenerationalIndex {
        #[cfg(debug_assertions)]
        {
            GenerationalIndex {
                index,
                generation: self.generations.get(index).copied().unwrap_or(0),
            }
        }

        #[cfg(not(debug_assertions))]
        GenerationalIndex { index }
    }

    /// Returns the slot of the given index. Panics in debug builds when the slot
    /// has been refilled since the index was created.
    pub fn get_index(&self, index: GenerationalIndex) -> usize {
        #[cfg(debug_assertions)]
        {
            let current = self.generations.get(index.index).copied().unwrap_or(0);
            if current != index.generation {
                panic!("Attempting to use a stale index {index:?}, the slot is at generation {current}");
            }
        }

        index.index
    }
}

// Comparisons only consider the slot, so they behave the same in debug and release builds.

impl PartialEq for GenerationalIndex {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for GenerationalIndex {}

impl PartialOrd for GenerationalIndex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GenerationalIndex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl Hash for GenerationalIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Debug for GenerationalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(debug_assertions)]
        {
            write!(f, "{}@{}", self.index, self.generation)
        }

        #[cfg(not(debug_assertions))]
        {
            write!(f, "{}", self.index)
        }
    }
}

impl fmt::Display for GenerationalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}
