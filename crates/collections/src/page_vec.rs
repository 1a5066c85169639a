use std::ops::Index;
use std::ops::IndexMut;

/// The number of elements stored in every page.
pub const PAGE_SIZE: usize = 1024;

/// A growable array stored as a list of fixed size pages. Growing never moves
/// existing elements, and [PageVec::clear] keeps the pages for reuse.
#[derive(Debug, Clone)]
pub struct PageVec<T> {
    pages: Vec<Vec<T>>,
    len: usize,
}

impl<T> PageVec<T> {
    pub fn new() -> Self {
        PageVec { pages: Vec::new(), len: 0 }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true iff there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of elements that fit in the allocated pages.
    pub fn capacity(&self) -> usize {
        self.pages.len() * PAGE_SIZE
    }

    /// Appends an element and returns its index.
    pub fn push(&mut self, value: T) -> usize {
        let (page, offset) = Self::position(self.len);
        if page == self.pages.len() {
            self.pages.push(Vec::with_capacity(PAGE_SIZE));
        }

        debug_assert_eq!(self.pages[page].len(), offset, "Pages are filled in order");
        self.pages[page].push(value);
        self.len += 1;
        self.len - 1
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len {
            let (page, offset) = Self::position(index);
            Some(&self.pages[page][offset])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len {
            let (page, offset) = Self::position(index);
            Some(&mut self.pages[page][offset])
        } else {
            None
        }
    }

    /// Removes all elements, but keeps the allocated pages.
    pub fn clear(&mut self) {
        for page in &mut self.pages {
            page.clear();
        }
        self.len = 0;
    }

    /// Returns an iterator over the elements in index order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.iter())
    }

    /// Returns an iterator over mutable references to the elements in index order.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        self.pages.iter_mut().flat_map(|page| page.iter_mut())
    }

    fn position(index: usize) -> (usize, usize) {
        (index / PAGE_SIZE, index % PAGE_SIZE)
    }
}

impl<T> Default for PageVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PageVec<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        assert!(index < self.len, "Index {index} out of bounds for length {}", self.len);
        let (page, offset) = Self::position(index);
        &self.pages[page][offset]
    }
}

impl<T> IndexMut<usize> for PageVec<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        assert!(index < self.len, "Index {index} out of bounds for length {}", self.len);
        let (page, offset) = Self::position(index);
        &mut self.pages[page][offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_vec_crosses_pages() {
        let mut vec = PageVec::new();
        for i in 0..(PAGE_SIZE * 2 + 10) {
            assert_eq!(vec.push(i), i);
        }

        assert_eq!(vec.len(), PAGE_SIZE * 2 + 10);
        assert_eq!(vec[PAGE_SIZE], PAGE_SIZE);
        assert_eq!(vec.get(PAGE_SIZE * 3), None);
        assert!(vec.iter().copied().eq(0..(PAGE_SIZE * 2 + 10)));

        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(vec.capacity(), PAGE_SIZE * 3);

        vec.push(42);
        assert_eq!(vec[0], 42);
    }
}
