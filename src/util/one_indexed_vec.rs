//! A `std::vec::Vec`, but 1-indexed instead of 0-indexed.

use std::ops::Index;
use std::ops::IndexMut;

/// Like a `std::vec::Vec`, but 1-indexed instead of 0-indexed. Index 0 is
/// never valid; `get(0)` returns `None`, matching the class file convention
/// that a zero constant pool index means "no entry".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneIndexedVec<T> {
    vec: Vec<T>,
}

impl<T> Default for OneIndexedVec<T> {
    fn default() -> Self {
        OneIndexedVec::new()
    }
}

impl<T> OneIndexedVec<T> {
    pub fn new() -> Self {
        OneIndexedVec { vec: Vec::new() }
    }

    /// Returns the element at the given index, or None if the index is 0 or
    /// out of bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index == 0 {
            return None;
        }
        self.vec.get(index - 1)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index == 0 {
            return None;
        }
        self.vec.get_mut(index - 1)
    }

    /// Appends an element and returns its (1-based) index.
    pub fn push(&mut self, value: T) -> usize {
        self.vec.push(value);
        self.vec.len()
    }

    /// Returns the number of elements in the vector.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Returns true if the vector has a length of 0.
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    /// Returns an iterator over the elements, starting with index 1.
    pub fn iter(&self) -> ::std::slice::Iter<T> {
        self.vec.iter()
    }

    /// Returns an iterator over `(index, element)` pairs with 1-based indices.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &T)> {
        self.vec.iter().enumerate().map(|(i, v)| (i + 1, v))
    }
}

impl<T> Index<usize> for OneIndexedVec<T> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        if index == 0 {
            panic!("index is 0");
        }
        &self.vec[index - 1]
    }
}

impl<T> IndexMut<usize> for OneIndexedVec<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        if index == 0 {
            panic!("index is 0");
        }
        &mut self.vec[index - 1]
    }
}

impl<T> From<Vec<T>> for OneIndexedVec<T> {
    fn from(vec: Vec<T>) -> Self {
        OneIndexedVec { vec }
    }
}

impl<'a, T> IntoIterator for &'a OneIndexedVec<T> {
    type Item = &'a T;
    type IntoIter = ::std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.vec.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_one_based() {
        let mut v = OneIndexedVec::new();
        assert_eq!(v.push('a'), 1);
        assert_eq!(v.push('b'), 2);
        assert_eq!(v.get(0), None);
        assert_eq!(v.get(1), Some(&'a'));
        assert_eq!(v[2], 'b');
        assert_eq!(v.get(3), None);
        assert_eq!(v.indexed().map(|(i, _)| i).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_default_without_default_elements() {
        struct NoDefault;
        let v: OneIndexedVec<NoDefault> = Default::default();
        assert!(v.get(1).is_none());
    }
}
