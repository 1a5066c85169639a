//!
//! A list of terms, where T is the type of the elements in the list.
//!
#![forbid(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;

use delegate::delegate;
use itertools::Itertools;

use atlas_utilities::AtlasError;

use crate::ATerm;
use crate::ATermArgs;
use crate::ATermRef;
use crate::SymbolRef;
use crate::Term;
use crate::TermIterator;
use crate::storage::TermId;
use crate::storage::TermPool;
use crate::storage::TermType;

/// Returns true iff the term is a list term, which includes the empty list.
pub fn is_list_term<'a, 'b>(t: &'b impl Term<'a, 'b>) -> bool {
    t.term_type() == TermType::List
}

/// Returns true iff the term is an empty list.
pub fn is_empty_list_term<'a, 'b>(t: &'b impl Term<'a, 'b>) -> bool {
    is_list_term(t) && t.arguments().is_empty()
}

/// Represents a list of ATerms of type T.
///
/// # Details
///
/// Lists are terms of their own type, where a cons cell has the head of the
/// list as first argument and the tail as second argument, and the empty
/// list has no arguments. Every cell caches the length of the list.
pub struct ATermList<T> {
    term: ATerm,
    _marker: PhantomData<T>,
}

impl<T: From<ATerm>> ATermList<T> {
    /// Obtain the head, i.e. the first element, of the list.
    pub fn head(&self) -> T {
        self.term.arg(0).protect().into()
    }

    /// Converts the list into a vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Returns the element at the given position, or None when the list is shorter.
    pub fn element_at(&self, index: usize) -> Option<T> {
        self.terms().nth(index).map(|element| element.protect().into())
    }
}

impl<T> ATermList<T> {
    /// Constructs a new list from an iterator that is consumed.
    pub fn from_double_iter(pool: &TermPool, iter: impl DoubleEndedIterator<Item = T>) -> Self
    where
        T: Into<ATerm>,
    {
        let mut list = Self::empty(pool);
        for item in iter.rev() {
            list = list.cons(item);
        }
        list
    }

    /// Constructs a new list from an iterator that is consumed.
    pub fn try_from_double_iter(
        pool: &TermPool,
        iter: impl DoubleEndedIterator<Item = Result<T, AtlasError>>,
    ) -> Result<Self, AtlasError>
    where
        T: Into<ATerm>,
    {
        let mut list = Self::empty(pool);
        for item in iter.rev() {
            list = list.cons(item?);
        }
        Ok(list)
    }

    /// Constructs a new list with the given item as the head and the current list as the tail.
    pub fn cons(&self, item: T) -> Self
    where
        T: Into<ATerm>,
    {
        let item: ATerm = item.into();
        ATermList {
            term: self.term.pool().create_cons(&item, &self.term),
            _marker: PhantomData,
        }
    }

    /// Constructs the empty list.
    pub fn empty(pool: &TermPool) -> Self {
        ATermList {
            term: pool.empty_list(),
            _marker: PhantomData,
        }
    }

    /// Returns true iff the list is empty.
    pub fn is_empty(&self) -> bool {
        is_empty_list_term(&self.term)
    }

    /// Returns the number of elements, which is cached in the list cells.
    pub fn len(&self) -> usize {
        self.term.pool().storage().list_length(self.term.id())
    }

    /// Obtain the tail, i.e. the remainder, of the list.
    pub fn tail(&self) -> ATermList<T> {
        self.term.arg(1).into()
    }

    /// Returns an iterator over all elements in the list.
    pub fn iter(&self) -> ATermListIter<T> {
        ATermListIter { current: self.clone() }
    }

    /// Returns the position of the first occurrence of the element.
    pub fn index_of<'a, 'b>(&self, element: &'b impl Term<'a, 'b>) -> Option<usize> {
        let element = element.id();
        self.terms().position(|term| term.id() == element)
    }

    /// Returns the list with the elements in reverse order.
    pub fn reverse(&self) -> Self {
        let pool = self.term.pool();

        let mut result = pool.empty_list();
        for element in self.terms() {
            result = pool.create_cons(&element, &result);
        }

        result.into()
    }

    /// Returns the elements of this list followed by the elements of the other list.
    pub fn concat(&self, other: &ATermList<T>) -> Self {
        let pool = self.term.pool();
        let elements: Vec<ATermRef<'_>> = self.terms().collect();

        let mut result = other.term.clone();
        for element in elements.iter().rev() {
            result = pool.create_cons(element, &result);
        }

        result.into()
    }

    /// Iterates over the elements without protecting them.
    fn terms(&self) -> impl Iterator<Item = ATermRef<'_>> {
        let mut current = self.term.get();
        std::iter::from_fn(move || {
            if is_empty_list_term(&current) {
                None
            } else {
                let head = current.arg(0);
                current = current.arg(1);
                Some(head)
            }
        })
    }
}

impl<'a, 'b, T> Term<'a, 'b> for ATermList<T>
where
    'b: 'a,
{
    delegate! {
        to self.term {
            fn protect(&self) -> ATerm;
            fn arg(&'b self, index: usize) -> ATermRef<'a>;
            fn arguments(&'b self) -> ATermArgs<'a>;
            fn copy(&'b self) -> ATermRef<'a>;
            fn get_head_symbol(&'b self) -> SymbolRef<'a>;
            fn iter(&'b self) -> TermIterator<'a>;
            fn pool(&'b self) -> &'a TermPool;
            fn id(&self) -> TermId;
            fn term_type(&self) -> TermType;
        }
    }
}

impl<T> Clone for ATermList<T> {
    fn clone(&self) -> Self {
        ATermList {
            term: self.term.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for ATermList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term
    }
}

impl<T> Eq for ATermList<T> {}

impl<T> From<ATermList<T>> for ATerm {
    fn from(value: ATermList<T>) -> Self {
        value.term
    }
}

impl<T: From<ATerm>> Iterator for ATermListIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_empty() {
            None
        } else {
            let head = self.current.head();
            self.current = self.current.tail();
            Some(head)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let length = self.current.len();
        (length, Some(length))
    }
}

impl<T> From<ATerm> for ATermList<T> {
    fn from(value: ATerm) -> Self {
        debug_assert!(is_list_term(&value), "Can only convert a list term");
        ATermList::<T> {
            term: value,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> From<ATermRef<'a>> for ATermList<T> {
    fn from(value: ATermRef<'a>) -> Self {
        debug_assert!(is_list_term(&value), "Can only convert a list term");
        ATermList::<T> {
            term: value.protect(),
            _marker: PhantomData,
        }
    }
}

impl<T: From<ATerm>> IntoIterator for ATermList<T> {
    type IntoIter = ATermListIter<T>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: From<ATerm>> IntoIterator for &ATermList<T> {
    type IntoIter = ATermListIter<T>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: From<ATerm> + fmt::Display> fmt::Display for ATermList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.iter().format(","))
    }
}

impl<T> fmt::Debug for ATermList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.term)
    }
}

/// The iterator over the elements of an [ATermList].
pub struct ATermListIter<T> {
    current: ATermList<T>,
}

#[cfg(test)]
mod tests {
    use crate::ATermInt;

    use super::*;

    fn int_list(pool: &TermPool, values: &[i64]) -> ATermList<ATermInt> {
        ATermList::from_double_iter(pool, values.iter().map(|value| ATermInt::new(pool, *value)))
    }

    #[test]
    fn test_list_term() {
        let pool = TermPool::new();

        let list = int_list(&pool, &[1, 2, 3]);
        assert_eq!(list.head().value(), 1);
        assert_eq!(list.tail().head().value(), 2);
        assert_eq!(list.tail().tail().head().value(), 3);
        assert!(list.tail().tail().tail().is_empty());
        assert_eq!(list.len(), 3);
        assert_eq!(list.to_string(), "[1,2,3]");
    }

    #[test]
    fn test_list_operations() {
        let pool = TermPool::new();

        let list = int_list(&pool, &[1, 2, 3]);
        assert_eq!(list.element_at(1).map(|x| x.value()), Some(2));
        assert!(list.element_at(3).is_none());
        assert_eq!(list.index_of(&ATermInt::new(&pool, 3)), Some(2));
        assert_eq!(list.index_of(&ATermInt::new(&pool, 4)), None);

        assert_eq!(list.reverse(), int_list(&pool, &[3, 2, 1]));
        assert_eq!(list.concat(&int_list(&pool, &[4, 5])), int_list(&pool, &[1, 2, 3, 4, 5]));
        assert_eq!(list.concat(&ATermList::empty(&pool)), list);
        assert_eq!(
            list.iter().map(|x| x.value()).collect::<Vec<_>>(),
            [1, 2, 3]
        );

        let empty = ATermList::<ATermInt>::empty(&pool);
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.reverse(), empty);
        assert_eq!(empty.to_string(), "[]");
    }

    #[test]
    fn test_long_list_length() {
        let pool = TermPool::new();

        let length = crate::storage::MAX_CACHED_LENGTH + 10;
        let list = ATermList::from_double_iter(&pool, (0..length as i64).map(|value| ATermInt::new(&pool, value % 3)));
        assert_eq!(list.len(), length);
        assert_eq!(list.tail().len(), length - 1);
    }

    #[test]
    fn test_try_from_double_iter() {
        let pool = TermPool::new();

        let values: Vec<Result<ATermInt, AtlasError>> = vec![Ok(ATermInt::new(&pool, 1)), Err("invalid".into())];
        assert!(ATermList::try_from_double_iter(&pool, values.into_iter()).is_err());
    }
}
