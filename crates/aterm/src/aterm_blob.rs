#![forbid(unsafe_code)]

use std::fmt;

use delegate::delegate;

use crate::ATerm;
use crate::ATermArgs;
use crate::ATermRef;
use crate::SymbolRef;
use crate::Term;
use crate::TermIterator;
use crate::storage::TermId;
use crate::storage::TermPool;
use crate::storage::TermType;

/// Returns true iff the term is a blob.
pub fn is_blob_term<'a, 'b>(t: &'b impl Term<'a, 'b>) -> bool {
    t.term_type() == TermType::Blob
}

/// A term holding an arbitrary byte string, shared on its content.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ATermBlob {
    term: ATerm,
}

impl ATermBlob {
    pub fn new(pool: &TermPool, bytes: &[u8]) -> ATermBlob {
        ATermBlob {
            term: pool.create_blob(bytes),
        }
    }

    /// Returns a copy of the bytes of the blob.
    pub fn bytes(&self) -> Vec<u8> {
        self.term.pool().storage().blob_bytes(self.term.id())
    }

    /// Returns the number of bytes.
    pub fn len(&self) -> usize {
        self.term.pool().storage().blob_length(self.term.id())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, 'b> Term<'a, 'b> for ATermBlob
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

impl From<ATerm> for ATermBlob {
    fn from(term: ATerm) -> Self {
        debug_assert!(is_blob_term(&term), "Term {term} is not a blob");
        ATermBlob { term }
    }
}

impl From<ATermBlob> for ATerm {
    fn from(value: ATermBlob) -> Self {
        value.term
    }
}

impl fmt::Display for ATermBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)
    }
}

impl fmt::Debug for ATermBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.term)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(b"" ; "empty")]
    #[test_case(b"abc" ; "partial word")]
    #[test_case(b"01234567" ; "exact word")]
    #[test_case(b"a longer blob spanning several words" ; "several words")]
    fn test_blob_contents(bytes: &[u8]) {
        let pool = TermPool::new();

        let blob = ATermBlob::new(&pool, bytes);
        assert_eq!(blob.bytes(), bytes);
        assert_eq!(blob.len(), bytes.len());
        assert!(is_blob_term(&blob));
        assert_eq!(blob, ATermBlob::new(&pool, bytes));
    }

    #[test]
    fn test_blob_trailing_zeroes() {
        let pool = TermPool::new();

        let short = ATermBlob::new(&pool, b"ab");
        let padded = ATermBlob::new(&pool, b"ab\0");
        assert_ne!(short, padded);
        assert_eq!(padded.len(), 3);
        assert!(ATermBlob::new(&pool, b"").is_empty());
    }
}
