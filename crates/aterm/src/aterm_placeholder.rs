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

/// Returns true iff the term is a placeholder.
pub fn is_placeholder_term<'a, 'b>(t: &'b impl Term<'a, 'b>) -> bool {
    t.term_type() == TermType::Placeholder
}

/// A placeholder stands for an unknown term of the given type, which is itself a term.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ATermPlaceholder {
    term: ATerm,
}

impl ATermPlaceholder {
    pub fn new<'a, 'b>(pool: &TermPool, type_term: &'b impl Term<'a, 'b>) -> ATermPlaceholder {
        ATermPlaceholder {
            term: pool.create_placeholder(type_term),
        }
    }

    /// Returns the type of the placeholder.
    pub fn type_term(&self) -> ATermRef<'_> {
        self.term.arg(0)
    }
}

impl<'a, 'b> Term<'a, 'b> for ATermPlaceholder
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

impl From<ATerm> for ATermPlaceholder {
    fn from(term: ATerm) -> Self {
        debug_assert!(is_placeholder_term(&term), "Term {term} is not a placeholder");
        ATermPlaceholder { term }
    }
}

impl From<ATermPlaceholder> for ATerm {
    fn from(value: ATermPlaceholder) -> Self {
        value.term
    }
}

impl fmt::Display for ATermPlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)
    }
}

impl fmt::Debug for ATermPlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder() {
        let pool = TermPool::new();

        let int_type = pool.create_constant(&pool.create_symbol("Int", 0));
        let placeholder = ATermPlaceholder::new(&pool, &int_type);

        assert!(is_placeholder_term(&placeholder));
        assert_eq!(placeholder.type_term(), int_type.copy());
        assert_eq!(placeholder, ATermPlaceholder::new(&pool, &int_type));
        assert_eq!(placeholder.to_string(), "<Int>");
        assert_eq!(placeholder.iter().count(), 2);
    }
}
