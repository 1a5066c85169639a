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

/// Returns true if the term is an [ATermInt] term.
pub fn is_int_term<'a, 'b>(t: &'b impl Term<'a, 'b>) -> bool {
    t.term_type() == TermType::Int
}

/// Returns true if the term is an [ATermReal] term.
pub fn is_real_term<'a, 'b>(t: &'b impl Term<'a, 'b>) -> bool {
    t.term_type() == TermType::Real
}

/// This is a wrapper around the [ATerm] type that stores a single `i64`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ATermInt {
    term: ATerm,
}

impl ATermInt {
    pub fn new(pool: &TermPool, value: i64) -> ATermInt {
        ATermInt {
            term: pool.create_int(value),
        }
    }

    /// Returns the value of the integer term.
    pub fn value(&self) -> i64 {
        self.get().value()
    }

    /// Returns a borrow from the term.
    pub fn get(&self) -> ATermIntRef<'_> {
        ATermIntRef { term: self.term.get() }
    }
}

/// A lifetime bound reference to an [ATermInt].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ATermIntRef<'a> {
    term: ATermRef<'a>,
}

impl ATermIntRef<'_> {
    /// Returns the value of the integer term.
    pub fn value(&self) -> i64 {
        self.term.pool().storage().int_value(self.term.id())
    }

    /// Protects the term from garbage collection
    pub fn protect(&self) -> ATermInt {
        ATermInt {
            term: self.term.protect(),
        }
    }
}

impl<'a, 'b> Term<'a, 'b> for ATermInt
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

impl<'a> Term<'a, '_> for ATermIntRef<'a> {
    delegate! {
        to self.term {
            fn protect(&self) -> ATerm;
            fn arg(&self, index: usize) -> ATermRef<'a>;
            fn arguments(&self) -> ATermArgs<'a>;
            fn copy(&self) -> ATermRef<'a>;
            fn get_head_symbol(&self) -> SymbolRef<'a>;
            fn iter(&self) -> TermIterator<'a>;
            fn pool(&self) -> &'a TermPool;
            fn id(&self) -> TermId;
            fn term_type(&self) -> TermType;
        }
    }
}

impl From<ATerm> for ATermInt {
    fn from(term: ATerm) -> Self {
        debug_assert!(is_int_term(&term), "Term {term} is not an integer");
        ATermInt { term }
    }
}

impl From<ATermInt> for ATerm {
    fn from(value: ATermInt) -> Self {
        value.term
    }
}

impl<'a> From<ATermRef<'a>> for ATermIntRef<'a> {
    fn from(term: ATermRef<'a>) -> Self {
        debug_assert!(is_int_term(&term), "Term {term} is not an integer");
        ATermIntRef { term }
    }
}

impl fmt::Display for ATermInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl fmt::Debug for ATermInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl fmt::Display for ATermIntRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl fmt::Debug for ATermIntRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// This is a wrapper around the [ATerm] type that stores a single `f64`.
///
/// Reals are shared on their bit pattern, so `0.0` and `-0.0` are different
/// terms and every NaN payload is a term of its own.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ATermReal {
    term: ATerm,
}

impl ATermReal {
    pub fn new(pool: &TermPool, value: f64) -> ATermReal {
        ATermReal {
            term: pool.create_real(value),
        }
    }

    /// Returns the value of the real term.
    pub fn value(&self) -> f64 {
        self.term.pool().storage().real_value(self.term.id())
    }
}

impl<'a, 'b> Term<'a, 'b> for ATermReal
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

impl From<ATerm> for ATermReal {
    fn from(term: ATerm) -> Self {
        debug_assert!(is_real_term(&term), "Term {term} is not a real");
        ATermReal { term }
    }
}

impl From<ATermReal> for ATerm {
    fn from(value: ATermReal) -> Self {
        value.term
    }
}

impl fmt::Display for ATermReal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value())
    }
}

impl fmt::Debug for ATermReal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use atlas_utilities::test_logger;

    use super::*;

    #[test]
    fn test_int_term() {
        test_logger();
        let pool = TermPool::new();

        let int_term = ATermInt::new(&pool, 42);
        assert_eq!(int_term.value(), 42);
        assert!(is_int_term(&int_term));
        assert_eq!(ATermInt::new(&pool, -7).value(), -7);
        assert_eq!(ATermInt::new(&pool, i64::MIN).value(), i64::MIN);

        let reference = int_term.get();
        assert_eq!(reference.protect(), int_term);
        assert_eq!(ATermIntRef::from(int_term.copy()).value(), 42);
    }

    #[test]
    fn test_real_term() {
        let pool = TermPool::new();

        let real = ATermReal::new(&pool, 2.5);
        assert_eq!(real.value(), 2.5);
        assert!(is_real_term(&real));
        assert!(!is_int_term(&real));

        assert_eq!(ATermReal::new(&pool, 2.5), real);
        assert_ne!(ATermReal::new(&pool, 0.0), ATermReal::new(&pool, -0.0));
        assert!(ATermReal::new(&pool, f64::NAN).value().is_nan());
    }
}
