#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use delegate::delegate;

use atlas_collections::ProtectionIndex;

use crate::Markable;
use crate::SymbolRef;
use crate::storage::Marker;
use crate::storage::Storage;
use crate::storage::TermId;
use crate::storage::TermPool;
use crate::storage::TermType;

/// The ATerm trait represents a first-order term in the ATerm library.
/// It provides methods to manipulate and access the term's properties.
///
/// # Details
///
/// This trait is rather complicated with two lifetimes, but this is used
/// to support both the [ATerm], which has no lifetimes, and [ATermRef<'a>]
/// whose lifetime is bound by `'a`. Because now we can be require that `'b: 'a`
/// for the implementation of [Term<'a, 'b>] for [ATerm], we can safely return
/// [ATermRef<'a>] from methods of [Term<'a, 'b>].
pub trait Term<'a, 'b> {
    /// Protects the term from garbage collection
    fn protect(&self) -> ATerm;

    /// Returns the indexed argument of the term
    fn arg(&'b self, index: usize) -> ATermRef<'a>;

    /// Returns the list of arguments as a collection
    fn arguments(&'b self) -> ATermArgs<'a>;

    /// Makes a copy of the term with the same lifetime as itself.
    fn copy(&'b self) -> ATermRef<'a>;

    /// Returns the function symbol of the term, builtin types have a builtin symbol.
    fn get_head_symbol(&'b self) -> SymbolRef<'a>;

    /// Returns an iterator over all arguments of the term that runs in pre order traversal of the term trees.
    fn iter(&'b self) -> TermIterator<'a>;

    /// Returns the pool in which the term is stored.
    fn pool(&'b self) -> &'a TermPool;

    /// Returns the identifier of the term in its pool, equal identifiers are equal terms.
    fn id(&self) -> TermId;

    /// Returns the type of the term.
    fn term_type(&self) -> TermType;

    /// Returns the annotations of the term, a list of `[label, value]` pairs.
    fn annotations(&'b self) -> Option<ATermRef<'a>> {
        let pool = self.pool();
        let annotations = pool.storage().annotations(self.id());
        annotations.map(|annotations| ATermRef::new(pool, annotations))
    }

    /// Returns the value of the annotation with the given label.
    fn get_annotation<'c, 'd>(&'b self, label: &'d impl Term<'c, 'd>) -> Option<ATermRef<'a>> {
        let pool = self.pool();
        let value = pool.storage().annotation(self.id(), label.id());
        value.map(|value| ATermRef::new(pool, value))
    }

    /// Returns the depth of the term, see [TermPool::depth].
    fn depth(&'b self) -> usize {
        self.pool().storage().depth(self.id())
    }
}

/// This represents a lifetime bound reference to an existing [ATerm].
///
/// The reference is not protected itself, it is kept alive by the handle or
/// container it was obtained from and cannot outlive it.
#[derive(Clone, Copy)]
pub struct ATermRef<'a> {
    pool: &'a TermPool,
    id: TermId,
}

impl<'a> ATermRef<'a> {
    /// The term must be reachable from a root for the lifetime `'a`.
    pub(crate) fn new(pool: &'a TermPool, id: TermId) -> ATermRef<'a> {
        ATermRef { pool, id }
    }
}

impl<'a> Term<'a, '_> for ATermRef<'a> {
    fn protect(&self) -> ATerm {
        self.pool.protect(self.id)
    }

    fn arg(&self, index: usize) -> ATermRef<'a> {
        let argument = self.pool.storage().argument(self.id, index);
        ATermRef::new(self.pool, argument)
    }

    fn arguments(&self) -> ATermArgs<'a> {
        ATermArgs::new(*self)
    }

    fn copy(&self) -> ATermRef<'a> {
        *self
    }

    fn get_head_symbol(&self) -> SymbolRef<'a> {
        SymbolRef::new(self.pool, self.pool.storage().symbol(self.id))
    }

    fn iter(&self) -> TermIterator<'a> {
        TermIterator::new(*self)
    }

    fn pool(&self) -> &'a TermPool {
        self.pool
    }

    fn id(&self) -> TermId {
        self.id
    }

    fn term_type(&self) -> TermType {
        self.pool.storage().term_type(self.id)
    }
}

impl Markable for ATermRef<'_> {
    fn mark(&self, marker: &mut Marker) {
        marker.mark(self.id);
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.id == term
    }

    fn len(&self) -> usize {
        1
    }
}

impl PartialEq for ATermRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        debug_assert!(self.pool.ptr_eq(other.pool), "Terms of different pools are compared");
        self.id == other.id
    }
}

impl PartialEq<ATerm> for ATermRef<'_> {
    fn eq(&self, other: &ATerm) -> bool {
        self.eq(&other.get())
    }
}

impl Eq for ATermRef<'_> {}

impl Hash for ATermRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialOrd for ATermRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ATermRef<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        debug_assert!(self.pool.ptr_eq(other.pool), "Terms of different pools are compared");
        compare_terms(&self.pool.storage(), self.id, other.id)
    }
}

enum Compare {
    Terms(TermId, TermId),
    Annotations(Option<TermId>, Option<TermId>),
}

/// Compares two terms structurally without recursion.
///
/// Terms are ordered by type, applications by symbol name, arity and
/// arguments from left to right. Lists are ordered element-wise, where a
/// prefix is smaller. Terms that only differ in their annotations are ordered
/// by those, and an annotated term is larger than the same term without.
/// Only identical terms are equal.
fn compare_terms(storage: &Storage, left: TermId, right: TermId) -> Ordering {
    let mut stack = vec![Compare::Terms(left, right)];

    while let Some(item) = stack.pop() {
        let (left, right) = match item {
            Compare::Terms(left, right) => (left, right),
            Compare::Annotations(Some(left), Some(right)) => (left, right),
            Compare::Annotations(Some(_), None) => return Ordering::Greater,
            Compare::Annotations(None, Some(_)) => return Ordering::Less,
            Compare::Annotations(None, None) => continue,
        };

        if left == right {
            continue;
        }

        let (left_type, right_type) = (storage.term_type(left), storage.term_type(right));
        let ordering = left_type.cmp(&right_type).then_with(|| match left_type {
            TermType::Appl => {
                let (f, g) = (storage.symbol(left), storage.symbol(right));
                storage
                    .name(f)
                    .cmp(&storage.name(g))
                    .then_with(|| storage.symbols.arity(f).cmp(&storage.symbols.arity(g)))
                    .then_with(|| storage.symbols.is_quoted(f).cmp(&storage.symbols.is_quoted(g)))
            }
            TermType::Int => storage.int_value(left).cmp(&storage.int_value(right)),
            TermType::Real => storage.real_value(left).total_cmp(&storage.real_value(right)),
            TermType::List => storage.arity(left).cmp(&storage.arity(right)),
            TermType::Blob => storage.blob_bytes(left).cmp(&storage.blob_bytes(right)),
            TermType::Placeholder | TermType::Free => Ordering::Equal,
        });

        if ordering != Ordering::Equal {
            return ordering;
        }

        // The same shape, so compare the arguments with the leftmost on top and the annotations last.
        stack.push(Compare::Annotations(storage.annotations(left), storage.annotations(right)));
        for index in (0..storage.arity(left)).rev() {
            stack.push(Compare::Terms(storage.argument(left, index), storage.argument(right, index)));
        }
    }

    Ordering::Equal
}

enum Write {
    Term(TermId),
    Text(&'static str),
    /// The elements of a list, preceded by a comma unless it is the first.
    Elements(TermId, bool),
}

/// Writes the term in its textual form, i.e., `f(a,[1,2])` or `a{[label,value]}`
/// with annotations, using an explicit stack.
fn write_term(f: &mut fmt::Formatter<'_>, storage: &Storage, term: TermId) -> fmt::Result {
    let mut stack = vec![Write::Term(term)];

    while let Some(item) = stack.pop() {
        let term = match item {
            Write::Term(term) => term,
            Write::Text(text) => {
                f.write_str(text)?;
                continue;
            }
            Write::Elements(list, first) => {
                if storage.arity(list) == 2 {
                    if !first {
                        f.write_str(",")?;
                    }
                    stack.push(Write::Elements(storage.argument(list, 1), false));
                    stack.push(Write::Term(storage.argument(list, 0)));
                }
                continue;
            }
        };

        if let Some(annotations) = storage.annotations(term) {
            stack.push(Write::Text("}"));
            stack.push(Write::Elements(annotations, true));
            stack.push(Write::Text("{"));
        }

        match storage.term_type(term) {
            TermType::Appl => {
                let symbol = storage.symbol(term);
                let name = storage.name(symbol);
                if storage.symbols.is_quoted(symbol) {
                    write!(f, "{:?}", &*name)?;
                } else {
                    write!(f, "{name}")?;
                }

                let arity = storage.arity(term);
                if arity > 0 {
                    f.write_str("(")?;
                    stack.push(Write::Text(")"));
                    for index in (0..arity).rev() {
                        stack.push(Write::Term(storage.argument(term, index)));
                        if index > 0 {
                            stack.push(Write::Text(","));
                        }
                    }
                }
            }
            TermType::Int => write!(f, "{}", storage.int_value(term))?,
            TermType::Real => write!(f, "{:?}", storage.real_value(term))?,
            TermType::List => {
                f.write_str("[")?;
                stack.push(Write::Text("]"));
                stack.push(Write::Elements(term, true));
            }
            TermType::Placeholder => {
                f.write_str("<")?;
                stack.push(Write::Text(">"));
                stack.push(Write::Term(storage.argument(term, 0)));
            }
            TermType::Blob => {
                f.write_str("#")?;
                for byte in storage.blob_bytes(term) {
                    write!(f, "{byte:02x}")?;
                }
            }
            TermType::Free => write!(f, "<free {term}>")?,
        }
    }

    Ok(())
}

impl fmt::Display for ATermRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, &self.pool.storage(), self.id)
    }
}

impl fmt::Debug for ATermRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// The protected version of [ATermRef], mostly derived from it.
///
/// The term is a root of the garbage collector for as long as the handle
/// exists. Cloning protects the term again.
pub struct ATerm {
    pool: TermPool,
    id: TermId,

    /// The root of the term in the protection set
    root: ProtectionIndex,
}

impl ATerm {
    /// Takes over the given root, which protects the term.
    pub(crate) fn from_root(pool: TermPool, id: TermId, root: ProtectionIndex) -> ATerm {
        ATerm { pool, id, root }
    }

    /// Returns a borrow from the term
    pub fn get(&self) -> ATermRef<'_> {
        ATermRef::new(&self.pool, self.id)
    }

    /// Returns the root of the term
    pub fn root(&self) -> ProtectionIndex {
        self.root
    }

    /// Returns this term with the annotation of the label set to the value, see [TermPool::set_annotation].
    pub fn set_annotation<'a, 'b, 'c, 'd>(&self, label: &'b impl Term<'a, 'b>, value: &'d impl Term<'c, 'd>) -> ATerm {
        self.pool.set_annotation(self, label, value)
    }

    /// Returns this term without the annotation of the label.
    pub fn remove_annotation<'a, 'b>(&self, label: &'b impl Term<'a, 'b>) -> ATerm {
        self.pool.remove_annotation(self, label)
    }

    /// Returns this application with the argument at the given index replaced.
    pub fn set_argument<'a, 'b>(&self, argument: &'b impl Term<'a, 'b>, index: usize) -> ATerm {
        self.pool.set_argument(self, argument, index)
    }

    /// Replace this term by the given term in place, reusing the root.
    pub fn replace<'a, 'b>(&mut self, value: &'b impl Term<'a, 'b>) {
        debug_assert!(self.pool.ptr_eq(value.pool()), "Terms of different pools are mixed");

        let id = value.id();
        self.pool.replace(self.root, id);
        self.id = id;
    }
}

impl<'a, 'b> Term<'a, 'b> for ATerm
where
    'b: 'a,
{
    delegate! {
        to self.get() {
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

impl Markable for ATerm {
    fn mark(&self, marker: &mut Marker) {
        marker.mark(self.id);
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.id == term
    }

    fn len(&self) -> usize {
        1
    }
}

impl Drop for ATerm {
    fn drop(&mut self) {
        self.pool.unprotect(self.root);
    }
}

impl Clone for ATerm {
    fn clone(&self) -> Self {
        self.pool.protect(self.id)
    }
}

impl<'a> From<ATermRef<'a>> for ATerm {
    fn from(value: ATermRef<'a>) -> Self {
        value.protect()
    }
}

impl fmt::Display for ATerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Debug for ATerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

impl Hash for ATerm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for ATerm {
    fn eq(&self, other: &Self) -> bool {
        self.get().eq(&other.get())
    }
}

impl PartialEq<ATermRef<'_>> for ATerm {
    fn eq(&self, other: &ATermRef<'_>) -> bool {
        self.get().eq(other)
    }
}

impl PartialOrd for ATerm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ATerm {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().cmp(&other.get())
    }
}

impl Eq for ATerm {}

/// An iterator over the arguments of a term.
pub struct ATermArgs<'a> {
    term: Option<ATermRef<'a>>,
    arity: usize,
    index: usize,
}

impl<'a> ATermArgs<'a> {
    pub fn empty() -> ATermArgs<'static> {
        ATermArgs {
            term: None,
            arity: 0,
            index: 0,
        }
    }

    fn new(term: ATermRef<'a>) -> ATermArgs<'a> {
        let arity = term.pool.storage().arity(term.id);
        ATermArgs {
            term: Some(term),
            arity,
            index: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index >= self.arity
    }
}

impl<'a> Iterator for ATermArgs<'a> {
    type Item = ATermRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.arity {
            let term = self.term?;
            self.index += 1;
            Some(term.arg(self.index - 1))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len(), Some(self.len()))
    }
}

impl DoubleEndedIterator for ATermArgs<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.index < self.arity {
            let term = self.term?;
            self.arity -= 1;
            Some(term.arg(self.arity))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for ATermArgs<'_> {
    fn len(&self) -> usize {
        self.arity - self.index
    }
}

/// An iterator over all subterms of the given [ATerm] in preorder traversal, i.e.,
/// for f(g(a), b) we visit f(g(a), b), g(a), a, b.
pub struct TermIterator<'a> {
    queue: VecDeque<ATermRef<'a>>,
}

impl<'a> TermIterator<'a> {
    pub fn new(t: ATermRef<'a>) -> TermIterator<'a> {
        TermIterator {
            queue: VecDeque::from([t]),
        }
    }
}

impl<'a> Iterator for TermIterator<'a> {
    type Item = ATermRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.queue.pop_back() {
            Some(term) => {
                // Put subterms in the queue
                for argument in term.arguments().rev() {
                    self.queue.push_back(argument);
                }

                Some(term)
            }
            None => None,
        }
    }
}

/// Blanket implementation allowing passing borrowed terms as references.
impl<'a, 'b, T: Term<'a, 'b>> Term<'a, 'b> for &'b T {
    fn protect(&self) -> ATerm {
        (*self).protect()
    }

    fn arg(&self, index: usize) -> ATermRef<'a> {
        (*self).arg(index)
    }

    fn arguments(&self) -> ATermArgs<'a> {
        (*self).arguments()
    }

    fn copy(&self) -> ATermRef<'a> {
        (*self).copy()
    }

    fn get_head_symbol(&self) -> SymbolRef<'a> {
        (*self).get_head_symbol()
    }

    fn iter(&self) -> TermIterator<'a> {
        (*self).iter()
    }

    fn pool(&self) -> &'a TermPool {
        (*self).pool()
    }

    fn id(&self) -> TermId {
        (*self).id()
    }

    fn term_type(&self) -> TermType {
        (*self).term_type()
    }
}
