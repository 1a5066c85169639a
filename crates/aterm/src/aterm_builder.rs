#![forbid(unsafe_code)]

use std::fmt;

use atlas_utilities::AtlasError;
use atlas_utilities::debug_trace;

use crate::ATerm;
use crate::Term;
use crate::TermPool;
use crate::storage::TermType;

/// The result of expanding a single input of the [TermBuilder].
pub enum Step<I, C> {
    /// The input is replaced by this term as is.
    Leaf(ATerm),
    /// The input becomes `construct(C, args)` where `args` are the results of
    /// building the given children, in order.
    Node(C, Vec<I>),
}

enum Task<I, C> {
    Expand(I),
    Combine(C, usize),
}

/// Builds an [ATerm] from an input of (inductive) type `I` using an explicit
/// stack instead of recursion, so deep inputs do not overflow the system stack.
///
/// The stacks are kept between calls to [TermBuilder::build] to reuse their memory.
pub struct TermBuilder<I, C> {
    tasks: Vec<Task<I, C>>,
    results: Vec<ATerm>,
}

impl<I, C> Default for TermBuilder<I, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, C> TermBuilder<I, C> {
    pub fn new() -> TermBuilder<I, C> {
        TermBuilder {
            tasks: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Builds the term for `input`.
    ///
    /// `expand` is called once for every input, and either yields a term
    /// directly or a value `C` together with the children it is built from.
    /// Once all children of a node are built, `construct` is called with the
    /// value and the resulting arguments.
    pub fn build<E, F>(&mut self, pool: &TermPool, input: I, mut expand: E, mut construct: F) -> Result<ATerm, AtlasError>
    where
        E: FnMut(&TermPool, I) -> Result<Step<I, C>, AtlasError>,
        F: FnMut(&TermPool, C, &[ATerm]) -> Result<ATerm, AtlasError>,
    {
        self.tasks.clear();
        self.results.clear();
        self.tasks.push(Task::Expand(input));

        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Expand(input) => match expand(pool, input)? {
                    Step::Leaf(term) => self.results.push(term),
                    Step::Node(value, children) => {
                        self.tasks.push(Task::Combine(value, children.len()));
                        // Reversed, so that the first child is built first.
                        self.tasks.extend(children.into_iter().rev().map(Task::Expand));
                    }
                },
                Task::Combine(value, arity) => {
                    let first = self.results.len() - arity;
                    let term = construct(pool, value, &self.results[first..])?;
                    self.results.truncate(first);
                    self.results.push(term);
                }
            }
        }

        debug_trace!("Built term with {} results remaining", self.results.len());
        match (self.results.pop(), self.results.is_empty()) {
            (Some(term), true) => Ok(term),
            _ => Err("The term builder did not produce exactly one result".into()),
        }
    }
}

impl<I, C> fmt::Debug for TermBuilder<I, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermBuilder")
            .field("tasks", &self.tasks.len())
            .field("results", &self.results)
            .finish()
    }
}

/// Replaces every maximal subterm `t` of `term` for which `function(t)` returns
/// `Some(u)` by `u`, and rebuilds the remainder of the term.
///
/// Integers, reals and blobs have no subterms, so they are only replaced as a whole.
pub fn apply<F>(pool: &TermPool, term: &ATerm, function: &F) -> Result<ATerm, AtlasError>
where
    F: Fn(&TermPool, &ATerm) -> Option<ATerm>,
{
    let mut builder = TermBuilder::<ATerm, ATerm>::new();

    builder.build(
        pool,
        term.clone(),
        |pool, t| {
            if let Some(result) = function(pool, &t) {
                return Ok(Step::Leaf(result));
            }

            if t.arguments().is_empty() {
                Ok(Step::Leaf(t))
            } else {
                let children: Vec<ATerm> = t.arguments().map(|arg| arg.protect()).collect();
                Ok(Step::Node(t, children))
            }
        },
        |pool, original, args| {
            let term = match original.term_type() {
                TermType::Appl => pool.create_term(&original.get_head_symbol(), args),
                TermType::List => pool.create_cons(&args[0], &args[1]),
                TermType::Placeholder => pool.create_placeholder(&args[0]),
                other => return Err(format!("Cannot rebuild a term of type {other:?} from arguments").into()),
            };

            Ok(match original.annotations() {
                Some(annotations) => pool.set_annotations(&term, &annotations),
                None => term,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use atlas_utilities::test_logger;

    use super::*;

    #[test]
    fn test_apply_deep_term() {
        test_logger();
        let pool = TermPool::new();

        let f = pool.create_symbol("f", 1);
        let a = pool.create_constant(&pool.create_symbol("a", 0));
        let b = pool.create_constant(&pool.create_symbol("b", 0));

        // Deep enough to overflow the stack of a recursive implementation.
        let mut input = a.clone();
        let mut expected = b.clone();
        for _ in 0..100_000 {
            input = pool.create_term(&f, &[input.copy()]);
            expected = pool.create_term(&f, &[expected.copy()]);
        }

        let result = apply(&pool, &input, &|_, t| if *t == a { Some(b.clone()) } else { None }).unwrap();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_apply_replaces_subterm() {
        let pool = TermPool::new();

        let g = pool.create_symbol("g", 2);
        let one = pool.create_int(1);
        let two = pool.create_int(2);
        let t = pool.create_term(&g, &[one.copy(), pool.create_term(&g, &[one.copy(), two.copy()]).copy()]);

        let result = apply(&pool, &t, &|pool, t| {
            if *t == one {
                Some(pool.create_int(3))
            } else {
                None
            }
        })
        .unwrap();

        assert_eq!(result.to_string(), "g(3,g(3,2))");
    }

    #[test]
    fn test_apply_inside_list() {
        let pool = TermPool::new();

        let one = pool.create_int(1);
        let list = pool.create_list([one.clone(), pool.create_int(2), one.clone()]);

        let result = apply(&pool, &list, &|pool, t| if *t == one { Some(pool.create_int(7)) } else { None }).unwrap();
        assert_eq!(result.to_string(), "[7,2,7]");
    }

    #[test]
    fn test_apply_keeps_annotations() {
        let pool = TermPool::new();

        let g = pool.create_symbol("g", 1);
        let label = pool.create_constant(&pool.create_symbol("origin", 0));
        let t = pool
            .create_term(&g, &[pool.create_int(1)])
            .set_annotation(&label, &pool.create_int(42));

        let result = apply(&pool, &t, &|pool, t| {
            if t.term_type() == TermType::Int {
                Some(pool.create_int(2))
            } else {
                None
            }
        })
        .unwrap();

        assert_eq!(result.to_string(), "g(2){[origin,42]}");
        assert_eq!(result.get_annotation(&label).map(|value| value.to_string()), Some("42".to_string()));
    }

    #[test]
    fn test_build_counts_nodes() {
        let pool = TermPool::new();
        let mut builder = TermBuilder::<usize, ()>::new();

        // A complete binary tree of the given depth, counted bottom up.
        let result = builder
            .build(
                &pool,
                10,
                |pool, depth| {
                    if depth == 0 {
                        Ok(Step::Leaf(pool.create_int(1)))
                    } else {
                        Ok(Step::Node((), vec![depth - 1, depth - 1]))
                    }
                },
                |pool, _, args| {
                    let sum: i64 = args.iter().map(|arg| crate::ATermIntRef::from(arg.copy()).value()).sum();
                    Ok(pool.create_int(sum + 1))
                },
            )
            .unwrap();

        assert_eq!(result.to_string(), "2047");
    }
}
