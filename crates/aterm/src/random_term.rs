#![forbid(unsafe_code)]

use rand::Rng;
use rand::prelude::IndexedRandom;

use crate::ATerm;
use crate::TermPool;

/// Create a random term consisting of the given symbols and constants. Performs
/// iterations number of constructions, where every construction picks its
/// arguments among the previously constructed terms, which creates sharing.
pub fn random_term(
    pool: &TermPool,
    rng: &mut impl Rng,
    symbols: &[(String, usize)],
    constants: &[String],
    iterations: usize,
) -> ATerm {
    assert!(!constants.is_empty(), "We need constants to be able to create a term");

    let mut subterms: Vec<ATerm> = constants
        .iter()
        .map(|name| pool.create_constant(&pool.create_symbol(name, 0)))
        .collect();

    let mut result = None;
    for _ in 0..iterations {
        let Some((name, arity)) = symbols.choose(rng) else {
            break;
        };

        let mut arguments = Vec::with_capacity(*arity);
        for _ in 0..*arity {
            if let Some(argument) = subterms.choose(rng) {
                arguments.push(argument.clone());
            }
        }

        let symbol = pool.create_symbol(name, *arity);
        let term = pool.create_term(&symbol, &arguments);

        // Make this term available as another subterm that can be used.
        subterms.push(term.clone());
        result = Some(term);
    }

    match result {
        Some(term) => term,
        None => subterms.swap_remove(0),
    }
}
