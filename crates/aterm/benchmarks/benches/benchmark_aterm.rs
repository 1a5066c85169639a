//!
//! Benchmarks for the construction, inspection, lookup and collection of maximally shared terms.
//!

use std::array::from_fn;
use std::collections::VecDeque;
use std::hint::black_box;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;

use atlas_aterm::ATerm;
use atlas_aterm::ATermRef;
use atlas_aterm::Symb;
use atlas_aterm::Term;
use atlas_aterm::TermPool;
use atlas_aterm::TermPoolConfig;

/// Creates a pool in which terms are only collected on request.
fn manual_pool() -> TermPool {
    TermPool::with_config(TermPoolConfig {
        automatic_garbage_collection: false,
        ..TermPoolConfig::default()
    })
}

/// Creates a nested function application where f_0 = c and f_i = f(f_{i-1}, ..., f_{i-1}). The parameter `depth` sets `i` and `c` is given by `leaf_name`.
/// The arity of the function symbols is a constant.
fn create_nested_function<const ARITY: usize>(
    pool: &TermPool,
    function_name: &str,
    leaf_name: &str,
    depth: usize,
) -> ATerm {
    debug_assert!(depth > 0, "Depth must be greater than 0");

    // Create function symbols
    let f_symbol = pool.create_symbol(function_name, ARITY);
    let c_symbol = pool.create_symbol(leaf_name, 0);

    // Create the leaf term c
    let c_term = pool.create_constant(&c_symbol);

    // Initialize with f(c, ..., c)
    let mut f_term = pool.create_term(&f_symbol, &from_fn::<_, ARITY, _>(|_| c_term.copy()));

    // Build nested structure: f(f_term, ..., f_term) for each level
    for _ in 0..depth {
        let next = pool.create_term(&f_symbol, &from_fn::<_, ARITY, _>(|_| f_term.copy()));
        f_term.replace(&next);
    }

    debug_assert_eq!(&*f_term.get_head_symbol().name(), function_name);
    debug_assert_eq!(f_term.get_head_symbol().arity(), ARITY);

    f_term
}

/// Counts the number of subterms in a term, visiting shared subterms again.
fn inspect(term: ATermRef<'_>, iterations: usize) -> u64 {
    let mut queue: VecDeque<ATermRef<'_>> = VecDeque::new();

    let mut count = 0;

    for _ in 0..iterations {
        // Simple breadth-first search to count elements
        queue.push_back(term);

        while let Some(current_term) = queue.pop_front() {
            // Iterate through all arguments of the current term
            for arg in current_term.arguments() {
                count += 1;
                queue.push_back(arg);
            }
        }
    }

    count
}

fn benchmark_creation(c: &mut Criterion) {
    const SIZE: usize = 400000;

    c.bench_function("creation", |b| {
        b.iter(|| {
            let pool = manual_pool();
            black_box(create_nested_function::<2>(&pool, "f", "c", SIZE));
        });
    });
}

fn benchmark_inspect(c: &mut Criterion) {
    const SIZE: usize = 20;
    const ITERATIONS: usize = 10;

    let pool = manual_pool();
    let term = create_nested_function::<2>(&pool, "f", "c", SIZE);
    assert_eq!(inspect(term.copy(), 1), 4194302);

    c.bench_function("inspect", |b| {
        b.iter(|| {
            black_box(inspect(term.copy(), ITERATIONS));
        });
    });
}

fn benchmark_lookup(c: &mut Criterion) {
    let _ = env_logger::try_init();

    const SIZE: usize = 400000;

    let pool = manual_pool();

    // Keep one protected instance, so that every construction finds the existing term.
    let term = create_nested_function::<2>(&pool, "f", "c", SIZE);

    c.bench_function("lookup", |b| {
        b.iter(|| {
            black_box(create_nested_function::<2>(&pool, "f", "c", SIZE));
        })
    });

    drop(term);
}

fn benchmark_collection(c: &mut Criterion) {
    let _ = env_logger::try_init();

    const SIZE: usize = 100000;

    c.bench_function("collection", |b| {
        b.iter(|| {
            let pool = manual_pool();
            let kept = create_nested_function::<2>(&pool, "f", "c", SIZE);
            drop(create_nested_function::<3>(&pool, "g", "c", SIZE));

            pool.collect_garbage();
            black_box(kept);
        })
    });
}

fn benchmark_automatic_collection(c: &mut Criterion) {
    const SIZE: usize = 100000;

    c.bench_function("automatic_collection", |b| {
        b.iter(|| {
            let pool = TermPool::new();
            for i in 0..10 {
                black_box(create_nested_function::<2>(&pool, "f", &format!("c{i}"), SIZE));
            }
        })
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = benchmark_creation,
        benchmark_inspect,
        benchmark_lookup,
        benchmark_collection,
        benchmark_automatic_collection,
);
criterion_main!(benches);
