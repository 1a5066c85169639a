use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::test_logger;

/// Runs the given test function `iterations` times with a shared random number
/// generator. The seed is printed so that failures can be reproduced by setting
/// `ATLAS_SEED`.
pub fn random_test<F>(iterations: usize, test_function: F)
where
    F: FnMut(&mut StdRng),
{
    if let Ok(seed) = std::env::var("ATLAS_SEED") {
        let seed = seed.parse::<u64>().expect("ATLAS_SEED must be a valid u64");
        println!("seed: {seed} (fixed by ATLAS_SEED)");
        random_test_seeded(seed, iterations, test_function);
    } else {
        let seed: u64 = rand::random();
        println!("random seed: {seed} (use ATLAS_SEED=<seed> to set a fixed seed)");
        random_test_seeded(seed, iterations, test_function);
    }
}

/// Same as [random_test], but with the given seed.
pub fn random_test_seeded<F>(seed: u64, iterations: usize, mut test_function: F)
where
    F: FnMut(&mut StdRng),
{
    test_logger();

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..iterations {
        test_function(&mut rng);
    }
}
