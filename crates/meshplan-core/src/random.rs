//! The single process-wide pseudo-random source.
//!
//! Noise sampling, operation-order shuffling, and GA population operations
//! all draw from here. A global `SmallRng` seeds a thread-local copy on
//! first use; [`set_seed`] reseeds the global for deterministic test runs,
//! and [`scoped_seed`] reseeds just the calling thread for the span of a
//! closure.

use rand::distr::{Distribution, StandardUniform};
use rand::rngs::{SmallRng, SysRng};
use rand::{Rng, RngExt, SeedableRng};
use std::cell::RefCell;
use std::f64::consts::PI;
use std::sync::{Arc, LazyLock, Mutex};

static GLOBAL_RNG: LazyLock<Arc<Mutex<SmallRng>>> =
    LazyLock::new(|| Arc::new(Mutex::new(SmallRng::try_from_rng(&mut SysRng).unwrap())));

thread_local! {
    static TLS_RNG: RefCell<SmallRng> = RefCell::new(seed_from_global());
}

fn seed_from_global() -> SmallRng {
    let mut global = GLOBAL_RNG.lock().unwrap();
    SmallRng::seed_from_u64(global.next_u64())
}

/// Reseeds the global source; new threads derive their thread-local RNG from it.
pub fn set_seed(seed: u64) {
    let mut global = GLOBAL_RNG.lock().unwrap();
    *global = SmallRng::seed_from_u64(seed);
    drop(global);
    TLS_RNG.with(|rng| *rng.borrow_mut() = seed_from_global());
}

/// Temporarily reseeds the calling thread's RNG, restoring the previous state after `f` returns.
pub fn scoped_seed<T>(seed: u64, f: impl FnOnce() -> T) -> T {
    TLS_RNG.with(|rng| {
        let saved = rng.replace(SmallRng::seed_from_u64(seed));
        let result = f();
        *rng.borrow_mut() = saved;
        result
    })
}

pub fn with_rng<T>(f: impl FnOnce(&mut SmallRng) -> T) -> T {
    TLS_RNG.with(|rng| f(&mut rng.borrow_mut()))
}

pub fn random<T>() -> T
where
    StandardUniform: Distribution<T>,
{
    with_rng(|rng| rng.random())
}

pub fn bool(prob: f64) -> bool {
    with_rng(|rng| rng.random_bool(prob.clamp(0.0, 1.0)))
}

pub fn range(range: std::ops::Range<usize>) -> usize {
    with_rng(|rng| rng.random_range(range))
}

pub fn range_f64(range: std::ops::Range<f64>) -> f64 {
    with_rng(|rng| rng.random_range(range))
}

pub fn choose<T>(items: &[T]) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    Some(&items[range(0..items.len())])
}

/// Box-Muller transform, matching the `random.gauss(mean, std_dev)` semantics
/// the noise model is specified against.
pub fn gaussian(mean: f64, std_dev: f64) -> f64 {
    with_rng(|rng| {
        let u1: f64 = rng.random();
        let u2: f64 = rng.random();
        let z0: f64 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z0
    })
}

pub fn shuffle<T>(items: &mut [T]) {
    with_rng(|rng| {
        for i in (1..items.len()).rev() {
            let j = rng.random_range(0..=i);
            items.swap(i, j);
        }
    });
}
