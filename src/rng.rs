//! Seedable shared random source
//!
//! One `GameRng` handle is shared between a user state and every stash
//! bound to it, so all draws come from a single stream. Handles are cheap
//! to clone; clones share the underlying generator.

use rand::prelude::*;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex, MutexGuard};

/// Seed used when none is configured; unseeded processes still draw a
/// deterministic stream
pub const DEFAULT_SEED: u64 = 5489;

/// Cloneable handle over a seeded generator
#[derive(Clone, Debug)]
pub struct GameRng {
    inner: Arc<Mutex<StdRng>>,
}

impl GameRng {
    /// Create a generator from an explicit seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Create a generator from an optional configured seed
    pub fn from_config(seed: Option<u64>) -> Self {
        Self::seeded(seed.unwrap_or(DEFAULT_SEED))
    }

    fn lock(&self) -> MutexGuard<'_, StdRng> {
        self.inner.lock().unwrap()
    }

    /// Uniform float in `[0, 1)`
    pub fn random(&self) -> f64 {
        self.lock().gen::<f64>()
    }

    /// Uniform integer in `[min, max]`
    pub fn range_inclusive(&self, min: i64, max: i64) -> i64 {
        self.lock().gen_range(min..=max)
    }

    /// Choose one key by unnormalized weight. Returns `None` when the
    /// slice is empty or no weight is positive.
    pub fn weighted_choice(&self, weighted: &[(String, f64)]) -> Option<String> {
        let mut rng = self.lock();
        weighted
            .choose_weighted(&mut *rng, |(_, weight)| *weight)
            .ok()
            .map(|(key, _)| key.clone())
    }

    /// Choose `count` keys uniformly without replacement. Fewer keys than
    /// `count` yields all of them.
    pub fn sample(&self, keys: &[String], count: usize) -> Vec<String> {
        let mut rng = self.lock();
        keys.choose_multiple(&mut *rng, count).cloned().collect()
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::from_config(None)
    }
}
