//! Global configuration options for the `pingstore` crate.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the `pingstore` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with
/// [`global_config_mut`].
///
/// ## Chunk Concurrent Minimum
/// > default: `4`
///
/// The Write Dispatcher (§4.D) and the Chunk-Aware Interpolator (§4.E) both
/// fan out one task per chunk; this is the preferred minimum number of
/// chunks processed concurrently. Concurrency is unconstrained if set to
/// zero.
///
/// ## Rayon Concurrency Target
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The default number of concurrent operations to target when no narrower
/// limit applies.
#[derive(Debug)]
pub struct Config {
    chunk_concurrent_minimum: usize,
    rayon_concurrency_target: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_concurrent_minimum: 4,
            rayon_concurrency_target: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl Config {
    /// Get the [chunk concurrent minimum](#chunk-concurrent-minimum) configuration.
    #[must_use]
    pub fn chunk_concurrent_minimum(&self) -> usize {
        self.chunk_concurrent_minimum
    }

    /// Set the [chunk concurrent minimum](#chunk-concurrent-minimum) configuration.
    pub fn set_chunk_concurrent_minimum(&mut self, concurrent_minimum: usize) {
        self.chunk_concurrent_minimum = concurrent_minimum;
    }

    /// Get the [rayon concurrency target](#rayon-concurrency-target) configuration.
    #[must_use]
    pub fn rayon_concurrency_target(&self) -> usize {
        self.rayon_concurrency_target
    }

    /// Set the [rayon concurrency target](#rayon-concurrency-target) configuration.
    pub fn set_rayon_concurrency_target(&mut self, target: usize) {
        self.rayon_concurrency_target = target;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `pingstore` configuration.
///
/// # Panics
/// Panics if the underlying lock has been poisoned.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).read().unwrap()
}

/// Returns a mutable reference to the global `pingstore` configuration.
///
/// # Panics
/// Panics if the underlying lock has been poisoned.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).write().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_concurrent_minimum_roundtrip() {
        assert_eq!(global_config().chunk_concurrent_minimum(), 4);
        global_config_mut().set_chunk_concurrent_minimum(8);
        assert_eq!(global_config().chunk_concurrent_minimum(), 8);
        global_config_mut().set_chunk_concurrent_minimum(4);
    }
}
