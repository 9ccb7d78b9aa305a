use std::fmt::Debug;
use std::time::Instant;

use serde::Deserialize;

pub mod bufferpool;
pub mod frame;
mod history;

pub type FrameId = usize;

/// Monotonic nanosecond timestamp source driving the replacement policy.
/// Wall-clock regressions would corrupt the reference history, so
/// implementations must never go backwards.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> u64;
}

/// A clock counting nanoseconds from its construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> MonotonicClock {
        MonotonicClock::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Tuning knobs for the pool. The `buffer.*` configuration keys carry the
/// property names of existing deployments: `lru_k`, `crt`, `rit`.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
pub struct BufferOptions {
    /// Number of frames in the pool.
    pub buffer_count: usize,
    /// How many reference timestamps each resident block keeps; the K-th
    /// most recent drives eviction.
    pub lru_k: usize,
    /// Correlated reference period in milliseconds: references closer
    /// together than this count as a single logical access.
    pub crt: u64,
    /// Retained information period in milliseconds. Accepted for
    /// configuration compatibility; the policy does not consult it.
    // TODO: drop history for frames unreferenced longer than rit in an
    // out-of-band sweep.
    pub rit: u64,
    /// Number of lock stripes serializing same-block pins. Prime, so that
    /// block hashes spread evenly over the stripes.
    pub anchor_stripes: usize,
}

impl Default for BufferOptions {
    fn default() -> BufferOptions {
        BufferOptions {
            buffer_count: 1024,
            lru_k: 2,
            crt: 100_000,
            rit: 200_000,
            anchor_stripes: 1009,
        }
    }
}
