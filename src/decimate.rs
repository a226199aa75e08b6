//! Point decimation: skip, keep, and limit.
//!
//! The three reductions compose in a fixed, documented order: every n-th point is dropped first
//! (`skip`), every n-th of the survivors is kept (`keep`), and the result is capped (`limit`).
//! Both counters are one-based, so `skip = 3` drops points 3, 6, 9, … of the file and
//! `keep = 2` takes survivors 2, 4, 6, …

use crate::settings::ImportSettings;

/// Streaming admission filter for one file.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Decimator {
    skip_every: u64,
    keep_every: u64,
    limit: Option<u64>,
    survivors: u64,
    admitted: u64,
}

impl Decimator {
    pub fn new(settings: &ImportSettings) -> Decimator {
        Decimator {
            skip_every: settings.skip_every,
            keep_every: settings.keep_every,
            limit: settings.limit,
            survivors: 0,
            admitted: 0,
        }
    }

    /// Decides whether the point at the given zero-based raw index is written.
    pub fn admit(&mut self, raw_index: u64) -> bool {
        if self.is_done() {
            return false;
        }
        if self.skip_every >= 2 && (raw_index + 1) % self.skip_every == 0 {
            return false;
        }
        self.survivors += 1;
        if self.keep_every >= 2 && self.survivors % self.keep_every != 0 {
            return false;
        }
        self.admitted += 1;
        true
    }

    /// True once the limit is reached; the read loop can stop early.
    pub fn is_done(&self) -> bool {
        self.limit.is_some_and(|limit| self.admitted >= limit)
    }

    /// The number of points that will be admitted from a file of `n` points.
    pub fn effective_count(settings: &ImportSettings, n: u64) -> u64 {
        let mut count = n;
        if settings.skip_every >= 2 {
            count -= count / settings.skip_every;
        }
        if settings.keep_every >= 2 {
            count /= settings.keep_every;
        }
        if let Some(limit) = settings.limit {
            count = count.min(limit);
        }
        count
    }
}
