use std::time::Duration;

use crate::common::DEFAULT_BUCKET_SIZE_K;

/// Default number of contacts queried in parallel by each lookup round.
pub const DEFAULT_ALPHA: usize = 3;
/// Default request timeout before abandoning an inflight request to a non-responding node.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default cap on the number of rounds of a single lookup.
pub const DEFAULT_MAX_LOOKUP_ROUNDS: usize = 64;

#[derive(Debug, Clone)]
/// Node configurations
pub struct Config {
    /// Bucket capacity, also the number of closest nodes a lookup returns
    /// and values are stored at. `0` is treated as `1`.
    ///
    /// Defaults to [DEFAULT_BUCKET_SIZE_K]
    pub k: usize,
    /// Number of contacts queried concurrently in each lookup round.
    /// Values larger than [Config::k] are treated as `k`.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
    /// Request timeout duration.
    ///
    /// The longer this duration is, the longer lookups wait on unresponsive nodes.
    /// The shorter this duration is, the more responses from busy nodes we miss out on,
    /// and the more live contacts get evicted from the routing table.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Maximum number of rounds of a lookup, guarding against malformed or
    /// cyclic responses. Well-formed networks converge long before it.
    ///
    /// Defaults to [DEFAULT_MAX_LOOKUP_ROUNDS]
    pub max_lookup_rounds: usize,
}

impl Config {
    /// Effective bucket size, at least 1.
    pub(crate) fn bucket_size(&self) -> usize {
        self.k.max(1)
    }

    /// Effective lookup fan-out, within `1..=k`.
    pub(crate) fn fan_out(&self) -> usize {
        self.alpha.clamp(1, self.bucket_size())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: DEFAULT_BUCKET_SIZE_K,
            alpha: DEFAULT_ALPHA,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_lookup_rounds: DEFAULT_MAX_LOOKUP_ROUNDS,
        }
    }
}
