use std::time::Duration;

use crate::rmc_client::ViolationRecord;

/// Classified result of probing one violation number.
///
/// A closed set so the engine's handling is exhaustive at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Lookup succeeded and returned a record (not yet filtered).
    Match(ViolationRecord),
    /// Lookup succeeded but the data array was empty or missing.
    Empty,
    /// The endpoint answered 404 for this identifier.
    NotFound,
    /// 429: back off, then keep moving.
    RateLimited,
    /// 403: back off; a sustained run ends the invocation.
    Forbidden,
    /// Timeout, unexpected status, or an unparsable success body. Logged and
    /// skipped.
    TransportError(String),
}

/// Tuning for the randomized rate-pressure backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: Duration::from_secs(2),
        }
    }
}

/// All knobs the scan engine needs for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPolicy {
    /// Start of the identifier space; the rollback target of last resort.
    pub start_position: u64,
    pub chunk_size: u64,
    pub gap_threshold: u32,
    pub pass_limit: u32,
    pub forbidden_run_limit: u32,
    /// Pending rows are flushed to the sink once this many accumulate.
    pub batch_size: usize,
    /// When true (the historical behavior), a fetched ticket that fails the
    /// filter or was already seen still counts toward gap pressure. When
    /// false, any fetched ticket resets the gap counter.
    pub rejected_counts_toward_gap: bool,
    pub backoff: BackoffPolicy,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            start_position: 831_394_104,
            chunk_size: 1000,
            gap_threshold: 10_000,
            pass_limit: 2,
            forbidden_run_limit: 5,
            batch_size: 10,
            rejected_counts_toward_gap: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Why the invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowExit {
    /// The window was scanned end to end.
    Completed,
    /// Gap pressure hit the threshold; the cursor was rolled back.
    GapRollback { resumed_at: u64 },
    /// Too many consecutive 403s; partial progress was persisted.
    ForbiddenRun,
}

/// Summary of one invocation, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub probes: u64,
    pub accepted: u64,
    pub rows_written: u64,
    pub exit: WindowExit,
}
