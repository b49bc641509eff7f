use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use crate::config::default_keywords;
use crate::filter::AcceptanceFilter;
use crate::rmc_client::ViolationRecord;
use crate::sink::{Row, RowSink, SinkError};

use super::source::RecordSource;
use super::types::{BackoffPolicy, Outcome, ScanPolicy};

/// Policy with zero backoff so engine tests run instantly.
pub(super) fn test_policy(
    start_position: u64,
    chunk_size: u64,
    gap_threshold: u32,
    pass_limit: u32,
) -> ScanPolicy {
    ScanPolicy {
        start_position,
        chunk_size,
        gap_threshold,
        pass_limit,
        forbidden_run_limit: 5,
        batch_size: 10,
        rejected_counts_toward_gap: true,
        backoff: BackoffPolicy {
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: Duration::ZERO,
        },
    }
}

pub(super) fn test_filter() -> AcceptanceFilter {
    AcceptanceFilter::new(default_keywords(), "Boston, MA")
}

/// A ticket the default filter accepts.
pub(super) fn ticket(date_utc: &str) -> ViolationRecord {
    ViolationRecord {
        date_utc: Some(date_utc.to_string()),
        userdef1_label: Some("Location".to_string()),
        userdef1: Some("BEACON ST".to_string()),
        userdef8_label: Some("Street Number".to_string()),
        userdef8: Some(json!("12")),
        zonenumber: Some(json!("4")),
        lpn: Some("ABC123".to_string()),
        description: Some("HYDRANT".to_string()),
        ..ViolationRecord::default()
    }
}

/// A fetched ticket the default filter rejects (no usable address).
pub(super) fn rejected_ticket(date_utc: &str) -> ViolationRecord {
    ViolationRecord {
        date_utc: Some(date_utc.to_string()),
        description: Some("TOW FEE".to_string()),
        ..ViolationRecord::default()
    }
}

/// Scripted record source. Each probe of an id pops the next planned outcome;
/// probing an unplanned id is a test bug.
#[derive(Default)]
pub(super) struct MockSource {
    plans: Mutex<HashMap<u64, VecDeque<Outcome>>>,
    probed: Mutex<Vec<u64>>,
}

impl MockSource {
    pub(super) fn with_plan(plan: Vec<(u64, Vec<Outcome>)>) -> Self {
        let mut plans = HashMap::new();
        for (id, outcomes) in plan {
            plans.insert(id, outcomes.into_iter().collect());
        }
        Self {
            plans: Mutex::new(plans),
            probed: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn probed_ids(&self) -> Vec<u64> {
        self.probed.lock().expect("probed mutex poisoned").clone()
    }
}

impl RecordSource for MockSource {
    fn probe<'a>(&'a self, violation_number: u64) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            self.probed
                .lock()
                .expect("probed mutex poisoned")
                .push(violation_number);

            let mut plans = self.plans.lock().expect("plans mutex poisoned");
            plans
                .get_mut(&violation_number)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| panic!("no scripted outcome for violation {violation_number}"))
        })
    }
}

/// In-memory sink; clones share storage so tests keep a handle after moving
/// the sink into the engine.
#[derive(Default, Clone)]
pub(super) struct MemorySink {
    rows: Arc<Mutex<Vec<Row>>>,
    appends: Arc<Mutex<u32>>,
}

impl MemorySink {
    pub(super) fn rows(&self) -> Vec<Row> {
        self.rows.lock().expect("rows mutex poisoned").clone()
    }

    pub(super) fn appends(&self) -> u32 {
        *self.appends.lock().expect("appends mutex poisoned")
    }
}

impl RowSink for MemorySink {
    fn append<'a>(&'a mut self, rows: &'a [Row]) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            *self.appends.lock().expect("appends mutex poisoned") += 1;
            self.rows
                .lock()
                .expect("rows mutex poisoned")
                .extend_from_slice(rows);
            Ok(())
        })
    }
}

/// Sink that accepts a fixed number of appends, then fails every later one,
/// keeping whatever it already accepted.
#[derive(Clone)]
pub(super) struct FlakySink {
    inner: MemorySink,
    remaining_appends: Arc<Mutex<u32>>,
}

impl FlakySink {
    pub(super) fn allowing(appends: u32) -> Self {
        Self {
            inner: MemorySink::default(),
            remaining_appends: Arc::new(Mutex::new(appends)),
        }
    }

    pub(super) fn rows(&self) -> Vec<Row> {
        self.inner.rows()
    }
}

impl RowSink for FlakySink {
    fn append<'a>(&'a mut self, rows: &'a [Row]) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            {
                let mut remaining = self
                    .remaining_appends
                    .lock()
                    .expect("remaining_appends mutex poisoned");
                if *remaining == 0 {
                    return Err(SinkError::Io {
                        path: "tickets.csv".into(),
                        source: io::Error::new(io::ErrorKind::Other, "disk full"),
                    });
                }
                *remaining -= 1;
            }
            self.inner.append(rows).await
        })
    }
}
