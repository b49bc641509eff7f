pub mod backoff;
pub mod source;
pub mod types;

#[cfg(test)]
mod test_support;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::filter::AcceptanceFilter;
use crate::sink::{Row, RowSink, SinkError};
use crate::state::{CursorState, SeenSet};

use source::RecordSource;
use types::{Outcome, ScanPolicy, ScanReport, WindowExit};

/// Walks one window of the violation-number space and updates the cursor.
///
/// The engine absorbs every remote failure into retry/skip decisions; only
/// sink I/O errors cross its boundary. The caller persists cursor and seen
/// set after `run_window` returns, on every exit path.
pub struct ScanEngine<S, K>
where
    S: RecordSource,
    K: RowSink,
{
    source: S,
    sink: K,
    filter: AcceptanceFilter,
    policy: ScanPolicy,
}

impl<S, K> ScanEngine<S, K>
where
    S: RecordSource,
    K: RowSink,
{
    pub fn new(source: S, sink: K, filter: AcceptanceFilter, policy: ScanPolicy) -> Self {
        Self {
            source,
            sink,
            filter,
            policy,
        }
    }

    /// Scans `[cursor.position, cursor.position + chunk_size)` one identifier
    /// at a time, strictly in increasing order.
    pub async fn run_window(
        &mut self,
        cursor: &mut CursorState,
        seen: &mut SeenSet,
    ) -> Result<ScanReport, SinkError> {
        let window_start = cursor.position;
        let window_end = window_start.saturating_add(self.policy.chunk_size);

        info!(
            "pass {}/{}: scanning {window_start}..{window_end}, last_valid={:?}, seen={}",
            cursor.pass_count + 1,
            self.policy.pass_limit,
            cursor.last_valid_position,
            seen.len(),
        );

        let mut pending: Vec<Row> = Vec::new();
        let mut report = ScanReport {
            probes: 0,
            accepted: 0,
            rows_written: 0,
            exit: WindowExit::Completed,
        };
        // Newest record timestamp observed this run that beats the persisted
        // one, with the identifier carrying it. Tracked for every fetched
        // record, filtered out or not, so rollback and advancement can aim at
        // where fresh content actually is.
        let mut newest: Option<(u64, DateTime<Utc>)> = None;
        let mut forbidden_run = 0u32;
        let mut pressure_events = 0u32;

        while cursor.position < window_end {
            let id = cursor.position;
            let outcome = self.source.probe(id).await;
            report.probes += 1;

            match outcome {
                Outcome::Match(record) => {
                    forbidden_run = 0;
                    pressure_events = 0;
                    if let Some(ts) = record.timestamp() {
                        let beats_cursor =
                            cursor.last_seen_timestamp.map_or(true, |prev| ts > prev);
                        let beats_run = newest.map_or(true, |(_, prev)| ts > prev);
                        if beats_cursor && beats_run {
                            newest = Some((id, ts));
                        }
                    }

                    if self.filter.accepts(&record) && !seen.contains(id) {
                        cursor.gap_count = 0;
                        let row = self.filter.extract_row(id, &record);
                        info!("[keep] {id} {} {}", row.address, row.description);
                        pending.push(row);
                        seen.insert(id);
                        report.accepted += 1;
                        // The anchor only ever moves forward.
                        cursor.last_valid_position =
                            Some(cursor.last_valid_position.map_or(id, |prev| prev.max(id)));
                    } else if self.policy.rejected_counts_toward_gap {
                        cursor.gap_count += 1;
                    } else {
                        cursor.gap_count = 0;
                    }
                    cursor.position += 1;
                }
                Outcome::Empty | Outcome::NotFound => {
                    forbidden_run = 0;
                    pressure_events = 0;
                    cursor.gap_count += 1;
                    cursor.position += 1;
                }
                Outcome::RateLimited | Outcome::Forbidden => {
                    let forbidden = outcome == Outcome::Forbidden;
                    if forbidden {
                        forbidden_run += 1;
                    } else {
                        forbidden_run = 0;
                    }
                    pressure_events += 1;

                    let delay =
                        backoff::compute_backoff_delay(&self.policy.backoff, pressure_events, id);
                    warn!(
                        "{} at {id}, backing off {delay:?}",
                        if forbidden { "403" } else { "429" }
                    );
                    tokio::time::sleep(delay).await;

                    if forbidden && forbidden_run >= self.policy.forbidden_run_limit {
                        warn!(
                            "{forbidden_run} consecutive 403s, ending invocation early at {id}"
                        );
                        self.flush(&mut pending, &mut report).await?;
                        report.exit = WindowExit::ForbiddenRun;
                        return Ok(report);
                    }
                    // Favor forward progress under rate pressure; the skipped
                    // id is caught by a later pass if it mattered.
                    cursor.position += 1;
                }
                Outcome::TransportError(detail) => {
                    forbidden_run = 0;
                    pressure_events = 0;
                    warn!("transport error at {id}, skipping: {detail}");
                    cursor.position += 1;
                }
            }

            if pending.len() >= self.policy.batch_size {
                self.flush(&mut pending, &mut report).await?;
            }

            if cursor.gap_count >= self.policy.gap_threshold {
                let resumed_at = self.rollback_target(cursor, newest);
                warn!(
                    "hit {} consecutive gaps at {id}, rolling back to {resumed_at}",
                    cursor.gap_count
                );
                cursor.position = resumed_at;
                cursor.gap_count = 0;
                cursor.pass_count = 0;
                self.flush(&mut pending, &mut report).await?;
                report.exit = WindowExit::GapRollback { resumed_at };
                return Ok(report);
            }
        }

        self.flush(&mut pending, &mut report).await?;
        self.apply_pass_policy(cursor, window_start, window_end, newest);
        Ok(report)
    }

    /// Rollback anchor resolution, first applicable wins: known-good
    /// position, then the id carrying the newest timestamp seen this run,
    /// then the start of the space.
    fn rollback_target(
        &self,
        cursor: &CursorState,
        newest: Option<(u64, DateTime<Utc>)>,
    ) -> u64 {
        cursor
            .last_valid_position
            .or(newest.map(|(id, _)| id))
            .unwrap_or(self.policy.start_position)
    }

    /// Decides whether the next invocation re-scans this window or moves on.
    ///
    /// Records can appear with some lag relative to their identifier, so each
    /// window is walked `pass_limit` times before the cursor advances. The
    /// final pass advances to the identifier carrying the newest observed
    /// timestamp when there is one, preferring precise positioning over blind
    /// advancement.
    fn apply_pass_policy(
        &self,
        cursor: &mut CursorState,
        window_start: u64,
        window_end: u64,
        newest: Option<(u64, DateTime<Utc>)>,
    ) {
        if cursor.pass_count + 1 < self.policy.pass_limit {
            cursor.pass_count += 1;
            cursor.position = window_start;
            info!(
                "repeating pass {}/{} over {window_start}..{window_end}",
                cursor.pass_count, self.policy.pass_limit
            );
            return;
        }

        cursor.pass_count = 0;
        match newest {
            Some((id, ts)) => {
                cursor.last_seen_timestamp = Some(ts);
                cursor.position = id;
                info!("newest ticket {ts} at {id}, advancing there");
            }
            None => {
                cursor.position = window_end;
                info!("no newer tickets, advancing to {window_end}");
            }
        }
    }

    async fn flush(
        &mut self,
        pending: &mut Vec<Row>,
        report: &mut ScanReport,
    ) -> Result<(), SinkError> {
        if pending.is_empty() {
            return Ok(());
        }
        self.sink.append(pending).await?;
        report.rows_written += pending.len() as u64;
        pending.clear();
        Ok(())
    }
}
