use crate::scan::source::RecordSource;
use crate::scan::types::ScanReport;
use crate::scan::ScanEngine;
use crate::sink::RowSink;
use crate::state::{CursorState, SeenSet, StateStore};
use crate::Error;

/// Runs one scan invocation and persists cursor and seen set on every exit
/// path.
///
/// State must hit disk even when the window ends with a sink failure:
/// earlier batches may already be durably appended, and losing their
/// accounting would make the next invocation write those rows a second
/// time. The sink error is propagated only after both state files are saved.
pub async fn run_invocation<S, K>(
    engine: &mut ScanEngine<S, K>,
    store: &StateStore,
    cursor: &mut CursorState,
    seen: &mut SeenSet,
) -> Result<ScanReport, Error>
where
    S: RecordSource,
    K: RowSink,
{
    let scan_result = engine.run_window(cursor, seen).await;
    store.save_seen(seen)?;
    store.save_cursor(cursor)?;
    Ok(scan_result?)
}
