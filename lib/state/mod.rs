use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CURSOR_FILE: &str = "cursor_state.json";
const SEEN_FILE: &str = "seen_vids.txt";

#[derive(Error, Debug)]
pub enum StateError {
    #[error("state I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not encode cursor state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable scan progress, persisted as one JSON record so related counters
/// can never drift apart across a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    /// Next violation number to probe.
    pub position: u64,
    /// Completed re-scans of the current window.
    pub pass_count: u32,
    /// Consecutive non-matching probes since the last accepted ticket.
    pub gap_count: u32,
    /// Most recent VID that produced an accepted ticket; the rollback anchor.
    /// Only ever moves forward.
    pub last_valid_position: Option<u64>,
    /// Newest ticket timestamp ever observed; gates window advancement.
    pub last_seen_timestamp: Option<DateTime<Utc>>,
}

impl CursorState {
    /// First-run state: scan from the start of the identifier space.
    pub fn seeded(start_position: u64) -> Self {
        Self {
            position: start_position,
            pass_count: 0,
            gap_count: 0,
            last_valid_position: None,
            last_seen_timestamp: None,
        }
    }
}

/// Set of violation numbers already written to the sink. Append-only across
/// the lifetime of the deployment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeenSet {
    ids: BTreeSet<u64>,
}

impl SeenSet {
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Returns true if the id was not already present.
    pub fn insert(&mut self, id: u64) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<u64> for SeenSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// File-backed store for the cursor record and the seen-VID set.
///
/// Loads are deliberately infallible past construction: a missing or corrupt
/// file yields seeded defaults, because resumability matters more than any
/// single run's starting point.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StateError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StateError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn load_cursor(&self, start_position: u64) -> CursorState {
        let path = self.cursor_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return CursorState::seeded(start_position);
            }
            Err(err) => {
                warn!("could not read {}: {err}; using seeded state", path.display());
                return CursorState::seeded(start_position);
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    "corrupt cursor state in {}: {err}; using seeded state",
                    path.display()
                );
                CursorState::seeded(start_position)
            }
        }
    }

    pub fn save_cursor(&self, state: &CursorState) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.cursor_path(), &bytes)
    }

    pub fn load_seen(&self) -> SeenSet {
        let path = self.seen_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("could not read {}: {err}; starting empty", path.display());
                }
                return SeenSet::default();
            }
        };

        raw.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                match line.parse::<u64>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        warn!("skipping unparsable seen-VID line {line:?}");
                        None
                    }
                }
            })
            .collect()
    }

    /// Rewrites the full set, numerically sorted, one VID per line.
    pub fn save_seen(&self, seen: &SeenSet) -> Result<(), StateError> {
        let mut body = String::new();
        for id in seen.iter() {
            body.push_str(&id.to_string());
            body.push('\n');
        }
        write_atomic(&self.seen_path(), body.as_bytes())
    }

    fn cursor_path(&self) -> PathBuf {
        self.dir.join(CURSOR_FILE)
    }

    fn seen_path(&self) -> PathBuf {
        self.dir.join(SEEN_FILE)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|source| StateError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_state() -> CursorState {
        CursorState {
            position: 831_400_000,
            pass_count: 1,
            gap_count: 42,
            last_valid_position: Some(831_399_871),
            last_seen_timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap()),
        }
    }

    #[test]
    fn cursor_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        let state = sample_state();
        store.save_cursor(&state).unwrap();

        assert_eq!(store.load_cursor(1), state);
    }

    #[test]
    fn missing_cursor_file_yields_seeded_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        assert_eq!(store.load_cursor(5000), CursorState::seeded(5000));
    }

    #[test]
    fn corrupt_cursor_file_yields_seeded_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        fs::write(dir.path().join(CURSOR_FILE), "{not json").unwrap();

        assert_eq!(store.load_cursor(5000), CursorState::seeded(5000));
    }

    #[test]
    fn seen_set_persists_numerically_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        let mut seen = SeenSet::default();
        seen.insert(900);
        seen.insert(12);
        seen.insert(831_394_104);
        store.save_seen(&seen).unwrap();

        let raw = fs::read_to_string(dir.path().join(SEEN_FILE)).unwrap();
        assert_eq!(raw, "12\n900\n831394104\n");
        assert_eq!(store.load_seen(), seen);
    }

    #[test]
    fn seen_loader_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        fs::write(dir.path().join(SEEN_FILE), "100\nnot-a-vid\n\n200\n").unwrap();

        let seen = store.load_seen();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(100));
        assert!(seen.contains(200));
    }

    #[test]
    fn seen_insert_reports_novelty() {
        let mut seen = SeenSet::default();
        assert!(seen.insert(7));
        assert!(!seen.insert(7));
    }
}
