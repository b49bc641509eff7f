use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not write CSV row: {0}")]
    Csv(#[from] csv::Error),
}

/// One accepted ticket, shaped for the output CSV. Field order defines the
/// column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub violation_number: u64,
    pub date_utc: String,
    pub address: String,
    pub zonenumber: String,
    pub lpn: String,
    pub description: String,
}

/// Durable append target for accepted rows.
///
/// This trait exists so engine logic can be unit-tested against an in-memory
/// sink without touching the filesystem.
pub trait RowSink: Send {
    fn append<'a>(&'a mut self, rows: &'a [Row]) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// Append-only CSV sink. Writes the header exactly once, when the file is
/// first created.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append_sync(&self, rows: &[Row]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let need_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Io {
                path: self.path.clone(),
                source,
            })?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(need_header)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl RowSink for CsvSink {
    fn append<'a>(&'a mut self, rows: &'a [Row]) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move { self.append_sync(rows) })
    }
}
