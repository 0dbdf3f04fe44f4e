/// JSON file persistence for wardrive batches and session reports.
///
/// Batches land in the logs directory as `<batch_id>.json`; the session
/// report lands in the exports directory as
/// `wardrive_report_<YYYYmmdd>.json`. Both are pretty-printed.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SinkError;
use crate::protocol::{SessionReport, WardriveBatch};

/// Accepts one batch per non-empty wardrive iteration.
pub trait BatchSink: Send {
    fn save_batch(&mut self, batch: &WardriveBatch) -> Result<(), SinkError>;
}

/// Accepts the end-of-session summary.
pub trait ReportSink: Send {
    fn save_report(&mut self, report: &SessionReport) -> Result<(), SinkError>;
}

/// Writes batches and reports as files under two directories.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    logs_dir: PathBuf,
    exports_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(logs_dir: impl Into<PathBuf>, exports_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            exports_dir: exports_dir.into(),
        }
    }

    pub fn batch_path(&self, batch: &WardriveBatch) -> PathBuf {
        self.logs_dir.join(format!("{}.json", batch.batch_id))
    }

    pub fn report_path(&self, report: &SessionReport) -> PathBuf {
        self.exports_dir.join(format!(
            "wardrive_report_{}.json",
            report.generated.format("%Y%m%d")
        ))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SinkError> {
    let body = serde_json::to_vec_pretty(value)?;
    fs::write(path, body).map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

impl BatchSink for JsonFileStore {
    fn save_batch(&mut self, batch: &WardriveBatch) -> Result<(), SinkError> {
        write_json(&self.batch_path(batch), batch)
    }
}

impl ReportSink for JsonFileStore {
    fn save_report(&mut self, report: &SessionReport) -> Result<(), SinkError> {
        let path = self.report_path(report);
        write_json(&path, report)?;
        log::info!("Session report saved to {}", path.display());
        Ok(())
    }
}
