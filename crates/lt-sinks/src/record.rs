//! Authoritative CSV record of a sweep.

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use lt_types::{CellResult, CellStatus, ParameterPoint, StorageWriteError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One CSV row. Flat, because the csv crate cannot flatten nested structs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRow {
    pub instances: u32,
    pub parallel: u32,
    pub batch: u32,
    pub concurrency: u32,
    pub throughput_tps: f64,
    pub tokens_generated: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub wall_time_secs: f64,
    pub error_rate: f64,
    pub status: CellStatus,
}

impl CellRow {
    pub const HEADER: [&'static str; 11] = [
        "instances",
        "parallel",
        "batch",
        "concurrency",
        "throughput_tps",
        "tokens_generated",
        "requests_sent",
        "requests_failed",
        "wall_time_secs",
        "error_rate",
        "status",
    ];
}

impl From<&CellResult> for CellRow {
    fn from(cell: &CellResult) -> Self {
        Self {
            instances: cell.params.instances,
            parallel: cell.params.parallel,
            batch: cell.params.batch,
            concurrency: cell.params.concurrency,
            throughput_tps: cell.throughput_tps,
            tokens_generated: cell.tokens_generated,
            requests_sent: cell.requests_sent,
            requests_failed: cell.requests_failed,
            wall_time_secs: cell.wall_time_secs,
            error_rate: cell.error_rate,
            status: cell.status,
        }
    }
}

impl From<CellRow> for CellResult {
    fn from(row: CellRow) -> Self {
        Self {
            params: ParameterPoint::new(row.instances, row.parallel, row.batch, row.concurrency),
            throughput_tps: row.throughput_tps,
            tokens_generated: row.tokens_generated,
            requests_sent: row.requests_sent,
            requests_failed: row.requests_failed,
            wall_time_secs: row.wall_time_secs,
            error_rate: row.error_rate,
            status: row.status,
        }
    }
}

/// `sweep-{model stem}-{YYYYmmddTHHMMSSZ}.csv`
pub fn record_file_name(model_id: &str, at: DateTime<Utc>) -> String {
    let stem = Path::new(model_id)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("model");
    let stem: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .collect();
    format!("sweep-{}-{}.csv", stem, at.format("%Y%m%dT%H%M%SZ"))
}

/// Append-only CSV file. Each row is on disk before `append` returns.
pub struct CsvRecordStore {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvRecordStore {
    /// Create the file (and parent directories) and write the header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StorageWriteError> {
        let path = path.as_ref().to_path_buf();
        let create_err = |message: String| StorageWriteError::Create {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| create_err(e.to_string()))?;
        }
        let file = File::create(&path).map_err(|e| create_err(e.to_string()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        writer
            .write_record(CellRow::HEADER)
            .map_err(|e| create_err(e.to_string()))?;
        writer.flush().map_err(|e| create_err(e.to_string()))?;
        writer
            .get_ref()
            .sync_data()
            .map_err(|e| create_err(e.to_string()))?;

        debug!(path = %path.display(), "record created");
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Write, flush and sync one row.
    pub fn append(&mut self, cell: &CellResult) -> Result<(), StorageWriteError> {
        let append_err = |message: String| StorageWriteError::Append {
            point: cell.params.to_string(),
            message,
        };

        self.writer
            .serialize(CellRow::from(cell))
            .map_err(|e| append_err(e.to_string()))?;
        self.writer.flush().map_err(|e| append_err(e.to_string()))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| append_err(e.to_string()))?;

        self.rows += 1;
        Ok(())
    }

    /// Read a record back in file order.
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<CellResult>, StorageWriteError> {
        let path = path.as_ref();
        let read_err = |message: String| StorageWriteError::Read {
            path: path.display().to_string(),
            message,
        };

        let file = File::open(path).map_err(|e| read_err(e.to_string()))?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut cells = Vec::new();
        for result in reader.deserialize() {
            let row: CellRow = result.map_err(|e| read_err(format!("CSV parsing error: {}", e)))?;
            cells.push(CellResult::from(row));
        }
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lt_types::LoadTotals;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cells() -> Vec<CellResult> {
        vec![
            CellResult::measured(
                ParameterPoint::new(1, 2, 8, 4),
                CellStatus::Completed,
                LoadTotals {
                    tokens_generated: 4096,
                    requests_sent: 64,
                    requests_failed: 1,
                },
                Duration::from_millis(12_345),
            ),
            CellResult::startup_failed(ParameterPoint::new(2, 2, 8, 4)),
            CellResult::measured(
                ParameterPoint::new(4, 1, 1, 16),
                CellStatus::TimedOut,
                LoadTotals {
                    tokens_generated: 777,
                    requests_sent: 13,
                    requests_failed: 0,
                },
                Duration::from_secs_f64(3.0 / 7.0),
            ),
        ]
    }

    #[test]
    fn rows_read_back_exactly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results").join("sweep.csv");

        let mut store = CsvRecordStore::create(&path).unwrap();
        for cell in cells() {
            store.append(&cell).unwrap();
        }
        assert_eq!(store.rows(), 3);

        assert_eq!(CsvRecordStore::read_all(&path).unwrap(), cells());
    }

    #[test]
    fn header_is_written_before_any_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.csv");
        let _store = CsvRecordStore::create(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim_end(), CellRow::HEADER.join(","));
        assert!(CsvRecordStore::read_all(&path).unwrap().is_empty());
    }

    #[test]
    fn rows_are_visible_after_each_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.csv");
        let mut store = CsvRecordStore::create(&path).unwrap();

        let all = cells();
        store.append(&all[0]).unwrap();
        assert_eq!(CsvRecordStore::read_all(&path).unwrap(), vec![all[0].clone()]);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.lines().nth(1).unwrap().ends_with(",completed"));
    }

    #[test]
    fn create_fails_under_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a dir").unwrap();

        let err = CsvRecordStore::create(blocker.join("sweep.csv")).err().unwrap();
        assert!(matches!(err, StorageWriteError::Create { .. }));
    }

    #[test]
    fn missing_record_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = CsvRecordStore::read_all(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, StorageWriteError::Read { .. }));
    }

    #[test]
    fn file_name_uses_model_stem_and_utc_stamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            record_file_name("/models/qwen2.5-7b-q4_k_m.gguf", at),
            "sweep-qwen2.5-7b-q4_k_m-20260309T140507Z.csv"
        );
        assert_eq!(record_file_name("org/My Model", at), "sweep-My-Model-20260309T140507Z.csv");
    }
}
