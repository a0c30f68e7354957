use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Key/value progress records, one row per dump.
pub trait ProgressLog {
    fn log_kv(&mut self, key: &str, value: f64);

    /// Close the current row.
    fn dump_kvs(&mut self) -> Result<()>;

    /// Store the average-return series of a finished run.
    fn record_returns(&mut self, _returns: &[f64]) -> Result<()> {
        Ok(())
    }
}

/// Keeps rows in memory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryProgress {
    pub rows: Vec<Vec<(String, f64)>>,
    pub returns: Vec<f64>,
    pending: Vec<(String, f64)>,
}

impl MemoryProgress {
    pub fn new() -> MemoryProgress {
        MemoryProgress::default()
    }

    /// Values logged under `key`, in row order.
    pub fn column(&self, key: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.iter().find(|(k, _)| k == key).map(|(_, v)| *v))
            .collect()
    }
}

impl ProgressLog for MemoryProgress {
    fn log_kv(&mut self, key: &str, value: f64) {
        set_kv(&mut self.pending, key, value);
    }

    fn dump_kvs(&mut self) -> Result<()> {
        self.rows.push(std::mem::take(&mut self.pending));
        Ok(())
    }

    fn record_returns(&mut self, returns: &[f64]) -> Result<()> {
        self.returns = returns.to_vec();
        Ok(())
    }
}

/// Writes rows to `<dir>/progress.csv` and the return series to
/// `<dir>/returns.csv`.
///
/// The column set is fixed by the first dump. Keys first seen later are
/// dropped with a warning.
pub struct CsvProgress {
    dir: PathBuf,
    writer: csv::Writer<File>,
    header: Option<Vec<String>>,
    pending: Vec<(String, f64)>,
}

impl CsvProgress {
    pub fn create(dir: &Path) -> Result<CsvProgress> {
        fs::create_dir_all(dir)?;
        let writer = csv::Writer::from_path(dir.join("progress.csv"))?;
        log::info!("logging to {}", dir.display());
        Ok(CsvProgress { dir: dir.to_path_buf(), writer, header: None, pending: Vec::new() })
    }
}

impl ProgressLog for CsvProgress {
    fn log_kv(&mut self, key: &str, value: f64) {
        set_kv(&mut self.pending, key, value);
    }

    fn dump_kvs(&mut self) -> Result<()> {
        let row = std::mem::take(&mut self.pending);
        if self.header.is_none() {
            let keys: Vec<String> = row.iter().map(|(k, _)| k.clone()).collect();
            self.writer.write_record(&keys)?;
            self.header = Some(keys);
        }
        let header = self.header.as_deref().unwrap_or_default();
        for (key, _) in row.iter().filter(|(k, _)| !header.contains(k)) {
            log::warn!("dropping key '{key}' missing from the progress header");
        }
        let record: Vec<String> = header
            .iter()
            .map(|h| {
                row.iter()
                    .find(|(k, _)| k == h)
                    .map_or_else(String::new, |(_, v)| v.to_string())
            })
            .collect();
        self.writer.write_record(&record)?;
        self.writer.flush()?;
        log::debug!("{}", row.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" "));
        Ok(())
    }

    fn record_returns(&mut self, returns: &[f64]) -> Result<()> {
        write_returns(&self.dir.join("returns.csv"), returns)
    }
}

/// Write an average-return series as `(Iteration Index, Average Returns)`
/// rows.
pub fn write_returns(path: &Path, returns: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Iteration Index", "Average Returns"])?;
    for (i, r) in returns.iter().enumerate() {
        writer.write_record([i.to_string(), r.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Overwrite `key` if it is already pending, otherwise append it.
fn set_kv(pending: &mut Vec<(String, f64)>, key: &str, value: f64) {
    match pending.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => pending.push((key.to_string(), value)),
    }
}
