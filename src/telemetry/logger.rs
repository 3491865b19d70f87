//! Rotating JSONL telemetry log.
//!
//! One JSON object per line, each stamped with an RFC 3339 `timestamp`.
//! A new file starts after `max_records_per_file` records and only the
//! newest `max_files_to_keep` files are kept.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;

const FILE_PREFIX: &str = "telemetry_";
const FILE_SUFFIX: &str = ".jsonl";

pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files_opened: u64,
}

impl TelemetryLogger {
    /// Creates the log directory if needed; the first file opens on first write
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;
        info!("Telemetry log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            files_opened: 0,
        })
    }

    /// Append one record
    ///
    /// Structs are written flat with `timestamp` added; anything else is
    /// wrapped as `{"timestamp": ..., "value": ...}`.
    pub fn log<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let timestamp = Value::String(Utc::now().to_rfc3339());
        let line = match serde_json::to_value(record)? {
            Value::Object(mut fields) => {
                fields.insert("timestamp".to_string(), timestamp);
                Value::Object(fields)
            }
            other => serde_json::json!({ "timestamp": timestamp, "value": other }),
        };

        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    /// Directory holding the log files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.files_opened,
            FILE_SUFFIX
        );
        let path = self.dir.join(name);
        debug!("Opening telemetry log {}", path.display());

        self.writer = Some(BufWriter::new(File::create(&path)?));
        self.records_in_file = 0;
        self.files_opened += 1;

        self.prune()
    }

    /// Delete the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut logs: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();

        if logs.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names sort chronologically
        logs.sort();
        let excess = logs.len() - self.max_files_to_keep;
        for path in logs.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old telemetry log {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Sample {
        quality: u8,
        state: &'static str,
    }

    fn config(dir: &TempDir, per_file: usize, keep: usize) -> TelemetryConfig {
        TelemetryConfig {
            enabled: true,
            log_dir: dir.path().to_string_lossy().into_owned(),
            max_records_per_file: per_file,
            max_files_to_keep: keep,
            log_interval_ms: 100,
            format: "jsonl".to_string(),
        }
    }

    fn log_files(dir: &TempDir) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_no_file_until_first_record() {
        let dir = TempDir::new().unwrap();
        let _logger = TelemetryLogger::new(&config(&dir, 10, 3)).unwrap();
        assert!(log_files(&dir).is_empty());
    }

    #[test]
    fn test_records_are_flat_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(&dir, 10, 3)).unwrap();
        logger.log(&Sample { quality: 97, state: "connected" }).unwrap();
        logger.log(&Sample { quality: 50, state: "reconnecting" }).unwrap();

        let files = log_files(&dir);
        assert_eq!(files.len(), 1);

        let contents = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["quality"], 97);
        assert_eq!(first["state"], "connected");
        assert!(first["timestamp"].is_string());
    }

    #[test]
    fn test_non_object_records_are_wrapped() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(&dir, 10, 3)).unwrap();
        logger.log(&42u32).unwrap();

        let contents = fs::read_to_string(&log_files(&dir)[0]).unwrap();
        let line: Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line["value"], 42);
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(&config(&dir, 2, 3)).unwrap();

        for i in 0..11u8 {
            logger.log(&Sample { quality: i, state: "connected" }).unwrap();
        }

        // 11 records at 2 per file = 6 files opened, 3 kept
        let files = log_files(&dir);
        assert_eq!(files.len(), 3);

        let newest = fs::read_to_string(files.last().unwrap()).unwrap();
        let line: Value = serde_json::from_str(newest.trim()).unwrap();
        assert_eq!(line["quality"], 10);
    }

    #[test]
    fn test_foreign_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let mut logger = TelemetryLogger::new(&config(&dir, 1, 1)).unwrap();
        for i in 0..3u8 {
            logger.log(&Sample { quality: i, state: "connected" }).unwrap();
        }

        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(log_files(&dir).len(), 2);
    }
}
