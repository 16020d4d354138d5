//! Measurement record sinks.
//!
//! Every resistance estimate the controller produces — one per probe sweep
//! and one per ramp attempt with enough samples for a fit — is appended as
//! a row through a [`RecordSink`]. Terminal events get one final row. The
//! CSV implementation writes a `# `-prefixed JSON metadata preamble ahead
//! of the header so a file is self-describing.

use crate::error::DaqError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Which stage of the session produced a resistance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPhase {
    /// Low-voltage resistance probe sweep.
    Probe,
    /// Ramp-to-ceiling attempt.
    Ramp,
}

impl RecordPhase {
    fn as_str(self) -> &'static str {
        match self {
            RecordPhase::Probe => "probe",
            RecordPhase::Ramp => "ramp",
        }
    }
}

/// Session header written as the metadata preamble of an output file.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    /// Unique identifier of the session run.
    pub run_id: Uuid,
    /// UTC start time of the session.
    pub started: DateTime<Utc>,
    /// Controller parameters, serialized from the configuration.
    pub params: serde_json::Value,
}

/// Append-only writer for resistance estimates and terminal events.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append one resistance estimate.
    async fn record_resistance(
        &mut self,
        cycle: u64,
        phase: RecordPhase,
        ohms: f64,
    ) -> Result<(), DaqError>;

    /// Append the terminal event that ended the session.
    async fn record_terminal(
        &mut self,
        cycle: u64,
        message: &str,
        ohms: f64,
    ) -> Result<(), DaqError>;

    /// Flush buffered rows to the backing store.
    async fn flush(&mut self) -> Result<(), DaqError>;
}

/// A writer for CSV files.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Create a timestamped CSV file under `dir` and write the metadata
    /// preamble and header row.
    pub fn create(dir: &Path, metadata: &SessionMetadata) -> Result<Self, DaqError> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        let file_name = format!(
            "breakjunction_{}.csv",
            metadata.started.format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(file_name);

        let mut file = File::create(&path)?;
        let json_string = serde_json::to_string_pretty(metadata)
            .map_err(|e| DaqError::Serialization(e.to_string()))?;
        for line in json_string.lines() {
            writeln!(file, "# {line}")?;
        }

        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(["timestamp", "cycle", "phase", "resistance_ohms", "message"])
            .map_err(|e| DaqError::Storage(e.to_string()))?;

        tracing::info!(path = %path.display(), "CSV sink initialized");
        Ok(Self { path, writer })
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_row(
        &mut self,
        cycle: u64,
        phase: &str,
        ohms: f64,
        message: &str,
    ) -> Result<(), DaqError> {
        self.writer
            .write_record(&[
                Utc::now().to_rfc3339(),
                cycle.to_string(),
                phase.to_string(),
                ohms.to_string(),
                message.to_string(),
            ])
            .map_err(|e| DaqError::Storage(e.to_string()))
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn record_resistance(
        &mut self,
        cycle: u64,
        phase: RecordPhase,
        ohms: f64,
    ) -> Result<(), DaqError> {
        self.write_row(cycle, phase.as_str(), ohms, "")
    }

    async fn record_terminal(
        &mut self,
        cycle: u64,
        message: &str,
        ohms: f64,
    ) -> Result<(), DaqError> {
        self.write_row(cycle, "terminal", ohms, message)?;
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), DaqError> {
        self.writer
            .flush()
            .map_err(|e| DaqError::Storage(e.to_string()))
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Recorded resistance rows: (cycle, phase, ohms).
    pub rows: Vec<(u64, &'static str, f64)>,
    /// Terminal rows: (cycle, message, ohms).
    pub terminals: Vec<(u64, String, f64)>,
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn record_resistance(
        &mut self,
        cycle: u64,
        phase: RecordPhase,
        ohms: f64,
    ) -> Result<(), DaqError> {
        self.rows.push((cycle, phase.as_str(), ohms));
        Ok(())
    }

    async fn record_terminal(
        &mut self,
        cycle: u64,
        message: &str,
        ohms: f64,
    ) -> Result<(), DaqError> {
        self.terminals.push((cycle, message.to_string(), ohms));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), DaqError> {
        Ok(())
    }
}

/// Optional observer that persists the sample trace of the final ramp
/// attempt when a session terminates. Headless stand-in for the plot
/// snapshot the bench software saved.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Persist the (voltage, current) trace under a terminal-event label.
    async fn save_trace(&self, label: &str, samples: &[(f64, f64)]) -> Result<(), DaqError>;
}

/// Snapshot sink writing one CSV trace file per terminal event.
pub struct CsvTraceSnapshot {
    dir: PathBuf,
}

impl CsvTraceSnapshot {
    /// Snapshots will be written under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SnapshotSink for CsvTraceSnapshot {
    async fn save_trace(&self, label: &str, samples: &[(f64, f64)]) -> Result<(), DaqError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(format!(
            "trace_{label}_{}.csv",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let mut writer =
            csv::Writer::from_path(&path).map_err(|e| DaqError::Storage(e.to_string()))?;
        writer
            .write_record(["voltage_v", "current_a"])
            .map_err(|e| DaqError::Storage(e.to_string()))?;
        for (v, i) in samples {
            writer
                .write_record(&[v.to_string(), i.to_string()])
                .map_err(|e| DaqError::Storage(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| DaqError::Storage(e.to_string()))?;
        tracing::info!(path = %path.display(), label, "trace snapshot saved");
        Ok(())
    }
}
