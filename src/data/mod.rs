//! Data handling: curve fitting and measurement record storage.

pub mod fit;
pub mod storage;

pub use fit::{fit_linear, FitError, LinearFit};
pub use storage::{
    CsvSink, CsvTraceSnapshot, MemorySink, RecordPhase, RecordSink, SessionMetadata, SnapshotSink,
};
