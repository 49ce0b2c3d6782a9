pub mod sqlite;

use crate::{core::store::StoreSnapshotV1, op::StoredOp, types::OpSeq};

/// Errors raised by journal sinks.
#[derive(Debug)]
pub enum PersistError {
    /// SQLite failure.
    Sqlite(rusqlite::Error),
    /// Payload (de)serialization failure.
    Serde(serde_json::Error),
    /// Anything else, stringified.
    Message(String),
}

impl From<rusqlite::Error> for PersistError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<crate::core::store::StoreError> for PersistError {
    fn from(value: crate::core::store::StoreError) -> Self {
        Self::Message(format!("store error: {value:?}"))
    }
}

/// Result alias for sink operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Append-only journal sink consumed by the runtime's persistence worker.
pub trait OpSink: Send {
    /// Appends ops durably; returns the highest sequence written.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;

    /// Forces buffered writes to storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }

    /// Records a full-state checkpoint covering `last_seq`.
    fn write_snapshot(
        &mut self,
        _snapshot: &StoreSnapshotV1,
        _last_seq: OpSeq,
    ) -> PersistResult<()> {
        Ok(())
    }

    /// Drops journal entries at or below `seq`; returns the count removed.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
