use lmdb::Error as LmdbError;
use thiserror::Error;

/// Faults surfaced by the storage engine.
///
/// Every backend failure is returned to the caller as one of these; nothing
/// is retried internally.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unavailable, locked, or the schema could not be created.
    #[error("Open error: {0}")]
    Open(String),
    /// Query failure, undecodable record, or unreadable evidence blob.
    #[error("Read error: {0}")]
    Read(String),
    /// Insert failed and its transaction was aborted.
    #[error("Write error: {0}")]
    Write(String),
    /// Input rejected before reaching the store.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl StoreError {
    pub fn open(context: &str, err: LmdbError) -> Self {
        StoreError::Open(format!("{context}: {err}"))
    }

    pub fn read(context: &str, err: LmdbError) -> Self {
        StoreError::Read(format!("{context}: {err}"))
    }

    pub fn write(context: &str, err: LmdbError) -> Self {
        match err {
            LmdbError::MapFull => StoreError::Write(format!("{context}: storage quota exceeded")),
            other => StoreError::Write(format!("{context}: {other}")),
        }
    }
}
