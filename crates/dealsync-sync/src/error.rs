use dealsync_adapters::StoreError;
use dealsync_core::{IdentifierError, RowKind};
use thiserror::Error;

/// Everything that aborts a run. Nothing here is recovered locally.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error("destination row {row_id} has kind {kind:?}, expected a row")]
    UnexpectedRowKind { row_id: String, kind: RowKind },
    #[error("destination title column is {found:?} but the layout expects {expected:?}")]
    TitleColumnConflict { expected: String, found: String },
    #[error("{operation} failed: {source}")]
    RemoteCallFailure {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(StoreError) -> SyncError {
        move |source| SyncError::RemoteCallFailure { operation, source }
    }
}
