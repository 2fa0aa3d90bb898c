use roster_core::DataParseError;
use roster_store::StoreError;

/// Reconciliation failures. Every variant is returned to the caller, which
/// retries the request; derived state stays at its last written value.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Store I/O failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Payload did not match its schema. Admission should make this impossible.
    #[error(transparent)]
    DataParse(#[from] DataParseError),
    #[error("node health has not been reconciled yet")]
    NodeUnreconciled,
    #[error("node health has invalid reason {0:?}")]
    NodeHealthInvalid(String),
    #[error("node health status is missing the {0} condition")]
    NodeHealthConditionNotFound(&'static str),
}

impl ReconcileError {
    /// A dependency's health is not published yet or cannot be interpreted.
    /// Retrying after the dependency reconciles is expected to succeed.
    pub fn is_dependency_unresolved(&self) -> bool {
        matches!(
            self,
            ReconcileError::NodeUnreconciled | ReconcileError::NodeHealthInvalid(_) | ReconcileError::NodeHealthConditionNotFound(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Store(StoreError::Cancelled))
    }
}
