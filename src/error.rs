use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AddressExtractionFailed,
    NoEligibleWorker,
    WorkerUnavailable,
    OrderAlreadyAssigned,
    QuotaExceeded,
    // Non-fatal: the order stays routed to the external carrier.
    ThirdPartyNotifyFailed,
    AssignmentError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::AddressExtractionFailed => "ADDRESS_EXTRACTION_FAILED",
            ErrorCode::NoEligibleWorker => "NO_ELIGIBLE_WORKER",
            ErrorCode::WorkerUnavailable => "WORKER_UNAVAILABLE",
            ErrorCode::OrderAlreadyAssigned => "ORDER_ALREADY_ASSIGNED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::ThirdPartyNotifyFailed => "THIRD_PARTY_NOTIFY_FAILED",
            ErrorCode::AssignmentError => "ASSIGNMENT_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("row lock on {entity} {id} not acquired within {waited_ms}ms")]
    LockTimeout {
        entity: &'static str,
        id: Uuid,
        waited_ms: u64,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("carrier rejected shipment: {0}")]
    Rejected(String),

    #[error("carrier unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid zone set: {0}")]
    InvalidZones(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
