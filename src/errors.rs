use chrono::Utc;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse failure category reported to callers of the procurement service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request: missing date, empty line set, negative quantity
    InvalidInput,
    /// Order, order line, product or reception could not be resolved
    NotFound,
    /// Operation not allowed in the current lifecycle stage
    InvalidState,
    /// Lost an optimistic-concurrency race; the caller should retry
    Conflict,
    /// Unexpected collaborator failure
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Purchase order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Order line {line_id} does not belong to purchase order {order_id}")]
    LineNotFound { order_id: Uuid, line_id: Uuid },

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Reception {0} not found")]
    ReceptionNotFound(Uuid),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(
        "Over-receipt on order line {line_id}: ordered {ordered}, cumulative received and rejected {cumulative}"
    )]
    OverReceipt {
        line_id: Uuid,
        ordered: i64,
        cumulative: i64,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Maps this error onto the caller-facing taxonomy.
    /// This is the single source of truth for error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_) | Self::InvalidInput(_) | Self::OverReceipt { .. } => {
                ErrorKind::InvalidInput
            }
            Self::OrderNotFound(_)
            | Self::LineNotFound { .. }
            | Self::ProductNotFound(_)
            | Self::ReceptionNotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::ConcurrentModification(_) => ErrorKind::Conflict,
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Machine-readable error code, finer grained than [`ErrorKind`].
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::OrderNotFound(_) => "order_not_found",
            Self::LineNotFound { .. } => "line_not_found",
            Self::ProductNotFound(_) => "product_not_found",
            Self::ReceptionNotFound(_) => "reception_not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::OverReceipt { .. } => "over_receipt",
            Self::ConcurrentModification(_) => "conflict",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

/// Failure half of [`OperationResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(error: &ServiceError) -> Self {
        Self {
            kind: error.kind(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Success/failure envelope returned by every caller-facing operation.
#[derive(Debug, Serialize)]
pub struct OperationResponse<T> {
    pub success: bool,
    /// Human-readable outcome description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
    /// RFC 3339 timestamp of when the envelope was built
    pub timestamp: String,
}

impl<T> OperationResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn failure(error: &ServiceError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
            error: Some(ErrorResponse::from(error)),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn from_result(result: Result<T, ServiceError>, success_message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(data, success_message),
            Err(error) => Self::failure(&error),
        }
    }
}
