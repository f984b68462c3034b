use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::{AppError, ErrorCode};

/// Storage failure at the repository boundary.
///
/// Persistence adapters are external; the runtime sees only this shape and
/// maps it onto the response envelope with [`From<StoreError> for AppError`]:
/// not-found and constraint results become `NotFound` / `Conflict`,
/// transaction aborts `Transactional`, everything else `Internal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Constraint(String),
    Transaction(String),
    Other(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "record not found"),
            StoreError::Constraint(msg) => write!(f, "constraint violated: {msg}"),
            StoreError::Transaction(msg) => write!(f, "transaction aborted: {msg}"),
            StoreError::Other(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::not_found("record not found"),
            StoreError::Constraint(msg) => AppError::conflict(msg),
            StoreError::Transaction(msg) => AppError::new(ErrorCode::Transactional, msg),
            StoreError::Other(msg) => AppError::internal(msg),
        }
    }
}

/// Facade over the persistence stack owned by a data extension.
///
/// Implementations live outside the runtime (relational, Redis, search,
/// document stores); the data extension publishes them as service handles
/// (`Arc<dyn DataProvider>`) for siblings to resolve through the locator.
/// Calls must honor the request context's cancellation token.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Adapter name (`postgres`, `redis`, ...), used in health output.
    fn name(&self) -> &str;

    /// Cheap connectivity probe.
    async fn ping(&self, ctx: &RequestContext) -> Result<(), StoreError>;
}
