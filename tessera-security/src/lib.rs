//! Authentication and authorization pipeline for Tessera.
//!
//! Provides the token codec, the six-step middleware chain of the shared
//! HTTP engine, the mount-time permission guards, and the tenant resolution
//! facade consumed through the service locator.

mod error;
mod permission;
mod pipeline;
mod tenant;
mod token;

pub use error::SecurityError;
pub use permission::{has_any_permission, has_permission};
pub use pipeline::{AuthPipeline, PipelineState, TENANT_HEADER, TRACE_HEADER};
pub use tenant::{TenantResolver, TENANT_EXTENSION, USER_TENANT_SERVICE};
pub use token::{Claims, TokenCodec, REFRESH_WINDOW_SECS};
