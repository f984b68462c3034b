use async_trait::async_trait;

use tessera_core::RequestContext;

/// Well-known name of the extension owning tenant resolution.
pub const TENANT_EXTENSION: &str = "tenant";
/// Well-known service name for the tenant resolution facade.
pub const USER_TENANT_SERVICE: &str = "UserTenant";

/// Facade the tenant extension publishes under
/// `("tenant", "UserTenant")` for the pipeline to resolve a user's default
/// tenant when the request carries no `X-Md-Tenant-Id` header.
///
/// Publish it as `ServiceHandle::new(Arc<dyn TenantResolver>)` so consumers
/// can cast the handle back without seeing the concrete implementation.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// The user's default tenant id, if any.
    async fn default_tenant(&self, ctx: &RequestContext, user_id: &str) -> Option<String>;
}
