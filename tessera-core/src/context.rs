use std::sync::Arc;

use axum::extract::FromRequestParts;
use http::request::Parts;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

/// Per-request value carrier populated by the middleware chain.
///
/// Stored in the request extensions by the pipeline; handlers and services
/// receive it explicitly as their first argument rather than through
/// task-locals. All entries are optional — a request that carries no token
/// traverses the chain with the anonymous default and downstream
/// authorization decides whether to reject it.
#[derive(Clone)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub user_is_admin: bool,
    pub tenant_id: Option<String>,
    pub roles: Vec<String>,
    pub trace_id: Option<String>,
    pub token: Option<String>,
    pub oauth_provider: Option<String>,
    pub oauth_profile: Option<serde_json::Value>,
    pub config: Option<Arc<AppConfig>>,
    /// Cancelled when the request future is dropped (client disconnect).
    /// DataProvider calls are expected to honor it.
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// An anonymous context with a fresh cancellation token.
    pub fn anonymous() -> Self {
        RequestContext {
            user_id: None,
            user_is_admin: false,
            tenant_id: None,
            roles: Vec::new(),
            trace_id: None,
            token: None,
            oauth_provider: None,
            oauth_profile: None,
            config: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("user_id", &self.user_id)
            .field("user_is_admin", &self.user_is_admin)
            .field("tenant_id", &self.tenant_id)
            .field("roles", &self.roles)
            .field("trace_id", &self.trace_id)
            .finish_non_exhaustive()
    }
}

/// Extractor: clones the context out of the request extensions.
///
/// Requests that did not traverse the pipeline yield the anonymous default,
/// so handlers can always take `ctx: RequestContext`.
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_context_carries_nothing() {
        let ctx = RequestContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert!(!ctx.user_is_admin);
        assert!(ctx.roles.is_empty());
        assert!(!ctx.cancel.is_cancelled());
    }

    #[test]
    fn role_lookup() {
        let mut ctx = RequestContext::anonymous();
        ctx.roles = vec!["admin".to_string(), "editor".to_string()];
        assert!(ctx.has_role("admin"));
        assert!(!ctx.has_role("guest"));
    }
}
