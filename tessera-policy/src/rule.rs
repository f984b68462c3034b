use serde::{Deserialize, Serialize};

/// Rule kind for access policies: `(subject, tenant, object, action, ...)`.
pub const PTYPE_POLICY: &str = "p";
/// Rule kind for role inheritance: `(user, role, tenant)`.
pub const PTYPE_GROUPING: &str = "g";

/// Tenant value meaning "applies in every tenant".
pub const ANY_TENANT: &str = "*";

/// A single stored rule.
///
/// `p`-rules read `(v0: subject, v1: tenant, v2: object, v3: effect?, ...)`
/// where subject is a role slug or user id, object is a URL path (trailing
/// `*` is a prefix wildcard) and the action is an HTTP method or `*`.
/// `g`-rules read `(v0: user, v1: role, v2: tenant)`.
///
/// Identity is by primary key in the storage layer; uniqueness on the full
/// tuple is the storage layer's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    pub v3: Option<String>,
    pub v4: Option<String>,
    pub v5: Option<String>,
}

impl PolicyRule {
    /// Build a `p`-rule: `(subject, tenant, object, action)`.
    pub fn policy(subject: &str, tenant: &str, object: &str, action: &str) -> Self {
        PolicyRule {
            ptype: PTYPE_POLICY.to_string(),
            v0: subject.to_string(),
            v1: tenant.to_string(),
            v2: object.to_string(),
            v3: Some(action.to_string()),
            v4: None,
            v5: None,
        }
    }

    /// Build a `p`-rule with an explicit effect (`allow` / `deny`) in `v4`.
    pub fn policy_with_effect(
        subject: &str,
        tenant: &str,
        object: &str,
        action: &str,
        effect: &str,
    ) -> Self {
        let mut rule = Self::policy(subject, tenant, object, action);
        rule.v4 = Some(effect.to_string());
        rule
    }

    /// Build a `g`-rule: `(user, role, tenant)`.
    pub fn grouping(user: &str, role: &str, tenant: &str) -> Self {
        PolicyRule {
            ptype: PTYPE_GROUPING.to_string(),
            v0: user.to_string(),
            v1: role.to_string(),
            v2: tenant.to_string(),
            v3: None,
            v4: None,
            v5: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.v0
    }

    pub fn tenant(&self) -> &str {
        &self.v1
    }

    pub fn object(&self) -> &str {
        &self.v2
    }

    pub fn action(&self) -> &str {
        self.v3.as_deref().unwrap_or("*")
    }

    /// `p`-rule effect; anything but `deny` allows.
    pub fn is_deny(&self) -> bool {
        self.v4.as_deref() == Some("deny")
    }

    /// Positional field access over `v0..v5`.
    pub fn field(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(&self.v0),
            1 => Some(&self.v1),
            2 => Some(&self.v2),
            3 => self.v3.as_deref(),
            4 => self.v4.as_deref(),
            5 => self.v5.as_deref(),
            _ => None,
        }
    }

    /// Whether fields from `field_index` onward equal `values`.
    ///
    /// An empty string in `values` skips that position.
    pub fn matches_from(&self, field_index: usize, values: &[&str]) -> bool {
        values.iter().enumerate().all(|(i, expected)| {
            expected.is_empty() || self.field(field_index + i) == Some(*expected)
        })
    }
}
