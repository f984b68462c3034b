use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::rule::PolicyRule;

/// Policy storage failure.
#[derive(Debug)]
pub enum PolicyError {
    Store(String),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::Store(msg) => write!(f, "policy store error: {msg}"),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Storage abstraction for policy rules.
///
/// Real deployments back this with the relational store of a data
/// extension; the engine only ever sees this trait.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Load the complete rule set.
    async fn load(&self) -> Result<Vec<PolicyRule>, PolicyError>;

    /// Insert a rule. Returns `false` when the identical tuple already
    /// exists (full-tuple uniqueness is the store's concern).
    async fn add(&self, rule: PolicyRule) -> Result<bool, PolicyError>;

    /// Remove an exact rule. Returns whether anything was removed.
    async fn remove(&self, rule: &PolicyRule) -> Result<bool, PolicyError>;

    /// Remove every rule of `ptype` whose fields from `field_index` onward
    /// equal `values` (empty strings skip a position). Returns the number of
    /// removed rules. Used when revoking a role or permission in bulk.
    async fn remove_filtered(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[&str],
    ) -> Result<usize, PolicyError>;
}

/// In-memory reference store, also used by tests and development mode.
#[derive(Default)]
pub struct MemoryPolicyStore {
    rules: RwLock<Vec<PolicyRule>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor with seed rules.
    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn load(&self) -> Result<Vec<PolicyRule>, PolicyError> {
        Ok(self.rules.read().await.clone())
    }

    async fn add(&self, rule: PolicyRule) -> Result<bool, PolicyError> {
        let mut rules = self.rules.write().await;
        if rules.contains(&rule) {
            return Ok(false);
        }
        rules.push(rule);
        Ok(true)
    }

    async fn remove(&self, rule: &PolicyRule) -> Result<bool, PolicyError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r != rule);
        Ok(rules.len() < before)
    }

    async fn remove_filtered(
        &self,
        ptype: &str,
        field_index: usize,
        values: &[&str],
    ) -> Result<usize, PolicyError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.ptype != ptype || !r.matches_from(field_index, values));
        Ok(before - rules.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{PolicyRule, PTYPE_POLICY};

    #[tokio::test]
    async fn add_enforces_full_tuple_uniqueness() {
        let store = MemoryPolicyStore::new();
        let rule = PolicyRule::policy("admin", "t1", "/sys/users", "GET");
        assert!(store.add(rule.clone()).await.unwrap());
        assert!(!store.add(rule.clone()).await.unwrap());
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_filtered_deletes_matching_suffixes() {
        let store = MemoryPolicyStore::new();
        store
            .add(PolicyRule::policy("admin", "t1", "/sys/users", "GET"))
            .await
            .unwrap();
        store
            .add(PolicyRule::policy("admin", "t2", "/sys/users", "GET"))
            .await
            .unwrap();
        store
            .add(PolicyRule::policy("guest", "t1", "/pub", "GET"))
            .await
            .unwrap();

        // Revoke everything granted to the admin role, across tenants.
        let removed = store
            .remove_filtered(PTYPE_POLICY, 0, &["admin"])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let rest = store.load().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].subject(), "guest");
    }

    #[tokio::test]
    async fn remove_filtered_skips_empty_positions() {
        let store = MemoryPolicyStore::new();
        store
            .add(PolicyRule::policy("admin", "t1", "/a", "GET"))
            .await
            .unwrap();
        store
            .add(PolicyRule::policy("guest", "t1", "/a", "GET"))
            .await
            .unwrap();
        store
            .add(PolicyRule::policy("admin", "t2", "/a", "GET"))
            .await
            .unwrap();

        // Any subject, tenant t1.
        let removed = store
            .remove_filtered(PTYPE_POLICY, 0, &["", "t1"])
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }
}
