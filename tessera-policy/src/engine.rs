use std::sync::Arc;

use tokio::sync::RwLock;

use crate::rule::{PolicyRule, ANY_TENANT, PTYPE_GROUPING, PTYPE_POLICY};
use crate::store::{PolicyError, PolicyStore};

/// Split of the loaded rule set by kind.
struct RuleSet {
    policies: Vec<PolicyRule>,
    groupings: Vec<PolicyRule>,
}

impl RuleSet {
    fn from_rules(rules: Vec<PolicyRule>) -> Self {
        let (policies, rest): (Vec<PolicyRule>, Vec<PolicyRule>) = rules
            .into_iter()
            .partition(|r| r.ptype == PTYPE_POLICY);
        let groupings = rest
            .into_iter()
            .filter(|r| r.ptype == PTYPE_GROUPING)
            .collect();
        RuleSet { policies, groupings }
    }
}

/// Evaluates `(subject, tenant, object, action)` decisions against the
/// stored rule set.
///
/// Rules are loaded once at startup and cached in memory; `refresh()`
/// reloads from the store and swaps the cache atomically, so concurrent
/// decisions always see a consistent snapshot. Evaluation is pure over that
/// snapshot — identical inputs yield identical decisions.
///
/// Matching: an object pattern ending in `*` is a prefix wildcard,
/// otherwise the match is exact; actions compare case-insensitively with
/// `*` matching anything. Subjects evaluate independently: within one
/// subject's matching rules the most specific one wins (longest object
/// pattern, then non-wildcard action) and an effect of `deny` on that
/// winner denies the subject. A full decision allows as soon as any of the
/// user's subjects allows.
pub struct PolicyEngine {
    store: Arc<dyn PolicyStore>,
    cache: RwLock<Arc<RuleSet>>,
}

impl PolicyEngine {
    /// Load the rule set from the store and build the engine.
    pub async fn new(store: Arc<dyn PolicyStore>) -> Result<Self, PolicyError> {
        let rules = store.load().await?;
        Ok(Self {
            store,
            cache: RwLock::new(Arc::new(RuleSet::from_rules(rules))),
        })
    }

    /// Reload rules from the store and swap the cache.
    pub async fn refresh(&self) -> Result<(), PolicyError> {
        let rules = self.store.load().await?;
        let next = Arc::new(RuleSet::from_rules(rules));
        *self.cache.write().await = next;
        tracing::debug!("policy cache refreshed");
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    async fn snapshot(&self) -> Arc<RuleSet> {
        self.cache.read().await.clone()
    }

    /// Roles granted to `user`: global grants (`g` with tenant `*`) plus
    /// grants scoped to `tenant`, deduplicated in rule order.
    pub async fn roles_for(&self, user: &str, tenant: &str) -> Vec<String> {
        let set = self.snapshot().await;
        let mut roles = Vec::new();
        for rule in &set.groupings {
            if rule.v0 != user {
                continue;
            }
            let scope = &rule.v2;
            if scope == ANY_TENANT || scope == tenant {
                if !roles.contains(&rule.v1) {
                    roles.push(rule.v1.clone());
                }
            }
        }
        roles
    }

    /// Evaluate a single subject against the `p`-rules.
    pub async fn enforce(&self, subject: &str, tenant: &str, object: &str, action: &str) -> bool {
        let set = self.snapshot().await;
        subject_allows(&set.policies, subject, tenant, object, action)
    }

    /// Full decision for a user.
    ///
    /// The subject set is the user's stored roles (global + tenant-scoped
    /// `g`-rules) merged with `token_roles` carried by the credential, plus
    /// the user id itself for rules granted directly. Each subject is
    /// enforced on its own; any subject allowed allows the request. No
    /// match on any subject denies.
    pub async fn decide(
        &self,
        user: &str,
        token_roles: &[String],
        tenant: &str,
        object: &str,
        action: &str,
    ) -> bool {
        let mut subjects: Vec<String> = self.roles_for(user, tenant).await;
        for role in token_roles {
            if !subjects.contains(role) {
                subjects.push(role.clone());
            }
        }
        subjects.push(user.to_string());

        let set = self.snapshot().await;
        subjects
            .iter()
            .any(|subject| subject_allows(&set.policies, subject, tenant, object, action))
    }
}

fn tenant_match(rule_tenant: &str, tenant: &str) -> bool {
    rule_tenant == ANY_TENANT || rule_tenant == tenant
}

fn object_match(pattern: &str, object: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => object.starts_with(prefix),
        None => pattern == object,
    }
}

fn action_match(pattern: &str, action: &str) -> bool {
    pattern == "*" || pattern.eq_ignore_ascii_case(action)
}

/// Specificity: exact objects beat wildcards, longer prefixes beat shorter,
/// concrete actions beat `*`.
fn specificity(rule: &PolicyRule) -> (usize, usize) {
    let object = match rule.object().strip_suffix('*') {
        Some(prefix) => prefix.len(),
        None => usize::MAX,
    };
    let action = usize::from(rule.action() != "*");
    (object, action)
}

/// Enforce one subject: the most specific rule among that subject's own
/// matches decides, and only its effect counts.
fn subject_allows(
    policies: &[PolicyRule],
    subject: &str,
    tenant: &str,
    object: &str,
    action: &str,
) -> bool {
    policies
        .iter()
        .filter(|rule| {
            rule.subject() == subject
                && tenant_match(rule.tenant(), tenant)
                && object_match(rule.object(), object)
                && action_match(rule.action(), action)
        })
        .max_by_key(|rule| specificity(rule))
        .map(|rule| !rule.is_deny())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPolicyStore;

    async fn engine(rules: Vec<PolicyRule>) -> PolicyEngine {
        PolicyEngine::new(Arc::new(MemoryPolicyStore::with_rules(rules)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn exact_rule_allows() {
        let engine = engine(vec![PolicyRule::policy("admin", "t1", "/sys/users", "GET")]).await;
        assert!(
            engine
                .decide("u1", &["admin".to_string()], "t1", "/sys/users", "GET")
                .await
        );
        assert!(!engine.decide("u1", &["admin".to_string()], "t1", "/sys/users", "POST").await);
        assert!(!engine.decide("u1", &["admin".to_string()], "t2", "/sys/users", "GET").await);
    }

    #[tokio::test]
    async fn no_matching_rule_denies() {
        let engine = engine(vec![PolicyRule::policy("admin", "t1", "/sys/users", "GET")]).await;
        assert!(!engine.decide("u1", &["guest".to_string()], "t1", "/sys/users", "GET").await);
    }

    #[tokio::test]
    async fn trailing_star_is_a_prefix_wildcard() {
        let engine = engine(vec![PolicyRule::policy("admin", "t1", "/sys/*", "*")]).await;
        assert!(engine.enforce("admin", "t1", "/sys/users", "GET").await);
        assert!(engine.enforce("admin", "t1", "/sys/menus/1", "DELETE").await);
        assert!(!engine.enforce("admin", "t1", "/plug/counter", "GET").await);
    }

    #[tokio::test]
    async fn most_specific_rule_wins() {
        let engine = engine(vec![
            PolicyRule::policy("admin", "t1", "/sys/*", "*"),
            PolicyRule::policy_with_effect("admin", "t1", "/sys/secrets", "GET", "deny"),
        ])
        .await;
        assert!(engine.enforce("admin", "t1", "/sys/users", "GET").await);
        assert!(!engine.enforce("admin", "t1", "/sys/secrets", "GET").await);

        // Longer wildcard prefix beats shorter one.
        let engine = engine_with_prefixes().await;
        assert!(!engine.enforce("admin", "t1", "/sys/audit/log", "GET").await);
        assert!(engine.enforce("admin", "t1", "/sys/users", "GET").await);
    }

    async fn engine_with_prefixes() -> PolicyEngine {
        engine(vec![
            PolicyRule::policy("admin", "t1", "/sys/*", "*"),
            PolicyRule::policy_with_effect("admin", "t1", "/sys/audit/*", "*", "deny"),
        ])
        .await
    }

    #[tokio::test]
    async fn subjects_are_enforced_independently_and_ored() {
        // One role allows via a wildcard, another carries a more specific
        // deny for the same path. The deny binds only the role that holds
        // it; a user who also has the allowing role is still allowed.
        let engine = engine(vec![
            PolicyRule::policy("viewer", "t1", "/sys/*", "*"),
            PolicyRule::policy_with_effect("blocked", "t1", "/sys/secrets", "GET", "deny"),
        ])
        .await;

        assert!(
            engine
                .decide(
                    "u1",
                    &["viewer".to_string(), "blocked".to_string()],
                    "t1",
                    "/sys/secrets",
                    "GET",
                )
                .await
        );
        assert!(
            !engine
                .decide("u2", &["blocked".to_string()], "t1", "/sys/secrets", "GET")
                .await
        );
    }

    #[tokio::test]
    async fn non_wildcard_action_beats_star() {
        let engine = engine(vec![
            PolicyRule::policy("admin", "t1", "/sys/jobs", "*"),
            PolicyRule::policy_with_effect("admin", "t1", "/sys/jobs", "DELETE", "deny"),
        ])
        .await;
        assert!(engine.enforce("admin", "t1", "/sys/jobs", "GET").await);
        assert!(!engine.enforce("admin", "t1", "/sys/jobs", "DELETE").await);
    }

    #[tokio::test]
    async fn grouping_rules_grant_roles() {
        let engine = engine(vec![
            PolicyRule::grouping("u1", "admin", "t1"),
            PolicyRule::grouping("u1", "auditor", ANY_TENANT),
            PolicyRule::grouping("u2", "admin", "t2"),
            PolicyRule::policy("admin", "t1", "/sys/users", "GET"),
            PolicyRule::policy("auditor", "*", "/sys/audit", "GET"),
        ])
        .await;

        assert_eq!(engine.roles_for("u1", "t1").await, vec!["admin", "auditor"]);
        assert_eq!(engine.roles_for("u1", "t2").await, vec!["auditor"]);

        // Stored roles decide even when the token carries none.
        assert!(engine.decide("u1", &[], "t1", "/sys/users", "GET").await);
        assert!(engine.decide("u1", &[], "t2", "/sys/audit", "GET").await);
        assert!(!engine.decide("u2", &[], "t2", "/sys/users", "GET").await);
    }

    #[tokio::test]
    async fn direct_user_subject_rules_apply() {
        let engine = engine(vec![PolicyRule::policy("u7", "t1", "/sys/profile", "GET")]).await;
        assert!(engine.decide("u7", &[], "t1", "/sys/profile", "GET").await);
        assert!(!engine.decide("u8", &[], "t1", "/sys/profile", "GET").await);
    }

    #[tokio::test]
    async fn actions_compare_case_insensitively() {
        let engine = engine(vec![PolicyRule::policy("admin", "t1", "/sys/users", "get")]).await;
        assert!(engine.enforce("admin", "t1", "/sys/users", "GET").await);
    }

    #[tokio::test]
    async fn decisions_are_deterministic() {
        let engine = engine(vec![
            PolicyRule::policy("admin", "t1", "/sys/*", "*"),
            PolicyRule::policy("admin", "t1", "/sys/users", "GET"),
        ])
        .await;
        let first = engine.decide("u1", &["admin".to_string()], "t1", "/sys/users", "GET").await;
        for _ in 0..10 {
            assert_eq!(
                engine
                    .decide("u1", &["admin".to_string()], "t1", "/sys/users", "GET")
                    .await,
                first
            );
        }
    }

    #[tokio::test]
    async fn refresh_picks_up_store_mutations() {
        let store = Arc::new(MemoryPolicyStore::new());
        let engine = PolicyEngine::new(store.clone() as Arc<dyn PolicyStore>)
            .await
            .unwrap();
        assert!(!engine.enforce("admin", "t1", "/sys/users", "GET").await);

        store
            .add(PolicyRule::policy("admin", "t1", "/sys/users", "GET"))
            .await
            .unwrap();
        // Cache still serves the old snapshot until refresh.
        assert!(!engine.enforce("admin", "t1", "/sys/users", "GET").await);

        engine.refresh().await.unwrap();
        assert!(engine.enforce("admin", "t1", "/sys/users", "GET").await);
    }
}
