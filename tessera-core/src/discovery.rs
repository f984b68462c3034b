use async_trait::async_trait;

use crate::config::DiscoveryConfig;
use crate::extension::ServiceInfo;

/// Outbound side-effect target for service discovery registration.
///
/// Registration is optional: the runtime offers Ready extensions that opt in
/// (`need_service_discovery`) to the registrar; nothing in the core depends
/// on it. A Consul-backed implementation lives outside this crate.
#[async_trait]
pub trait ServiceRegistrar: Send + Sync {
    async fn register(&self, name: &str, info: &ServiceInfo);
    async fn deregister(&self, name: &str);
}

/// Default registrar: logs the offer and does nothing else.
pub struct NoopRegistrar;

#[async_trait]
impl ServiceRegistrar for NoopRegistrar {
    async fn register(&self, name: &str, info: &ServiceInfo) {
        tracing::debug!(extension = %name, address = %info.address, "discovery registration skipped");
    }

    async fn deregister(&self, name: &str) {
        tracing::debug!(extension = %name, "discovery deregistration skipped");
    }
}

/// Merge an extension's declared info with the configured defaults.
///
/// Extension-declared tags and meta win over the defaults.
pub fn merged_info(info: &ServiceInfo, defaults: &DiscoveryConfig) -> ServiceInfo {
    let mut merged = ServiceInfo {
        address: info.address.clone(),
        tags: defaults.default_tags.clone(),
        meta: defaults.default_meta.clone(),
    };
    for tag in &info.tags {
        if !merged.tags.contains(tag) {
            merged.tags.push(tag.clone());
        }
    }
    merged.meta.extend(info.meta.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_merge_under_declared_values() {
        let defaults = DiscoveryConfig {
            default_tags: vec!["tessera".to_string()],
            default_meta: HashMap::from([("env".to_string(), "prod".to_string())]),
        };
        let info = ServiceInfo {
            address: "10.0.0.1:8080".to_string(),
            tags: vec!["sys".to_string()],
            meta: HashMap::from([("env".to_string(), "staging".to_string())]),
        };
        let merged = merged_info(&info, &defaults);
        assert_eq!(merged.address, "10.0.0.1:8080");
        assert_eq!(merged.tags, vec!["tessera", "sys"]);
        assert_eq!(merged.meta.get("env").map(String::as_str), Some("staging"));
    }
}
