//! Deterministic resource names.
//!
//! Every container, volume and network of a stack is derived from the
//! tenant's container-name prefix, so the lifecycle operations can find a
//! stack again from the prefix alone. Prefixes never contain `_`, so joining
//! prefix and resource with `_` keeps names of different stacks disjoint even
//! when one slug extends another (`site-acme_proxy-db` vs
//! `site-acme-proxy_db`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::ContainerSummary;

/// Label carrying the owning stack's prefix on every container.
pub const PREFIX_LABEL: &str = "sitefleet.prefix";
/// Label carrying the logical service name on every container.
pub const SERVICE_LABEL: &str = "sitefleet.service";

/// Joins a prefix and a resource suffix. Never produced by [`slugify`].
pub const NAME_SEPARATOR: char = '_';

/// The seven services composing a tenant stack, in deployment order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    Db,
    Cache,
    Backend,
    Edge,
    ProxyDb,
    Proxy,
    Console,
}

impl ServiceKind {
    /// Dependency order: every service only depends on services before it.
    pub const ALL: [ServiceKind; 7] = [
        ServiceKind::Db,
        ServiceKind::Cache,
        ServiceKind::Backend,
        ServiceKind::Edge,
        ServiceKind::ProxyDb,
        ServiceKind::Proxy,
        ServiceKind::Console,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Db => "db",
            ServiceKind::Cache => "cache",
            ServiceKind::Backend => "backend",
            ServiceKind::Edge => "edge",
            ServiceKind::ProxyDb => "proxy-db",
            ServiceKind::Proxy => "proxy",
            ServiceKind::Console => "console",
        }
    }

    /// Named volumes owned by this service, as suffixes of the prefix.
    fn volume_suffixes(self) -> &'static [&'static str] {
        match self {
            ServiceKind::Db => &["db-data"],
            ServiceKind::Cache => &["cache-data"],
            ServiceKind::Backend => &["uploads"],
            ServiceKind::Edge => &[],
            ServiceKind::ProxyDb => &["proxy-db-data"],
            ServiceKind::Proxy => &["proxy-data", "proxy-letsencrypt"],
            ServiceKind::Console => &["console-data"],
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slugify a display name: lowercase, non-alnum runs -> '-'.
///
/// Returns `None` when nothing usable remains.
pub fn slugify(name: &str) -> Option<String> {
    let mut slug = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();

    // Collapse multiple '-'.
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-').to_string();

    if slug.is_empty() { None } else { Some(slug) }
}

/// Derive the container-name prefix for a slug.
pub fn container_prefix(slug: &str) -> String {
    format!("site-{slug}")
}

/// Resource names of one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackNames {
    prefix: String,
}

impl StackNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn container(&self, service: ServiceKind) -> String {
        self.join(service.as_str())
    }

    pub fn network(&self) -> String {
        self.join("net")
    }

    pub fn volumes_for(&self, service: ServiceKind) -> Vec<String> {
        service
            .volume_suffixes()
            .iter()
            .map(|suffix| self.join(suffix))
            .collect()
    }

    pub fn all_volumes(&self) -> Vec<String> {
        ServiceKind::ALL
            .iter()
            .flat_map(|service| self.volumes_for(*service))
            .collect()
    }

    /// Whether `container` was created for this stack, judged by its
    /// ownership label rather than its name.
    pub fn owns(&self, container: &ContainerSummary) -> bool {
        container
            .labels
            .get(PREFIX_LABEL)
            .is_some_and(|owner| *owner == self.prefix)
    }

    fn join(&self, suffix: &str) -> String {
        format!("{}{NAME_SEPARATOR}{suffix}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    #[test]
    fn slugify_lowercases_and_collapses() {
        assert_eq!(slugify("Acme Corp").as_deref(), Some("acme-corp"));
        assert_eq!(slugify("  --Dev   Env!! ").as_deref(), Some("dev-env"));
        assert_eq!(slugify("acme").as_deref(), Some("acme"));
    }

    #[test]
    fn slugify_rejects_empty_results() {
        assert_eq!(slugify(""), None);
        assert_eq!(slugify("!!! ---"), None);
    }

    #[test]
    fn names_derive_from_prefix() {
        let names = StackNames::new(container_prefix("acme"));
        assert_eq!(names.prefix(), "site-acme");
        assert_eq!(names.container(ServiceKind::Db), "site-acme_db");
        assert_eq!(names.container(ServiceKind::ProxyDb), "site-acme_proxy-db");
        assert_eq!(names.network(), "site-acme_net");
        assert_eq!(
            names.volumes_for(ServiceKind::Proxy),
            vec!["site-acme_proxy-data", "site-acme_proxy-letsencrypt"]
        );
        assert_eq!(names.all_volumes().len(), 7);
    }

    fn all_names(names: &StackNames) -> BTreeSet<String> {
        ServiceKind::ALL
            .iter()
            .map(|service| names.container(*service))
            .chain(names.all_volumes())
            .chain([names.network()])
            .collect()
    }

    #[test]
    fn extended_slugs_never_share_names() {
        let acme = StackNames::new(container_prefix("acme"));
        for slug in ["acme-proxy", "acme-proxy-db", "acme-db", "acme-console"] {
            let other = StackNames::new(container_prefix(slug));
            let shared: Vec<_> = all_names(&acme)
                .intersection(&all_names(&other))
                .cloned()
                .collect();
            assert!(shared.is_empty(), "{slug}: {shared:?}");
        }
    }

    #[test]
    fn slugs_never_contain_the_separator() {
        assert_eq!(slugify("acme_proxy").as_deref(), Some("acme-proxy"));
        assert!(!container_prefix("a-b").contains(NAME_SEPARATOR));
    }

    #[test]
    fn ownership_follows_the_prefix_label() {
        let names = StackNames::new("site-acme");
        let summary = |owner: Option<&str>| ContainerSummary {
            id: "abc".into(),
            name: "site-acme_db".into(),
            state: "running".into(),
            published_ports: Vec::new(),
            labels: owner
                .map(|owner| BTreeMap::from([(PREFIX_LABEL.to_string(), owner.to_string())]))
                .unwrap_or_default(),
        };
        assert!(names.owns(&summary(Some("site-acme"))));
        assert!(!names.owns(&summary(Some("site-acme-proxy"))));
        assert!(!names.owns(&summary(None)));
    }

    #[test]
    fn every_stateful_service_has_a_volume() {
        let names = StackNames::new("site-x");
        for service in [
            ServiceKind::Db,
            ServiceKind::Cache,
            ServiceKind::ProxyDb,
        ] {
            assert!(!names.volumes_for(service).is_empty(), "{service}");
        }
    }
}
