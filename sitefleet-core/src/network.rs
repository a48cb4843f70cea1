use tracing::{debug, info};

use crate::{engine::ContainerEngine, error::Result};

/// Create the network `name` unless it already exists.
///
/// Returns `true` when a network was created.
pub async fn ensure_network(
    engine: &dyn ContainerEngine,
    name: &str,
    driver: &str,
) -> Result<bool> {
    let existing = engine.list_networks().await?;
    if existing.iter().any(|n| n == name) {
        debug!(network = %name, "network already present");
        return Ok(false);
    }
    engine.create_network(name, driver).await?;
    info!(network = %name, driver = %driver, "created tenant network");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::InMemoryEngine;

    #[tokio::test]
    async fn ensure_network_is_idempotent() {
        let engine = InMemoryEngine::new();
        assert!(ensure_network(&engine, "site-acme_net", "bridge").await.unwrap());
        assert!(!ensure_network(&engine, "site-acme_net", "bridge").await.unwrap());
        assert_eq!(engine.network_names(), vec!["site-acme_net"]);
    }
}
