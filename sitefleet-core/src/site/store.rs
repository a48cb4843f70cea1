//! Persistence port for site records.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use super::SiteRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("site {0} not found")]
    NotFound(Uuid),

    #[error("a site with prefix {0} already exists")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn insert(&self, record: &SiteRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<SiteRecord>, StoreError>;

    async fn find_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<SiteRecord>, StoreError>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<SiteRecord>, StoreError>;

    /// Replace an existing record.
    async fn update(&self, record: &SiteRecord) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySiteStore {
    records: RwLock<HashMap<Uuid, SiteRecord>>,
}

impl InMemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiteStore for InMemorySiteStore {
    async fn insert(&self, record: &SiteRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.values().any(|r| r.prefix == record.prefix) {
            return Err(StoreError::Conflict(record.prefix.clone()));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SiteRecord>, StoreError> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn find_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<SiteRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.prefix == prefix)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<SiteRecord>, StoreError> {
        let mut records: Vec<SiteRecord> =
            self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn update(&self, record: &SiteRecord) -> Result<(), StoreError> {
        match self.records.write().get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.records
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::DeploymentConfig;

    fn record(name: &str) -> SiteRecord {
        SiteRecord::new(
            DeploymentConfig::generate(name, "x.test", "ops@x.test").unwrap(),
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_prefix() {
        let store = InMemorySiteStore::new();
        store.insert(&record("Acme")).await.unwrap();
        let err = store.insert(&record("acme")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(p) if p == "site-acme"));
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = InMemorySiteStore::new();
        let mut site = record("acme");
        store.insert(&site).await.unwrap();

        site.error = Some("boom".into());
        store.update(&site).await.unwrap();
        let loaded = store.get(site.id).await.unwrap().unwrap();
        assert_eq!(loaded.error.as_deref(), Some("boom"));
        assert_eq!(
            store.find_by_prefix("site-acme").await.unwrap().map(|r| r.id),
            Some(site.id)
        );

        store.delete(site.id).await.unwrap();
        assert!(store.get(site.id).await.unwrap().is_none());
        assert!(matches!(
            store.update(&site).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
