//! PostgreSQL-backed [`SiteStore`].
//!
//! Scalar columns mirror the record; ports, container ids and the deployment
//! config are stored as JSONB.

use std::{collections::BTreeMap, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sitefleet_core::{
    ServiceKind, SiteRecord, SiteStatus, SiteStore, StoreError,
    ports::PortAssignment, stack::DeploymentConfig,
};
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
    types::Json,
};
use tracing::info;
use uuid::Uuid;

use crate::MIGRATOR;

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, name, slug, domain, prefix, admin_email, status,
        ports, containers, error, config,
        created_at, updated_at, deployed_at
    FROM sites
"#;

#[derive(Debug, Clone)]
pub struct PostgresSiteStore {
    pool: PgPool,
}

impl PostgresSiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await?;
        info!("site store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<SiteRecord, StoreError> {
        let status: String = row.try_get("status").map_err(backend)?;
        let status = SiteStatus::from_str(&status).map_err(StoreError::Backend)?;
        let Json(ports): Json<PortAssignment> =
            row.try_get("ports").map_err(backend)?;
        let Json(containers): Json<BTreeMap<ServiceKind, String>> =
            row.try_get("containers").map_err(backend)?;
        let Json(config): Json<DeploymentConfig> =
            row.try_get("config").map_err(backend)?;
        let created_at: DateTime<Utc> =
            row.try_get("created_at").map_err(backend)?;
        let updated_at: DateTime<Utc> =
            row.try_get("updated_at").map_err(backend)?;
        let deployed_at: Option<DateTime<Utc>> =
            row.try_get("deployed_at").map_err(backend)?;

        Ok(SiteRecord {
            id: row.try_get("id").map_err(backend)?,
            name: row.try_get("name").map_err(backend)?,
            slug: row.try_get("slug").map_err(backend)?,
            domain: row.try_get("domain").map_err(backend)?,
            prefix: row.try_get("prefix").map_err(backend)?,
            admin_email: row.try_get("admin_email").map_err(backend)?,
            status,
            ports,
            containers,
            error: row.try_get("error").map_err(backend)?,
            config,
            created_at,
            updated_at,
            deployed_at,
        })
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl SiteStore for PostgresSiteStore {
    async fn insert(&self, record: &SiteRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sites (
                id, name, slug, domain, prefix, admin_email, status,
                ports, containers, error, config,
                created_at, updated_at, deployed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.slug)
        .bind(&record.domain)
        .bind(&record.prefix)
        .bind(&record.admin_email)
        .bind(record.status.as_str())
        .bind(Json(&record.ports))
        .bind(Json(&record.containers))
        .bind(&record.error)
        .bind(Json(&record.config))
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.deployed_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match err.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                StoreError::Conflict(record.prefix.clone())
            }
            _ => backend(err),
        })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SiteRecord>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<SiteRecord>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE prefix = $1"))
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list(&self) -> Result<Vec<SiteRecord>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn update(&self, record: &SiteRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sites SET
                name = $2,
                domain = $3,
                admin_email = $4,
                status = $5,
                ports = $6,
                containers = $7,
                error = $8,
                config = $9,
                updated_at = $10,
                deployed_at = $11
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.domain)
        .bind(&record.admin_email)
        .bind(record.status.as_str())
        .bind(Json(&record.ports))
        .bind(Json(&record.containers))
        .bind(&record.error)
        .bind(Json(&record.config))
        .bind(record.updated_at)
        .bind(record.deployed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM sites WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
