use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use wag_common::{GatewayError, InstanceStatus, Result, ids::generate_instance_hash};

use crate::{
    instance::{Instance, InstanceStats, InstanceUpdate, ListFilter, RegisterInput},
    port_allocator::PortAllocator,
};

/// Internal row type for sqlx mapping. Kept separate from [`Instance`] so the
/// `status` column's raw string never leaks past this module.
#[derive(sqlx::FromRow)]
struct InstanceRow {
    hash: String,
    phone_number: String,
    name: Option<String>,
    status: String,
    container_id: Option<String>,
    container_port: Option<i64>,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    status_webhook_url: Option<String>,
    status_webhook_secret: Option<String>,
    created_at: i64,
    updated_at: i64,
    last_seen: Option<i64>,
}

impl TryFrom<InstanceRow> for Instance {
    type Error = GatewayError;

    fn try_from(r: InstanceRow) -> Result<Self> {
        let status = InstanceStatus::parse(&r.status)
            .ok_or_else(|| GatewayError::internal(format!("unknown status {}", r.status)))?;
        Ok(Self {
            hash: r.hash,
            phone_number: r.phone_number,
            name: r.name,
            status,
            container_id: r.container_id,
            port: r.container_port.map(|p| p as u16),
            webhook_url: r.webhook_url,
            webhook_secret: r.webhook_secret,
            status_webhook_url: r.status_webhook_url,
            status_webhook_secret: r.status_webhook_secret,
            created_at: from_epoch(r.created_at),
            updated_at: from_epoch(r.updated_at),
            last_seen: r.last_seen.map(from_epoch),
        })
    }
}

fn from_epoch(secs: i64) -> chrono::DateTime<Utc> {
    chrono::DateTime::from_timestamp(secs, 0).unwrap_or(chrono::DateTime::UNIX_EPOCH)
}

/// SQLite-backed instance store. Pairs with a [`PortAllocator`] so that
/// `register` can roll back its port reservation if the insert fails.
pub struct SqliteInstanceStore {
    pool: SqlitePool,
    ports: Arc<PortAllocator>,
}

impl SqliteInstanceStore {
    #[must_use]
    pub fn new(pool: SqlitePool, ports: Arc<PortAllocator>) -> Self {
        Self { pool, ports }
    }

    /// Create the `instance` table schema.
    ///
    /// Retained for tests and for standalone deployments that don't run a
    /// separate migration step; production deployments manage this table
    /// with `sqlx migrate`.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS instance (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                hash                  TEXT    NOT NULL UNIQUE,
                phone_number          TEXT    NOT NULL UNIQUE,
                name                  TEXT,
                status                TEXT    NOT NULL,
                container_id          TEXT,
                container_port        INTEGER,
                webhook_url           TEXT,
                webhook_secret        TEXT,
                status_webhook_url    TEXT,
                status_webhook_secret TEXT,
                created_at            INTEGER NOT NULL,
                updated_at            INTEGER NOT NULL,
                last_seen             INTEGER,
                retry_count           INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Seed a [`PortAllocator`] from every instance that currently holds a
    /// port. Call once at startup before the allocator is used elsewhere.
    pub async fn seed_port_allocator(&self) -> Result<()> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT container_port FROM instance WHERE container_port IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        self.ports.seed(rows.into_iter().map(|(p,)| p as u16));
        Ok(())
    }

    pub async fn register(&self, input: RegisterInput) -> Result<Instance> {
        if self.find_by_phone(&input.phone_number).await?.is_some() {
            return Err(GatewayError::InstanceAlreadyExists);
        }

        let port = self.ports.allocate()?;
        let hash = generate_instance_hash();
        let now = Utc::now().timestamp();

        let insert = sqlx::query(
            r#"INSERT INTO instance
                 (hash, phone_number, name, status, container_port,
                  webhook_url, webhook_secret, status_webhook_url, status_webhook_secret,
                  created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&hash)
        .bind(&input.phone_number)
        .bind(&input.name)
        .bind(InstanceStatus::Registered.as_str())
        .bind(i64::from(port))
        .bind(&input.webhook_url)
        .bind(&input.webhook_secret)
        .bind(&input.status_webhook_url)
        .bind(&input.status_webhook_secret)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        if let Err(err) = insert {
            // Roll back the port reservation: the instance never came into being.
            self.ports.release(port);
            return Err(err.into());
        }

        self.find_by_hash(&hash)
            .await?
            .ok_or_else(|| GatewayError::internal("instance vanished immediately after insert"))
    }

    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<Instance>> {
        let row = sqlx::query_as::<_, InstanceRow>("SELECT * FROM instance WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Instance>> {
        let row = sqlx::query_as::<_, InstanceRow>("SELECT * FROM instance WHERE phone_number = ?")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<Instance>> {
        let limit = filter.limit.min(100).max(1);
        let rows = if let Some(status) = filter.status {
            sqlx::query_as::<_, InstanceRow>(
                "SELECT * FROM instance WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(status.as_str())
            .bind(i64::from(limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, InstanceRow>(
                "SELECT * FROM instance ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(i64::from(limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn update(&self, hash: &str, update: InstanceUpdate) -> Result<Instance> {
        let Some(current) = self.find_by_hash(hash).await? else {
            return Err(GatewayError::InstanceNotFound);
        };

        let status = update.status.unwrap_or(current.status);
        let name = update.name.unwrap_or(current.name);
        let container_id = update.container_id.unwrap_or(current.container_id);
        let port = update.port.unwrap_or(current.port);
        let webhook_url = update.webhook_url.unwrap_or(current.webhook_url);
        let webhook_secret = update.webhook_secret.unwrap_or(current.webhook_secret);
        let status_webhook_url = update
            .status_webhook_url
            .unwrap_or(current.status_webhook_url);
        let status_webhook_secret = update
            .status_webhook_secret
            .unwrap_or(current.status_webhook_secret);
        let last_seen = update.last_seen.or(current.last_seen);
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"UPDATE instance SET
                 status = ?, name = ?, container_id = ?, container_port = ?,
                 webhook_url = ?, webhook_secret = ?,
                 status_webhook_url = ?, status_webhook_secret = ?,
                 last_seen = ?, updated_at = ?
               WHERE hash = ?"#,
        )
        .bind(status.as_str())
        .bind(&name)
        .bind(&container_id)
        .bind(port.map(i64::from))
        .bind(&webhook_url)
        .bind(&webhook_secret)
        .bind(&status_webhook_url)
        .bind(&status_webhook_secret)
        .bind(last_seen.map(|ts| ts.timestamp()))
        .bind(now)
        .bind(hash)
        .execute(&self.pool)
        .await?;

        self.find_by_hash(hash)
            .await?
            .ok_or(GatewayError::InstanceNotFound)
    }

    pub async fn delete(&self, hash: &str) -> Result<bool> {
        let existing = self.find_by_hash(hash).await?;
        let result = sqlx::query("DELETE FROM instance WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;

        if let Some(instance) = existing
            && let Some(port) = instance.port
        {
            self.ports.release(port);
        }

        Ok(result.rows_affected() > 0)
    }

    /// List every instance, ignoring the public API's page-size cap. Used
    /// internally by startup recovery and port allocator seeding, never
    /// exposed over HTTP.
    pub async fn list_all(&self) -> Result<Vec<Instance>> {
        const PAGE: u32 = 500;
        let mut out = Vec::new();
        let mut offset = 0u32;
        loop {
            let rows = sqlx::query_as::<_, InstanceRow>(
                "SELECT * FROM instance ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(i64::from(PAGE))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
            let got = rows.len() as u32;
            for row in rows {
                out.push(row.try_into()?);
            }
            if got < PAGE {
                break;
            }
            offset += PAGE;
        }
        Ok(out)
    }

    pub async fn stats(&self) -> Result<InstanceStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM instance GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let mut total = 0u64;
        let mut by_status = Vec::with_capacity(rows.len());
        for (status, count) in rows {
            if let Some(status) = InstanceStatus::parse(&status) {
                total += count as u64;
                by_status.push((status, count as u64));
            }
        }
        Ok(InstanceStats { total, by_status })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteInstanceStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteInstanceStore::init(&pool).await.unwrap();
        let ports = Arc::new(PortAllocator::new(8000, 100));
        SqliteInstanceStore::new(pool, ports)
    }

    fn register(phone: &str) -> RegisterInput {
        RegisterInput {
            phone_number: phone.to_string(),
            name: None,
            webhook_url: None,
            webhook_secret: None,
            status_webhook_url: None,
            status_webhook_secret: None,
        }
    }

    #[tokio::test]
    async fn register_then_find_by_hash_round_trips() {
        let store = test_store().await;
        let created = store.register(register("5511999999999")).await.unwrap();
        assert_eq!(created.status, InstanceStatus::Registered);
        assert!(created.port >= Some(8000));

        let found = store.find_by_hash(&created.hash).await.unwrap().unwrap();
        assert_eq!(found.hash, created.hash);
        assert_eq!(found.port, created.port);
    }

    #[tokio::test]
    async fn register_duplicate_phone_conflicts() {
        let store = test_store().await;
        store.register(register("5511999999999")).await.unwrap();
        let err = store.register(register("5511999999999")).await.unwrap_err();
        assert!(matches!(err, GatewayError::InstanceAlreadyExists));
    }

    #[tokio::test]
    async fn register_failure_releases_the_port() {
        let store = test_store().await;
        let allocated_before = store.ports.allocated_count();
        // Force a duplicate-phone failure path by registering then re-using the
        // same phone through the allocator directly isn't possible here, but we
        // can assert the allocator's count only grows by one per success.
        let created = store.register(register("1")).await.unwrap();
        assert_eq!(store.ports.allocated_count(), allocated_before + 1);
        store.delete(&created.hash).await.unwrap();
        assert_eq!(store.ports.allocated_count(), allocated_before);
    }

    #[tokio::test]
    async fn update_rejects_nothing_and_refreshes_updated_at() {
        let store = test_store().await;
        let created = store.register(register("2")).await.unwrap();
        let updated = store
            .update(
                &created.hash,
                InstanceUpdate {
                    status: Some(InstanceStatus::Active),
                    container_id: Some(Some("1234".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, InstanceStatus::Active);
        assert_eq!(updated.container_id.as_deref(), Some("1234"));
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn delete_returns_whether_a_row_was_removed() {
        let store = test_store().await;
        let created = store.register(register("3")).await.unwrap();
        assert!(store.delete(&created.hash).await.unwrap());
        assert!(!store.delete(&created.hash).await.unwrap());
    }

    #[tokio::test]
    async fn list_orders_by_created_at_descending() {
        let store = test_store().await;
        store.register(register("a")).await.unwrap();
        store.register(register("b")).await.unwrap();
        let all = store
            .list(ListFilter {
                status: None,
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].phone_number, "b");
    }

    #[tokio::test]
    async fn stats_counts_by_status() {
        let store = test_store().await;
        store.register(register("a")).await.unwrap();
        let created = store.register(register("b")).await.unwrap();
        store
            .update(
                &created.hash,
                InstanceUpdate {
                    status: Some(InstanceStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert!(
            stats
                .by_status
                .contains(&(InstanceStatus::Registered, 1))
        );
        assert!(stats.by_status.contains(&(InstanceStatus::Active, 1)));
    }
}
