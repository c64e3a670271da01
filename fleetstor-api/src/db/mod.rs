///! Database layer using SQLite
///!
///! Persists storage pools, their volumes and the tasks recorded against them.

pub mod migrations;

use crate::storage::{StoragePool, StorageRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetstor_common::{Error, HardwarePoolId, Result, StorageTask, StorageVolume};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create parent directory if needed
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::InvalidConfig(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Database connection failed: {}", e)))?;

        tracing::info!("Database connection established");

        Ok(Self { pool })
    }

    /// Private in-memory database, already migrated
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::InvalidConfig(format!("Invalid database URL: {}", e)))?
            .foreign_keys(true);

        // Every connection to :memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Database connection failed: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database connection closed");
    }

    /// Close a database that may still have other handles
    pub async fn close_shared(database: Arc<Self>) {
        match Arc::try_unwrap(database) {
            Ok(database) => database.close().await,
            Err(database) => {
                tracing::warn!(
                    handles = Arc::strong_count(&database),
                    "Database still shared at shutdown, closing its pool directly"
                );
                database.pool.close().await;
            }
        }
    }
}

#[async_trait]
impl StorageRepository for Database {
    async fn create_pool(&self, pool: &StoragePool) -> Result<StoragePool> {
        storage_pools::create_pool(&self.pool, pool).await
    }

    async fn get_pool(&self, id: &str) -> Result<StoragePool> {
        storage_pools::get_pool(&self.pool, id).await
    }

    async fn list_pools(&self) -> Result<Vec<StoragePool>> {
        storage_pools::list_pools(&self.pool).await
    }

    async fn list_pools_for_hardware_pool(
        &self,
        hardware_pool_id: &HardwarePoolId,
    ) -> Result<Vec<StoragePool>> {
        storage_pools::list_pools_for_hardware_pool(&self.pool, hardware_pool_id).await
    }

    async fn update_pool(&self, pool: &StoragePool) -> Result<()> {
        storage_pools::update_pool(&self.pool, pool).await
    }

    async fn delete_pool_cascade(&self, id: &str) -> Result<u64> {
        storage_pools::delete_pool_cascade(&self.pool, id).await
    }

    async fn create_volume(&self, volume: &StorageVolume) -> Result<()> {
        storage_volumes::create_volume(&self.pool, volume).await
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        storage_volumes::delete_volume(&self.pool, id).await
    }

    async fn volumes_for_pool(&self, pool_id: &str) -> Result<Vec<StorageVolume>> {
        storage_volumes::volumes_for_pool(&self.pool, pool_id).await
    }

    async fn create_task(&self, task: &StorageTask) -> Result<()> {
        storage_tasks::create_task(&self.pool, task).await
    }

    async fn get_task(&self, id: &str) -> Result<StorageTask> {
        storage_tasks::get_task(&self.pool, id).await
    }

    async fn update_task(&self, task: &StorageTask) -> Result<()> {
        storage_tasks::update_task(&self.pool, task).await
    }

    async fn tasks_for_pool(&self, pool_id: &str) -> Result<Vec<StorageTask>> {
        storage_tasks::tasks_for_pool(&self.pool, pool_id).await
    }
}

fn from_timestamp(timestamp: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| Error::Storage(format!("Invalid timestamp: {}", timestamp)))
}

fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    use sqlx::Row;
    row.try_get(name)
        .map_err(|e| Error::Storage(format!("Failed to read column {}: {}", name, e)))
}

/// Storage pool database operations
pub mod storage_pools {
    use super::*;
    use crate::storage::{BackendRegistry, PoolParams};

    pub async fn create_pool(pool: &SqlitePool, storage_pool: &StoragePool) -> Result<StoragePool> {
        let mut saved = storage_pool.clone();
        if !saved.is_persisted() {
            saved.set_id(uuid::Uuid::new_v4().to_string());
        }
        let id = saved.id()?.to_string();
        let now = Utc::now().timestamp();

        crate::log_db_operation!("insert", "storage_pools", &id);

        sqlx::query(
            "INSERT INTO storage_pools (id, hardware_pool_id, storage_type, ip_addr, port, target,
             created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(saved.hardware_pool_id().map(|hw| hw.as_str()))
        .bind(saved.type_label())
        .bind(saved.ip_addr())
        .bind(saved.backend().port().map(i64::from))
        .bind(saved.target())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create storage pool: {}", e)))?;

        Ok(saved)
    }

    pub async fn get_pool(pool: &SqlitePool, id: &str) -> Result<StoragePool> {
        let row = sqlx::query("SELECT * FROM storage_pools WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to load storage pool: {}", e)))?
            .ok_or_else(|| Error::StoragePoolNotFound(id.to_string()))?;

        row_to_pool(&row)
    }

    pub async fn list_pools(pool: &SqlitePool) -> Result<Vec<StoragePool>> {
        let rows = sqlx::query("SELECT * FROM storage_pools ORDER BY created_at, rowid")
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list storage pools: {}", e)))?;

        rows.iter().map(row_to_pool).collect()
    }

    pub async fn list_pools_for_hardware_pool(
        pool: &SqlitePool,
        hardware_pool_id: &HardwarePoolId,
    ) -> Result<Vec<StoragePool>> {
        let rows = sqlx::query(
            "SELECT * FROM storage_pools WHERE hardware_pool_id = ? ORDER BY created_at, rowid"
        )
        .bind(hardware_pool_id.as_str())
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to list storage pools: {}", e)))?;

        rows.iter().map(row_to_pool).collect()
    }

    pub async fn update_pool(pool: &SqlitePool, storage_pool: &StoragePool) -> Result<()> {
        let id = storage_pool.id()?;

        crate::log_db_operation!("update", "storage_pools", id);

        let result = sqlx::query(
            "UPDATE storage_pools SET hardware_pool_id = ?, storage_type = ?, ip_addr = ?,
             port = ?, target = ?, updated_at = ?
             WHERE id = ?"
        )
        .bind(storage_pool.hardware_pool_id().map(|hw| hw.as_str()))
        .bind(storage_pool.type_label())
        .bind(storage_pool.ip_addr())
        .bind(storage_pool.backend().port().map(i64::from))
        .bind(storage_pool.target())
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to update storage pool: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::StoragePoolNotFound(id.to_string()));
        }

        Ok(())
    }

    /// Delete the pool's volumes and then the pool in one transaction.
    /// Tasks are left alone.
    pub async fn delete_pool_cascade(pool: &SqlitePool, id: &str) -> Result<u64> {
        let cascade_error = |e: sqlx::Error| Error::CascadeDeletion {
            pool_id: id.to_string(),
            reason: e.to_string(),
        };

        crate::log_db_operation!("delete", "storage_pools", id);

        // Rolled back on drop unless committed
        let mut tx = pool.begin().await.map_err(cascade_error)?;

        let volumes = sqlx::query("DELETE FROM storage_volumes WHERE storage_pool_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(cascade_error)?;

        let result = sqlx::query("DELETE FROM storage_pools WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(cascade_error)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(cascade_error)?;
            return Err(Error::StoragePoolNotFound(id.to_string()));
        }

        tx.commit().await.map_err(cascade_error)?;

        Ok(volumes.rows_affected())
    }

    /// Rebuild a pool through the registry so stored rows obey the same rules as new pools
    fn row_to_pool(row: &sqlx::sqlite::SqliteRow) -> Result<StoragePool> {
        let id: String = column(row, "id")?;
        let storage_type: String = column(row, "storage_type")?;
        let port: Option<i64> = column(row, "port")?;
        let hardware_pool_id: Option<String> = column(row, "hardware_pool_id")?;

        let port = port
            .map(|p| {
                u16::try_from(p).map_err(|_| {
                    Error::Storage(format!("Storage pool {} has invalid port {}", id, p))
                })
            })
            .transpose()?;

        let params = PoolParams {
            ip_addr: Some(column(row, "ip_addr")?),
            target: Some(column(row, "target")?),
            port,
            hardware_pool_id: hardware_pool_id.map(HardwarePoolId),
        };

        let mut storage_pool = BackendRegistry::global()
            .factory(&storage_type, &params)
            .ok_or_else(|| {
                Error::Storage(format!(
                    "Storage pool {} has unregistered storage type {}",
                    id, storage_type
                ))
            })?;
        storage_pool.set_id(id);

        Ok(storage_pool)
    }
}

/// Storage volume database operations
pub mod storage_volumes {
    use super::*;

    pub async fn create_volume(pool: &SqlitePool, volume: &StorageVolume) -> Result<()> {
        let size = i64::try_from(volume.size_in_gb).map_err(|_| {
            Error::Validation(format!("Volume size {}GB is out of range", volume.size_in_gb))
        })?;

        crate::log_db_operation!("insert", "storage_volumes", &volume.id);

        sqlx::query(
            "INSERT INTO storage_volumes (id, storage_pool_id, name, lun, size_in_gb, created_at)
             VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&volume.id)
        .bind(&volume.storage_pool_id)
        .bind(&volume.name)
        .bind(volume.lun.map(i64::from))
        .bind(size)
        .bind(volume.created_at.timestamp())
        .execute(pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create storage volume: {}", e)))?;

        Ok(())
    }

    pub async fn delete_volume(pool: &SqlitePool, id: &str) -> Result<()> {
        crate::log_db_operation!("delete", "storage_volumes", id);

        let result = sqlx::query("DELETE FROM storage_volumes WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete storage volume: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::StorageVolumeNotFound(id.to_string()));
        }

        Ok(())
    }

    pub async fn volumes_for_pool(pool: &SqlitePool, pool_id: &str) -> Result<Vec<StorageVolume>> {
        let rows = sqlx::query("SELECT * FROM storage_volumes WHERE storage_pool_id = ?")
            .bind(pool_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list storage volumes: {}", e)))?;

        rows.iter().map(row_to_volume).collect()
    }

    fn row_to_volume(row: &sqlx::sqlite::SqliteRow) -> Result<StorageVolume> {
        let id: String = column(row, "id")?;
        let size: i64 = column(row, "size_in_gb")?;
        let lun: Option<i64> = column(row, "lun")?;

        let size_in_gb = u64::try_from(size).map_err(|_| {
            Error::Storage(format!("Storage volume {} has negative size {}", id, size))
        })?;
        let lun = lun
            .map(|l| {
                u32::try_from(l).map_err(|_| {
                    Error::Storage(format!("Storage volume {} has invalid LUN {}", id, l))
                })
            })
            .transpose()?;

        Ok(StorageVolume {
            storage_pool_id: column(row, "storage_pool_id")?,
            name: column(row, "name")?,
            lun,
            size_in_gb,
            created_at: from_timestamp(column(row, "created_at")?)?,
            id,
        })
    }
}

/// Storage task database operations
pub mod storage_tasks {
    use super::*;
    use fleetstor_common::{TaskAction, TaskState};

    pub async fn create_task(pool: &SqlitePool, task: &StorageTask) -> Result<()> {
        crate::log_db_operation!("insert", "storage_tasks", &task.id);

        sqlx::query(
            "INSERT INTO storage_tasks (id, storage_pool_id, action, state, args, message,
             created_at, time_started, time_ended)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&task.id)
        .bind(&task.storage_pool_id)
        .bind(task.action.as_str())
        .bind(task.state.as_str())
        .bind(&task.args)
        .bind(&task.message)
        .bind(task.created_at.timestamp())
        .bind(task.time_started.map(|t| t.timestamp()))
        .bind(task.time_ended.map(|t| t.timestamp()))
        .execute(pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create storage task: {}", e)))?;

        Ok(())
    }

    pub async fn get_task(pool: &SqlitePool, id: &str) -> Result<StorageTask> {
        let row = sqlx::query("SELECT * FROM storage_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to load storage task: {}", e)))?
            .ok_or_else(|| Error::StorageTaskNotFound(id.to_string()))?;

        row_to_task(&row)
    }

    pub async fn update_task(pool: &SqlitePool, task: &StorageTask) -> Result<()> {
        crate::log_db_operation!("update", "storage_tasks", &task.id);

        let result = sqlx::query(
            "UPDATE storage_tasks SET state = ?, args = ?, message = ?, time_started = ?,
             time_ended = ?
             WHERE id = ?"
        )
        .bind(task.state.as_str())
        .bind(&task.args)
        .bind(&task.message)
        .bind(task.time_started.map(|t| t.timestamp()))
        .bind(task.time_ended.map(|t| t.timestamp()))
        .bind(&task.id)
        .execute(pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to update storage task: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::StorageTaskNotFound(task.id.clone()));
        }

        Ok(())
    }

    /// Tasks for a pool id in insertion order
    pub async fn tasks_for_pool(pool: &SqlitePool, pool_id: &str) -> Result<Vec<StorageTask>> {
        let rows = sqlx::query("SELECT * FROM storage_tasks WHERE storage_pool_id = ? ORDER BY rowid")
            .bind(pool_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to list storage tasks: {}", e)))?;

        rows.iter().map(row_to_task).collect()
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<StorageTask> {
        let action: String = column(row, "action")?;
        let state: String = column(row, "state")?;
        let time_started: Option<i64> = column(row, "time_started")?;
        let time_ended: Option<i64> = column(row, "time_ended")?;

        Ok(StorageTask {
            id: column(row, "id")?,
            storage_pool_id: column(row, "storage_pool_id")?,
            action: TaskAction::from_str(&action)?,
            state: TaskState::from_str(&state)?,
            args: column(row, "args")?,
            message: column(row, "message")?,
            created_at: from_timestamp(column(row, "created_at")?)?,
            time_started: time_started.map(from_timestamp).transpose()?,
            time_ended: time_ended.map(from_timestamp).transpose()?,
        })
    }
}
