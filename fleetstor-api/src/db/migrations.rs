///! Database migrations

use fleetstor_common::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create migrations table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )"
    )
    .execute(pool)
    .await
    .map_err(|e| fleetstor_common::Error::Storage(format!("Failed to create migrations table: {}", e)))?;

    // Run migrations in order
    run_migration(pool, "001_create_storage_pools_table", MIGRATION_001_CREATE_STORAGE_POOLS).await?;
    run_migration(pool, "002_create_storage_volumes_table", MIGRATION_002_CREATE_STORAGE_VOLUMES).await?;
    run_migration(pool, "003_create_storage_tasks_table", MIGRATION_003_CREATE_STORAGE_TASKS).await?;

    Ok(())
}

async fn run_migration(pool: &SqlitePool, name: &str, sql: &str) -> Result<()> {
    use sqlx::Row;

    // Check if migration already ran
    let row = sqlx::query("SELECT COUNT(*) as count FROM migrations WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| fleetstor_common::Error::Storage(format!("Migration check failed: {}", e)))?;

    let count: i64 = row.get("count");
    if count > 0 {
        tracing::debug!("Migration {} already applied", name);
        return Ok(());
    }

    tracing::info!("Running migration: {}", name);

    // Schema change and bookkeeping row land together
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| fleetstor_common::Error::Storage(format!("Migration {} failed: {}", name, e)))?;

    sqlx::raw_sql(sql)
        .execute(&mut *tx)
        .await
        .map_err(|e| fleetstor_common::Error::Storage(format!("Migration {} failed: {}", name, e)))?;

    sqlx::query("INSERT INTO migrations (name) VALUES (?)")
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(|e| fleetstor_common::Error::Storage(format!("Failed to record migration: {}", e)))?;

    tx.commit()
        .await
        .map_err(|e| fleetstor_common::Error::Storage(format!("Migration {} failed: {}", name, e)))?;

    tracing::info!("Migration {} completed", name);

    Ok(())
}

// storage_type holds the registry label ("iSCSI"), not the Rust variant name
const MIGRATION_001_CREATE_STORAGE_POOLS: &str = "
CREATE TABLE storage_pools (
    id TEXT PRIMARY KEY,
    hardware_pool_id TEXT,
    storage_type TEXT NOT NULL,
    ip_addr TEXT NOT NULL,
    port INTEGER,
    target TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX idx_storage_pools_hardware_pool ON storage_pools(hardware_pool_id);
CREATE INDEX idx_storage_pools_type ON storage_pools(storage_type);
";

const MIGRATION_002_CREATE_STORAGE_VOLUMES: &str = "
CREATE TABLE storage_volumes (
    id TEXT PRIMARY KEY,
    storage_pool_id TEXT NOT NULL,
    name TEXT NOT NULL,
    lun INTEGER,
    size_in_gb INTEGER NOT NULL CHECK (size_in_gb >= 0),
    created_at INTEGER NOT NULL,
    FOREIGN KEY (storage_pool_id) REFERENCES storage_pools(id) ON DELETE CASCADE
);

CREATE INDEX idx_storage_volumes_pool ON storage_volumes(storage_pool_id);
";

// No foreign key: tasks are audit records and outlive their pool
const MIGRATION_003_CREATE_STORAGE_TASKS: &str = "
CREATE TABLE storage_tasks (
    id TEXT PRIMARY KEY,
    storage_pool_id TEXT NOT NULL,
    action TEXT NOT NULL,
    state TEXT NOT NULL,
    args TEXT,
    message TEXT,
    created_at INTEGER NOT NULL,
    time_started INTEGER,
    time_ended INTEGER
);

CREATE INDEX idx_storage_tasks_pool ON storage_tasks(storage_pool_id);
CREATE INDEX idx_storage_tasks_state ON storage_tasks(state);
";
