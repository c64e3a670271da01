use anyhow::Context;
use fleetstor_api::config::FleetstorConfig;
use fleetstor_api::storage::StorageManager;
use fleetstor_api::{logging, BackendRegistry, Database};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = FleetstorConfig::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let _log_guard = logging::init(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    info!("Configuration loaded successfully");
    info!(
        storage_types = ?BackendRegistry::global().labels(),
        "Storage backends registered"
    );

    // Initialize database
    let database = Arc::new(
        Database::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to database")?,
    );
    database.migrate().await.context("Failed to run migrations")?;
    info!("Database initialized");

    let storage = StorageManager::with_settings(database.clone(), config.storage.settings());

    // Inventory of what is already provisioned
    let pools = storage.list_pools().await.context("Failed to list storage pools")?;
    info!(count = pools.len(), "Storage pools loaded");

    for pool in &pools {
        let Ok(id) = pool.id() else { continue };
        match storage.pool_summary(id).await {
            Ok(summary) => info!(
                pool_id = %summary.id,
                display_name = %summary.display_name,
                volumes = summary.volume_count,
                total_gb = %summary.total_volume_size_gb,
                active_tasks = summary.active_task_count,
                "Storage pool"
            ),
            Err(e) => error!(pool_id = %id, "Failed to summarize storage pool: {}", e),
        }
    }

    drop(storage);
    Database::close_shared(database).await;

    Ok(())
}
