//! Common test utilities and helpers

#![allow(dead_code)]

use fleetstor_api::storage::{PoolParams, StorageManager, StoragePool};
use fleetstor_api::Database;
use fleetstor_common::HardwarePoolId;
use std::sync::Arc;

/// Migrated in-memory database
pub async fn test_database() -> Arc<Database> {
    Arc::new(
        Database::in_memory()
            .await
            .expect("Failed to create in-memory database"),
    )
}

/// Storage manager over a fresh in-memory database
pub async fn test_manager() -> (StorageManager, Arc<Database>) {
    let db = test_database().await;
    (StorageManager::new(db.clone()), db)
}

pub fn iscsi_params(ip_addr: &str, target: &str) -> PoolParams {
    PoolParams {
        ip_addr: Some(ip_addr.to_string()),
        target: Some(target.to_string()),
        ..Default::default()
    }
}

pub fn iscsi_params_for(ip_addr: &str, target: &str, hardware_pool: &str) -> PoolParams {
    PoolParams {
        hardware_pool_id: Some(HardwarePoolId::new(hardware_pool)),
        ..iscsi_params(ip_addr, target)
    }
}

/// Provision an iSCSI pool and add volumes of the given sizes
pub async fn pool_with_volumes(manager: &StorageManager, sizes: &[u64]) -> StoragePool {
    let pool = manager
        .provision("iSCSI", iscsi_params("10.0.0.5", "iqn.2024-01.example:vol1"))
        .await
        .expect("Failed to provision pool");
    let pool_id = pool.id().unwrap().to_string();

    for (i, size) in sizes.iter().enumerate() {
        manager
            .add_volume(&pool_id, &format!("disk-{}", i), *size, Some(i as u32))
            .await
            .expect("Failed to add volume");
    }

    pool
}
