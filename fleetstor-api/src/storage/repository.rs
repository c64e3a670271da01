//! Persistence seam for storage pools, volumes and tasks

use super::StoragePool;
use async_trait::async_trait;
use fleetstor_common::{HardwarePoolId, Result, StorageTask, StorageVolume};

/// Persistence collaborator used by the storage model.
///
/// Volumes are owned by their pool and go away with it; tasks only reference
/// their pool by id and must outlive it.
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// Insert a pool, assigning an id if it has none. Returns the saved pool.
    async fn create_pool(&self, pool: &StoragePool) -> Result<StoragePool>;

    async fn get_pool(&self, id: &str) -> Result<StoragePool>;

    async fn list_pools(&self) -> Result<Vec<StoragePool>>;

    async fn list_pools_for_hardware_pool(
        &self,
        hardware_pool_id: &HardwarePoolId,
    ) -> Result<Vec<StoragePool>>;

    async fn update_pool(&self, pool: &StoragePool) -> Result<()>;

    /// Delete a pool and every volume it owns as one unit.
    ///
    /// Either both the pool and its volumes are gone afterwards or nothing changed.
    /// Returns the number of volumes removed.
    async fn delete_pool_cascade(&self, id: &str) -> Result<u64>;

    async fn create_volume(&self, volume: &StorageVolume) -> Result<()>;

    async fn delete_volume(&self, id: &str) -> Result<()>;

    /// Current volumes of a pool, no ordering guarantee
    async fn volumes_for_pool(&self, pool_id: &str) -> Result<Vec<StorageVolume>>;

    async fn create_task(&self, task: &StorageTask) -> Result<()>;

    async fn get_task(&self, id: &str) -> Result<StorageTask>;

    async fn update_task(&self, task: &StorageTask) -> Result<()>;

    /// Tasks referencing a pool id, whether or not the pool still exists
    async fn tasks_for_pool(&self, pool_id: &str) -> Result<Vec<StorageTask>>;
}
