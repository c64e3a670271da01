///! Storage pool management
///! A storage pool is attached to a hardware pool, backed by one storage protocol,
///! owns the volumes carved out of it and is referenced by the tasks run against it.

pub mod iscsi;
pub mod registry;
pub mod repository;

pub use iscsi::{IscsiStoragePool, IscsiTarget};
pub use registry::{factory, type_label_of, BackendKind, BackendRegistry};
pub use repository::StorageRepository;

use chrono::Utc;
use fleetstor_common::{
    Error, HardwarePoolId, Result, StorageTask, StorageVolume, TaskAction, TaskState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::validation;

/// Backend-specific provisioning parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    pub ip_addr: Option<String>,
    pub target: Option<String>,
    pub port: Option<u16>,
    pub hardware_pool_id: Option<HardwarePoolId>,
}

/// Variant payload of a storage pool, one per registered backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PoolBackend {
    Iscsi(IscsiStoragePool),
}

impl PoolBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            PoolBackend::Iscsi(_) => BackendKind::Iscsi,
        }
    }

    pub fn ip_addr(&self) -> &str {
        match self {
            PoolBackend::Iscsi(pool) => &pool.ip_addr,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            PoolBackend::Iscsi(pool) => &pool.target,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            PoolBackend::Iscsi(pool) => Some(pool.port),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            PoolBackend::Iscsi(pool) => pool.validate(),
        }
    }
}

/// Storage pool record.
///
/// Only `BackendRegistry::factory` creates these, so the backend is always registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoragePool {
    id: Option<String>,
    hardware_pool_id: Option<HardwarePoolId>,
    backend: PoolBackend,
}

impl StoragePool {
    pub(crate) fn new(backend: PoolBackend, hardware_pool_id: Option<HardwarePoolId>) -> Self {
        Self {
            id: None,
            hardware_pool_id,
            backend,
        }
    }

    /// Persisted id, or `UnsavedStoragePool` for a pool fresh out of the factory
    pub fn id(&self) -> Result<&str> {
        self.id.as_deref().ok_or(Error::UnsavedStoragePool)
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn hardware_pool_id(&self) -> Option<&HardwarePoolId> {
        self.hardware_pool_id.as_ref()
    }

    pub fn backend(&self) -> &PoolBackend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut PoolBackend {
        &mut self.backend
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn ip_addr(&self) -> &str {
        self.backend.ip_addr()
    }

    pub fn target(&self) -> &str {
        self.backend.target()
    }

    pub fn type_label(&self) -> &'static str {
        type_label_of(self)
    }

    /// Type label, address and target, e.g. `iSCSI10.0.0.5:iqn.2024-01.example:vol1`.
    ///
    /// There is no separator between label and address; existing consumers match on it.
    pub fn display_name(&self) -> String {
        format!("{}{}:{}", self.type_label(), self.ip_addr(), self.target())
    }

    pub fn validate(&self) -> Result<()> {
        self.backend.validate()
    }

    /// Sum of the sizes of the volumes currently stored for this pool.
    ///
    /// Volumes are fetched from the repository on every call.
    pub async fn total_volume_size_gb<R>(&self, repo: &R) -> Result<u128>
    where
        R: StorageRepository + ?Sized,
    {
        let volumes = repo.volumes_for_pool(self.id()?).await?;
        Ok(total_size_gb(&volumes))
    }

    /// Tasks recorded against this pool, in repository order
    pub async fn tasks<R>(&self, repo: &R) -> Result<Vec<StorageTask>>
    where
        R: StorageRepository + ?Sized,
    {
        repo.tasks_for_pool(self.id()?).await
    }
}

/// Sum of `size_in_gb` across volumes.
///
/// Summed as `u128`: each size fits in `i64`, so the total cannot overflow.
pub fn total_size_gb(volumes: &[StorageVolume]) -> u128 {
    volumes.iter().map(|volume| u128::from(volume.size_in_gb)).sum()
}

/// Capacity and activity overview of a pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSummary {
    pub id: String,
    pub display_name: String,
    pub storage_type: String,
    pub hardware_pool_id: Option<HardwarePoolId>,
    pub volume_count: usize,
    pub total_volume_size_gb: u128,
    pub task_count: usize,
    pub active_task_count: usize,
}

/// Provisioning settings applied by the manager
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Port used when provisioning params omit one
    pub default_port: u16,
    /// Largest volume accepted, in GB (0 = unlimited)
    pub max_volume_size_gb: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            default_port: IscsiStoragePool::DEFAULT_PORT,
            max_volume_size_gb: 0,
        }
    }
}

/// Storage manager
pub struct StorageManager {
    repo: Arc<dyn StorageRepository>,
    registry: &'static BackendRegistry,
    settings: StorageSettings,
}

impl StorageManager {
    pub fn new(repo: Arc<dyn StorageRepository>) -> Self {
        Self::with_settings(repo, StorageSettings::default())
    }

    pub fn with_settings(repo: Arc<dyn StorageRepository>, settings: StorageSettings) -> Self {
        Self {
            repo,
            registry: BackendRegistry::global(),
            settings,
        }
    }

    /// Build, validate and persist a pool of the given storage type
    #[instrument(skip_all, fields(storage_type = %storage_type))]
    pub async fn provision(&self, storage_type: &str, params: PoolParams) -> Result<StoragePool> {
        let mut params = params;
        if params.port.is_none() {
            params.port = Some(self.settings.default_port);
        }

        let pool = self.registry.factory(storage_type, &params).ok_or_else(|| {
            Error::UnsupportedStorageType(format!(
                "{} (supported: {})",
                storage_type,
                self.registry.labels().join(", ")
            ))
        })?;

        pool.validate()?;

        let pool = self.repo.create_pool(&pool).await?;
        info!(
            pool_id = pool.id().unwrap_or_default(),
            display_name = %pool.display_name(),
            "Storage pool provisioned"
        );

        Ok(pool)
    }

    pub async fn get_pool(&self, id: &str) -> Result<StoragePool> {
        self.repo.get_pool(id).await
    }

    pub async fn list_pools(&self) -> Result<Vec<StoragePool>> {
        self.repo.list_pools().await
    }

    pub async fn list_pools_for_hardware_pool(
        &self,
        hardware_pool_id: &HardwarePoolId,
    ) -> Result<Vec<StoragePool>> {
        self.repo.list_pools_for_hardware_pool(hardware_pool_id).await
    }

    /// Persist connection changes to an existing pool
    #[instrument(skip_all, fields(pool_id = ?pool.id().ok()))]
    pub async fn update_pool(&self, pool: &StoragePool) -> Result<()> {
        pool.validate()?;
        self.repo.update_pool(pool).await?;
        info!("Storage pool updated");
        Ok(())
    }

    /// Record a volume carved out of a pool
    #[instrument(skip_all, fields(pool_id = %pool_id, volume = %name, size_gb = %size_in_gb))]
    pub async fn add_volume(
        &self,
        pool_id: &str,
        name: &str,
        size_in_gb: u64,
        lun: Option<u32>,
    ) -> Result<StorageVolume> {
        validation::validate_volume_name(name)?;
        validation::validate_volume_size(size_in_gb, self.settings.max_volume_size_gb)?;

        // Fails with StoragePoolNotFound before a dangling volume can be written
        let pool = self.repo.get_pool(pool_id).await?;

        let volume = StorageVolume {
            id: uuid::Uuid::new_v4().to_string(),
            storage_pool_id: pool.id()?.to_string(),
            name: name.to_string(),
            lun,
            size_in_gb,
            created_at: Utc::now(),
        };

        self.repo.create_volume(&volume).await?;
        info!(volume_id = %volume.id, "Volume added");

        Ok(volume)
    }

    #[instrument(skip_all, fields(volume_id = %volume_id))]
    pub async fn remove_volume(&self, volume_id: &str) -> Result<()> {
        self.repo.delete_volume(volume_id).await?;
        info!("Volume removed");
        Ok(())
    }

    /// Record a queued task against a pool on behalf of the task-execution engine
    #[instrument(skip_all, fields(pool_id = %pool_id, action = %action))]
    pub async fn record_task(
        &self,
        pool_id: &str,
        action: TaskAction,
        args: Option<String>,
    ) -> Result<StorageTask> {
        let pool = self.repo.get_pool(pool_id).await?;

        let task = StorageTask {
            id: uuid::Uuid::new_v4().to_string(),
            storage_pool_id: pool.id()?.to_string(),
            action,
            state: TaskState::Queued,
            args,
            message: None,
            created_at: Utc::now(),
            time_started: None,
            time_ended: None,
        };

        self.repo.create_task(&task).await?;
        info!(task_id = %task.id, "Storage task queued");

        Ok(task)
    }

    /// Move a task to a new state, stamping start and end times.
    ///
    /// Terminal tasks cannot change state again.
    #[instrument(skip_all, fields(task_id = %task_id, state = %state))]
    pub async fn update_task_state(
        &self,
        task_id: &str,
        state: TaskState,
        message: Option<String>,
    ) -> Result<StorageTask> {
        let mut task = self.repo.get_task(task_id).await?;

        if task.state.is_terminal() {
            return Err(Error::Validation(format!(
                "Task {} is already {}",
                task_id, task.state
            )));
        }

        let now = Utc::now();
        if state != TaskState::Queued && task.time_started.is_none() {
            task.time_started = Some(now);
        }
        if state.is_terminal() {
            task.time_ended = Some(now);
        }
        task.state = state;
        if message.is_some() {
            task.message = message;
        }

        self.repo.update_task(&task).await?;
        info!("Storage task updated");

        Ok(task)
    }

    /// Tasks recorded against a pool, unfiltered
    pub async fn pool_tasks(&self, pool_id: &str) -> Result<Vec<StorageTask>> {
        self.repo.get_pool(pool_id).await?.tasks(self.repo.as_ref()).await
    }

    /// Display name, capacity and task counts for one pool
    pub async fn pool_summary(&self, pool_id: &str) -> Result<PoolSummary> {
        let pool = self.repo.get_pool(pool_id).await?;
        let volumes = self.repo.volumes_for_pool(pool_id).await?;
        let tasks = pool.tasks(self.repo.as_ref()).await?;

        Ok(PoolSummary {
            id: pool.id()?.to_string(),
            display_name: pool.display_name(),
            storage_type: pool.type_label().to_string(),
            hardware_pool_id: pool.hardware_pool_id().cloned(),
            volume_count: volumes.len(),
            total_volume_size_gb: total_size_gb(&volumes),
            task_count: tasks.len(),
            active_task_count: tasks.iter().filter(|t| !t.state.is_terminal()).count(),
        })
    }

    /// Delete a pool together with all of its volumes.
    ///
    /// Tasks referencing the pool are kept. Returns the number of volumes removed.
    #[instrument(skip_all, fields(pool_id = %pool_id))]
    pub async fn decommission(&self, pool_id: &str) -> Result<u64> {
        match self.repo.delete_pool_cascade(pool_id).await {
            Ok(volumes_removed) => {
                crate::log_pool_operation!("decommission", pool_id, volumes_removed = volumes_removed);
                Ok(volumes_removed)
            }
            Err(e) => {
                warn!(error = %e, "Storage pool decommission failed");
                Err(e)
            }
        }
    }
}
