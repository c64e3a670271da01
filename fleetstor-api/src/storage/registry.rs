//! Backend type registry
//!
//! Maps storage type labels (e.g. "iSCSI") to concrete backend variants and back.
//! The registry is the only place that knows which labels exist; pool construction
//! and display labels both go through it.

use super::{IscsiStoragePool, PoolBackend, PoolParams, StoragePool};
use fleetstor_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Concrete storage backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Iscsi,
}

impl BackendKind {
    /// Every variant, registered or not
    pub const ALL: &'static [BackendKind] = &[BackendKind::Iscsi];
}

/// Builds a backend payload from provisioning params
pub type BackendConstructor = fn(&PoolParams) -> PoolBackend;

#[derive(Clone, Copy)]
struct BackendEntry {
    kind: BackendKind,
    construct: BackendConstructor,
}

static GLOBAL_REGISTRY: LazyLock<BackendRegistry> = LazyLock::new(BackendRegistry::builtin);

/// Bijective mapping between type labels and backend variants.
///
/// Only the builtin table exists outside this module, so every label a pool reports
/// through `type_label_of` is the label it was built under.
pub struct BackendRegistry {
    by_label: HashMap<&'static str, BackendEntry>,
    by_kind: HashMap<BackendKind, &'static str>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            by_label: HashMap::new(),
            by_kind: HashMap::new(),
        }
    }

    /// Registry with every backend shipped in this crate
    fn builtin() -> Self {
        let mut registry = Self::new();
        // Only fails on a duplicate entry in this table
        if let Err(e) = registry.register(IscsiStoragePool::TYPE_LABEL, BackendKind::Iscsi, |params| {
            PoolBackend::Iscsi(IscsiStoragePool::from_params(params))
        }) {
            panic!("builtin backend table is inconsistent: {}", e);
        }
        registry
    }

    /// Process-wide registry, read-only once initialized
    pub fn global() -> &'static BackendRegistry {
        &GLOBAL_REGISTRY
    }

    /// Register a backend under `label`.
    ///
    /// Fails if the label is taken or the variant already has a label.
    fn register(
        &mut self,
        label: &'static str,
        kind: BackendKind,
        construct: BackendConstructor,
    ) -> Result<()> {
        if label.is_empty() {
            return Err(Error::Registry("Storage type label cannot be empty".to_string()));
        }

        if let Some(existing) = self.by_label.get(label) {
            return Err(Error::Registry(format!(
                "Storage type {} is already registered for {:?}",
                label, existing.kind
            )));
        }

        if let Some(existing) = self.by_kind.get(&kind) {
            return Err(Error::Registry(format!(
                "Backend {:?} is already registered as {}",
                kind, existing
            )));
        }

        self.by_label.insert(label, BackendEntry { kind, construct });
        self.by_kind.insert(kind, label);
        debug!(label, kind = ?kind, "Registered storage backend");

        Ok(())
    }

    /// Construct a new, unsaved pool of the backend registered under `label`.
    ///
    /// Returns `None` for unknown labels; nothing is constructed in that case.
    pub fn factory(&self, label: &str, params: &PoolParams) -> Option<StoragePool> {
        let Some(entry) = self.by_label.get(label) else {
            warn!(storage_type = label, "Refusing to build pool for unregistered storage type");
            return None;
        };

        let backend = (entry.construct)(params);
        Some(StoragePool::new(backend, params.hardware_pool_id.clone()))
    }

    /// Label a pool's backend was registered under.
    ///
    /// # Panics
    ///
    /// Panics if the pool's variant is not registered here. Pools only come out of
    /// `factory`, so reaching this is a programming error.
    pub fn type_label_of(&self, pool: &StoragePool) -> &'static str {
        match self.label_for(pool.kind()) {
            Some(label) => label,
            None => panic!(
                "storage pool variant {:?} has no registered type label",
                pool.kind()
            ),
        }
    }

    pub fn label_for(&self, kind: BackendKind) -> Option<&'static str> {
        self.by_kind.get(&kind).copied()
    }

    pub fn kind_for(&self, label: &str) -> Option<BackendKind> {
        self.by_label.get(label).map(|entry| entry.kind)
    }

    pub fn is_registered(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    /// Registered labels, sorted
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels: Vec<_> = self.by_label.keys().copied().collect();
        labels.sort_unstable();
        labels
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

/// `BackendRegistry::factory` on the global registry
pub fn factory(label: &str, params: &PoolParams) -> Option<StoragePool> {
    BackendRegistry::global().factory(label, params)
}

/// `BackendRegistry::type_label_of` on the global registry
pub fn type_label_of(pool: &StoragePool) -> &'static str {
    BackendRegistry::global().type_label_of(pool)
}
