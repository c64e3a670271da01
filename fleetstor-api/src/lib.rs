//! Fleetstor API Library
//!
//! Management-plane model of storage pools attached to hardware pools: backend
//! type registry, pool aggregates, volume ownership and task records.

// Core modules
pub mod config;
pub mod validation;

// Storage
pub mod storage;

// Database
pub mod db;

// Logging configuration
pub mod logging;

pub use db::Database;
pub use storage::{
    factory, type_label_of, BackendKind, BackendRegistry, PoolParams, StorageManager,
    StoragePool, StorageRepository,
};
