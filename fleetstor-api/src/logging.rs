///! Logging configuration module
///! Console output plus an optional rolling JSON log file

use crate::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "fleetstor.log";

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl std::str::FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" => Ok(Self::Never),
            other => Err(format!("Unknown log rotation: {}", other)),
        }
    }
}

/// Initialize logging based on configuration.
///
/// Keep the returned guard alive for as long as the process logs; dropping it
/// stops the file writer.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    // Console layer with colors
    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_ansi(true)
        .with_writer(io::stdout);

    if !config.file_logging_enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()?;

        tracing::info!("Logging initialized - level: {}", config.level);
        return Ok(None);
    }

    let file_appender = match config.rotation {
        LogRotation::Hourly => rolling::hourly(&config.log_dir, LOG_FILE_NAME),
        LogRotation::Daily => rolling::daily(&config.log_dir, LOG_FILE_NAME),
        LogRotation::Never => rolling::never(&config.log_dir, LOG_FILE_NAME),
    };

    let (writer, guard) = non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .json()
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        log_dir = %config.log_dir.display(),
        "Logging initialized - level: {}",
        config.level
    );

    Ok(Some(guard))
}

/// Log storage pool operation with context
#[macro_export]
macro_rules! log_pool_operation {
    ($op:expr, $pool_id:expr) => {
        tracing::info!(
            operation = $op,
            pool_id = %$pool_id,
            "Storage pool operation"
        )
    };
    ($op:expr, $pool_id:expr, $($key:ident = $value:expr),+) => {
        tracing::info!(
            operation = $op,
            pool_id = %$pool_id,
            $($key = $value),+,
            "Storage pool operation"
        )
    };
}

/// Log database operation
#[macro_export]
macro_rules! log_db_operation {
    ($op:expr, $table:expr) => {
        tracing::debug!(
            operation = $op,
            table = $table,
            "Database operation"
        )
    };
    ($op:expr, $table:expr, $id:expr) => {
        tracing::debug!(
            operation = $op,
            table = $table,
            record_id = %$id,
            "Database operation"
        )
    };
}
