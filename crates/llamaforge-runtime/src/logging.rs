//! Operational logging bootstrap.
//!
//! The supervisor keeps a plain-text append-only log file for diagnostics.
//! Rotation and retention are out of scope.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a global tracing subscriber writing to an append-only file.
///
/// The filter honors `RUST_LOG`, defaulting to `info`. Fails if a global
/// subscriber is already installed or the file cannot be opened.
pub fn init_file_logging(path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}
