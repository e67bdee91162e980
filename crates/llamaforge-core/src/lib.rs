//! Core domain types for the llamaforge supervisor.
//!
//! This crate holds the pure, I/O-free half of the system: server
//! configuration, the backend steering tables, capability report types,
//! log event classification, and the supervisor error taxonomy. The
//! `llamaforge-runtime` crate consumes these to spawn and supervise the
//! actual llama-server process.

pub mod backend;
pub mod config;
pub mod error;
pub mod logs;
pub mod status;

// Re-export commonly used types for convenience
pub use backend::{
    Backend, BackendPreference, BackendReport, CapabilityMap, RuntimeEntry, RuntimeStatus,
    CACHE_DIR_VAR, CUDA_VISIBILITY_VAR, HIDDEN_VALUE, ROCM_VISIBILITY_VAR,
};
pub use config::{ModelRef, ServerConfig, SplitMode};
pub use error::SupervisorError;
pub use logs::{LogCategory, LogEvent};
pub use status::{StatusSnapshot, SupervisorState};
