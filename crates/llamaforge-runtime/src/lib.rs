//! Process supervision runtime for llamaforge.
//!
//! This crate owns everything that touches the operating system:
//!
//! - [`command`] - turn a [`llamaforge_core::ServerConfig`] into an argument
//!   vector and environment overlay
//! - [`detect`] - probe an executable for usable acceleration backends
//! - [`supervisor`] - the single-process lifecycle state machine
//! - [`pipeline`] - classified log capture and broadcast
//! - [`discovery`] - locate the llama-server executable
//! - [`shutdown`] - recursive process-tree termination
//! - [`logging`] - append-only file logging bootstrap

pub mod command;
pub mod detect;
pub mod discovery;
pub mod logging;
pub mod pipeline;
pub mod shutdown;
pub mod supervisor;

// Re-export commonly used types
pub use command::{build_launch_command, LaunchCommand};
pub use detect::detect;
pub use discovery::find_server_executable;
pub use pipeline::{LogPipeline, LogStreamEvent, LogSubscriber};
pub use supervisor::{StartOutcome, Supervisor};
