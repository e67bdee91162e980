//! Command builder for llama-server.
//!
//! Pure translation from [`ServerConfig`] to the argument vector and
//! environment overlay a launch needs. No I/O happens here; spawning is the
//! supervisor's job.

use llamaforge_core::backend::{CACHE_DIR_VAR, HIDDEN_VALUE};
use llamaforge_core::ServerConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A fully resolved launch: program, arguments, and environment overlay.
///
/// Retained on the managed process for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    /// Render the command as a single diagnostic string, env overlay first.
    pub fn rendered(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        parts.push(self.program.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Build the launch command for a structurally valid configuration.
///
/// Never fails: required-field validation is the caller's responsibility
/// and happens before this call. Optional flags are emitted only when they
/// differ from their no-op defaults, keeping generated commands minimal
/// and diffable.
pub fn build_launch_command(program: &Path, config: &ServerConfig) -> LaunchCommand {
    let mut args: Vec<String> = Vec::new();

    args.extend(config.model.launch_args());
    args.extend(["-t".into(), config.threads.to_string()]);

    // Safety override: a CPU backend request always disables GPU offload,
    // whatever the configured layer count says.
    let gpu_layers = if config.backend.forces_cpu() {
        0
    } else {
        config.gpu_layers
    };
    args.extend(["-ngl".into(), gpu_layers.to_string()]);

    args.extend(["--port".into(), config.port.to_string()]);
    args.extend(["--host".into(), config.host.clone()]);
    args.extend(["-c".into(), config.context_size.to_string()]);
    args.extend(["-sm".into(), config.split_mode.to_string()]);
    args.extend(["-np".into(), config.parallel.to_string()]);
    args.extend(["-b".into(), config.batch_size.to_string()]);

    if config.no_mmap {
        args.push("--no-mmap".into());
    }
    if config.mlock {
        args.push("--mlock".into());
    }
    if config.flash_attn {
        args.extend(["-fa".into(), "on".into()]);
    }
    if config.jinja {
        args.push("--jinja".into());
    }

    args.extend(["--cache-type-k".into(), config.cache_type_k.clone()]);
    args.extend(["--cache-type-v".into(), config.cache_type_v.clone()]);

    args.extend(["--temp".into(), config.temperature.to_string()]);
    args.extend(["--top-k".into(), config.top_k.to_string()]);
    args.extend(["--top-p".into(), config.top_p.to_string()]);
    args.extend(["--min-p".into(), config.min_p.to_string()]);
    args.extend(["--repeat-penalty".into(), config.repeat_penalty.to_string()]);

    // RoPE overrides of zero mean "not overridden" and are omitted
    if config.rope_freq_base != 0.0 {
        args.extend(["--rope-freq-base".into(), config.rope_freq_base.to_string()]);
    }
    if config.rope_freq_scale != 0.0 {
        args.extend([
            "--rope-freq-scale".into(),
            config.rope_freq_scale.to_string(),
        ]);
    }

    let cache_dir = config
        .cache_dir
        .as_ref()
        .map_or_else(|| ".".to_string(), |p| p.display().to_string());
    let mut env = vec![(CACHE_DIR_VAR.to_string(), cache_dir)];

    for var in config.backend.hidden_backend_vars() {
        env.push(((*var).to_string(), HIDDEN_VALUE.to_string()));
    }

    LaunchCommand {
        program: program.to_path_buf(),
        args,
        env,
    }
}
