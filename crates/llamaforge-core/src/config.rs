//! Server launch configuration.
//!
//! [`ServerConfig`] is an intent-based value object: it says what the caller
//! wants, not how the process gets started. The runtime crate turns it into
//! an argument vector and environment overlay.

use crate::backend::BackendPreference;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where the model comes from, decided once at the configuration boundary.
///
/// Legacy front ends used to smuggle `-hf`/`-m` flags inside a single text
/// field; [`ModelRef::sniff`] accepts that form but the rest of the system
/// only ever sees the tagged variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRef {
    /// Path to a local model file.
    Local(PathBuf),
    /// Remote artifact-repository reference (owner/repo form).
    Remote(String),
}

impl ModelRef {
    /// Classify a raw model string. Deterministic and total: every input
    /// maps to exactly one variant, defaulting to a local path.
    pub fn sniff(input: &str) -> Self {
        let mut tokens = input.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "-hf" => {
                    if let Some(repo) = tokens.next() {
                        return Self::Remote(repo.to_string());
                    }
                }
                "-m" => {
                    if let Some(path) = tokens.next() {
                        return Self::Local(PathBuf::from(path));
                    }
                }
                _ => {}
            }
        }
        Self::Local(PathBuf::from(input.trim()))
    }

    /// The launch argument pair for this reference: `-hf <repo>` or `-m <path>`.
    pub fn launch_args(&self) -> [String; 2] {
        match self {
            Self::Local(path) => ["-m".to_string(), path.display().to_string()],
            Self::Remote(repo) => ["-hf".to_string(), repo.clone()],
        }
    }

    /// True for an empty path or repo, which can never launch.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Local(path) => path.as_os_str().is_empty(),
            Self::Remote(repo) => repo.is_empty(),
        }
    }
}

/// Tensor split mode across multiple GPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    #[default]
    None,
    Layer,
    Row,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Layer => "layer",
            Self::Row => "row",
        };
        write!(f, "{s}")
    }
}

/// Configuration for launching a llama-server instance.
///
/// Immutable once built. Required-field validation (a non-empty model
/// reference) is the control surface's job and happens before any process
/// is spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Model to serve.
    pub model: ModelRef,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Worker thread count.
    pub threads: u32,
    /// GPU layers to offload. Forced to zero when the backend is `cpu`.
    pub gpu_layers: u32,
    /// Context size in tokens.
    pub context_size: u32,
    /// Batch size.
    pub batch_size: u32,
    /// Parallel request slots.
    pub parallel: u32,
    /// Tensor split mode.
    pub split_mode: SplitMode,
    /// Disable memory-mapping of the model file.
    pub no_mmap: bool,
    /// Lock model memory.
    pub mlock: bool,
    /// Enable flash attention.
    pub flash_attn: bool,
    /// Enable jinja chat templates.
    pub jinja: bool,
    /// KV-cache quantization type for keys.
    pub cache_type_k: String,
    /// KV-cache quantization type for values.
    pub cache_type_v: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Top-p sampling cutoff.
    pub top_p: f32,
    /// Min-p sampling cutoff.
    pub min_p: f32,
    /// Repetition penalty.
    pub repeat_penalty: f32,
    /// RoPE frequency base override; zero means "do not override".
    pub rope_freq_base: f32,
    /// RoPE frequency scale override; zero means "do not override".
    pub rope_freq_scale: f32,
    /// Requested acceleration backend.
    pub backend: BackendPreference,
    /// Explicit server executable; `None` means use discovery.
    pub executable: Option<PathBuf>,
    /// Model/runtime cache directory; `None` means current directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model: ModelRef::Local(PathBuf::new()),
            host: "127.0.0.1".to_string(),
            port: 8080,
            threads: u32::try_from(num_cpus::get()).unwrap_or(1),
            gpu_layers: 0,
            context_size: 4096,
            batch_size: 512,
            parallel: 1,
            split_mode: SplitMode::None,
            no_mmap: false,
            mlock: false,
            flash_attn: false,
            jinja: false,
            cache_type_k: "f16".to_string(),
            cache_type_v: "f16".to_string(),
            temperature: 0.8,
            top_k: 40,
            top_p: 0.9,
            min_p: 0.05,
            repeat_penalty: 1.1,
            rope_freq_base: 0.0,
            rope_freq_scale: 0.0,
            backend: BackendPreference::Auto,
            executable: None,
            cache_dir: None,
        }
    }
}

impl ServerConfig {
    /// Create a configuration for the given model with default tuning.
    pub fn new(model: ModelRef) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Set the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the GPU offload layer count.
    #[must_use]
    pub const fn with_gpu_layers(mut self, layers: u32) -> Self {
        self.gpu_layers = layers;
        self
    }

    /// Set the context size.
    #[must_use]
    pub const fn with_context_size(mut self, size: u32) -> Self {
        self.context_size = size;
        self
    }

    /// Set the backend preference.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    /// Set an explicit server executable path.
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}
