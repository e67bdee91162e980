//! Acceleration backends, steering tables, and capability reports.
//!
//! The env-overlay table in this module is the single source of truth for
//! how a backend preference maps onto device-visibility variables. Both the
//! command builder and its tests consult it; nothing else re-derives the
//! mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable controlling NVIDIA device visibility.
pub const CUDA_VISIBILITY_VAR: &str = "CUDA_VISIBLE_DEVICES";
/// Environment variable controlling AMD/HIP device visibility.
pub const ROCM_VISIBILITY_VAR: &str = "HIP_VISIBLE_DEVICES";
/// Value that hides every device of a backend.
pub const HIDDEN_VALUE: &str = "-1";
/// Environment variable steering model/runtime caches.
pub const CACHE_DIR_VAR: &str = "LLAMA_CACHE";

/// Backend the caller asks the server to run on.
///
/// Steering happens purely through environment overlays; the executable is
/// never swapped. Vulkan has no visibility variable of its own, so forcing
/// it means hiding ROCm instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Let the server pick whatever it finds.
    #[default]
    Auto,
    /// Force CPU: hide every accelerator backend.
    Cpu,
    /// Prefer CUDA: hide ROCm.
    Cuda,
    /// Prefer ROCm: hide CUDA.
    Rocm,
    /// Prefer Vulkan: hide ROCm.
    Vulkan,
}

/// Preference → device-visibility variables to set to [`HIDDEN_VALUE`].
pub const BACKEND_ENV_TABLE: &[(BackendPreference, &[&str])] = &[
    (BackendPreference::Auto, &[]),
    (
        BackendPreference::Cpu,
        &[CUDA_VISIBILITY_VAR, ROCM_VISIBILITY_VAR],
    ),
    (BackendPreference::Cuda, &[ROCM_VISIBILITY_VAR]),
    (BackendPreference::Rocm, &[CUDA_VISIBILITY_VAR]),
    (BackendPreference::Vulkan, &[ROCM_VISIBILITY_VAR]),
];

impl BackendPreference {
    /// Visibility variables this preference hides, from [`BACKEND_ENV_TABLE`].
    pub fn hidden_backend_vars(self) -> &'static [&'static str] {
        BACKEND_ENV_TABLE
            .iter()
            .find(|(pref, _)| *pref == self)
            .map_or(&[], |(_, vars)| *vars)
    }

    /// True when GPU offload must be disabled regardless of configuration.
    pub fn forces_cpu(self) -> bool {
        self == Self::Cpu
    }
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Rocm => "rocm",
            Self::Vulkan => "vulkan",
        };
        write!(f, "{s}")
    }
}

/// An acceleration runtime the probe can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Cuda,
    Rocm,
    Vulkan,
    Metal,
    Sycl,
}

/// Canonical ordering for report entries (CPU last, as the fallback).
pub const DETECTABLE_BACKENDS: &[Backend] = &[
    Backend::Cuda,
    Backend::Rocm,
    Backend::Vulkan,
    Backend::Metal,
    Backend::Sycl,
];

impl Backend {
    /// Human-readable name shown to the control surface.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Cpu => "CPU (Fallback)",
            Self::Cuda => "CUDA (NVIDIA GPUs)",
            Self::Rocm => "ROCm (AMD GPUs)",
            Self::Vulkan => "Vulkan (Cross-platform)",
            Self::Metal => "Metal (Apple Silicon)",
            Self::Sycl => "SYCL (Intel GPUs/Accelerators)",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Whether a runtime was observed working in this probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Active,
    Unavailable,
}

/// One runtime row in a [`BackendReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEntry {
    pub name: String,
    pub status: RuntimeStatus,
    pub detail: String,
}

impl RuntimeEntry {
    /// Entry for a backend the probe saw initialize successfully.
    pub fn active(backend: Backend) -> Self {
        let name = backend.display_name();
        Self {
            name: name.to_string(),
            status: RuntimeStatus::Active,
            detail: format!("{name} is active and ready."),
        }
    }

    /// The unconditional CPU fallback entry.
    pub fn cpu_fallback() -> Self {
        Self {
            name: Backend::Cpu.display_name().to_string(),
            status: RuntimeStatus::Active,
            detail: "CPU is always available as fallback.".to_string(),
        }
    }
}

/// Which backends *could* work, judged from support artifacts next to the
/// executable. Independent of what actually initialized this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMap {
    pub cpu: bool,
    pub cuda: bool,
    pub rocm: bool,
    pub vulkan: bool,
    pub sycl: bool,
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self {
            // CPU support ships in the binary itself
            cpu: true,
            cuda: false,
            rocm: false,
            vulkan: false,
            sycl: false,
        }
    }
}

/// Result of one capability probe run.
///
/// `runtimes` is what the executable reported working right now; `available`
/// is what its directory suggests could work. The two signals are
/// deliberately not collapsed into one boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendReport {
    pub runtimes: Vec<RuntimeEntry>,
    #[serde(rename = "available_backends")]
    pub available: CapabilityMap,
}

impl BackendReport {
    /// Assemble a report from observed-active backends and the artifact map.
    ///
    /// Entries follow [`DETECTABLE_BACKENDS`] order, duplicates collapse,
    /// and the CPU fallback entry is always appended.
    pub fn from_parts(active: &[Backend], available: CapabilityMap) -> Self {
        let mut runtimes: Vec<RuntimeEntry> = DETECTABLE_BACKENDS
            .iter()
            .copied()
            .filter(|b| active.contains(b))
            .map(RuntimeEntry::active)
            .collect();
        runtimes.push(RuntimeEntry::cpu_fallback());
        Self {
            runtimes,
            available,
        }
    }

    /// Degraded report used when the executable could not be probed at all.
    pub fn cpu_only() -> Self {
        Self::from_parts(&[], CapabilityMap::default())
    }
}
