//! Backend capability probing for llama-server executables.
//!
//! The probe is advisory and never fails: any problem invoking the
//! executable degrades the report to CPU-only. Two independent signals are
//! gathered and surfaced separately - support artifacts next to the
//! executable ("could work") and the device listing the executable prints
//! when run ("did work this run").

use llamaforge_core::backend::{Backend, BackendReport, CapabilityMap};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Hard cap on the device-listing invocation.
const DEVICE_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker for the generic GPU-math-library init line that also appears when
/// no matching GPU is present. Lines carrying it are skipped outright.
const FALSE_POSITIVE_MARKER: &str = "ggml_cuda_init";

/// File-name stems of per-backend support libraries shipped next to the
/// server binary.
const ARTIFACT_STEMS: &[(&str, Backend)] = &[
    ("ggml-cuda", Backend::Cuda),
    ("ggml-hip", Backend::Rocm),
    ("ggml-vk", Backend::Vulkan),
    ("ggml-sycl", Backend::Sycl),
];

/// Probe an executable and report which acceleration backends are live.
///
/// Blocks up to [`DEVICE_LIST_TIMEOUT`] while the executable runs in its
/// non-interactive device-listing mode. The answer is executable- and
/// directory-specific; callers must not cache it across path changes.
pub async fn detect(executable: &Path) -> BackendReport {
    let dir = executable.parent().filter(|d| !d.as_os_str().is_empty());
    let available = dir.map_or_else(CapabilityMap::default, scan_backend_artifacts);

    match run_device_listing(executable).await {
        Some(output) => {
            let active = parse_device_output(&output);
            BackendReport::from_parts(&active, available)
        }
        None => {
            // Probing is advisory; degrade rather than surface an error
            BackendReport::from_parts(&[], available)
        }
    }
}

/// Run `<executable> --list-devices` and capture combined stdout+stderr.
///
/// Returns `None` on any invocation failure, including timeout. A non-zero
/// exit still yields output: some builds list devices on stderr and exit
/// unhappily.
async fn run_device_listing(executable: &Path) -> Option<String> {
    let mut command = Command::new(executable);
    command.arg("--list-devices");

    match timeout(DEVICE_LIST_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(executable = %executable.display(), "device listing captured");
            Some(format!("{stdout}\n{stderr}"))
        }
        Ok(Err(e)) => {
            warn!(
                executable = %executable.display(),
                error = %e,
                "runtime check failed, reporting CPU only"
            );
            None
        }
        Err(_) => {
            warn!(
                executable = %executable.display(),
                "device listing timed out, reporting CPU only"
            );
            None
        }
    }
}

/// Scan the executable's directory for per-backend support artifacts.
fn scan_backend_artifacts(dir: &Path) -> CapabilityMap {
    let mut map = CapabilityMap::default();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return map;
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        for (stem, backend) in ARTIFACT_STEMS {
            if name.contains(stem) {
                match backend {
                    Backend::Cuda => map.cuda = true,
                    Backend::Rocm => map.rocm = true,
                    Backend::Vulkan => map.vulkan = true,
                    Backend::Sycl => map.sycl = true,
                    Backend::Cpu | Backend::Metal => {}
                }
            }
        }
    }
    map
}

/// Keyword rules applied per line: backend token co-occurring with
/// "device" or "init".
const KEYWORD_RULES: &[(&[&str], Backend)] = &[
    (&["cuda"], Backend::Cuda),
    (&["hip", "rocm", "amd"], Backend::Rocm),
    (&["vulkan"], Backend::Vulkan),
    (&["metal"], Backend::Metal),
    (&["sycl"], Backend::Sycl),
];

/// Extract the set of backends the device listing shows as initialized.
///
/// Lines flagged as error/failure/not-found indicate an attempted-but-failed
/// initialization and are skipped, as is the known false-positive marker.
/// Repeated mentions count once; unrecognized lines are ignored.
fn parse_device_output(output: &str) -> Vec<Backend> {
    let mut active: Vec<Backend> = Vec::new();

    for line in output.lines() {
        let lower = line.to_lowercase();

        if lower.contains(FALSE_POSITIVE_MARKER) {
            continue;
        }
        if lower.contains("error") || lower.contains("failed") || lower.contains("not found") {
            continue;
        }
        if !lower.contains("device") && !lower.contains("init") {
            continue;
        }

        for (tokens, backend) in KEYWORD_RULES {
            if tokens.iter().any(|t| lower.contains(t)) && !active.contains(backend) {
                active.push(*backend);
            }
        }
    }

    active
}
