//! Locate the llama-server executable.
//!
//! Search order: current directory, own-executable directory, the
//! installation-relative `llama.cpp/build/bin` and `llama.cpp` directories,
//! PATH entries, then OS-specific well-known install directories. First
//! match wins. Absence is not fatal; the caller degrades to "must be
//! specified explicitly".

use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(windows)]
const SERVER_EXECUTABLE: &str = "llama-server.exe";
#[cfg(not(windows))]
const SERVER_EXECUTABLE: &str = "llama-server";

/// Find the llama-server executable, if any.
pub fn find_server_executable() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }

    if let Ok(own_exe) = std::env::current_exe() {
        if let Some(dir) = own_exe.parent() {
            candidates.push(dir.to_path_buf());
            candidates.push(dir.join("llama.cpp").join("build").join("bin"));
            candidates.push(dir.join("llama.cpp"));
        }
    }

    if let Some(found) = search_dirs(&candidates) {
        info!(path = %found.display(), "found llama-server");
        return Some(found);
    }

    if let Ok(found) = which::which(SERVER_EXECUTABLE) {
        info!(path = %found.display(), "found llama-server on PATH");
        return Some(found);
    }

    if let Some(found) = search_dirs(&well_known_dirs()) {
        info!(path = %found.display(), "found llama-server in well-known dir");
        return Some(found);
    }

    debug!("llama-server executable not found in search paths");
    None
}

/// Check each directory in order for the server executable.
fn search_dirs(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        let candidate = dir.join(SERVER_EXECUTABLE);
        candidate.is_file().then_some(candidate)
    })
}

#[cfg(not(windows))]
fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/usr/local/bin"), PathBuf::from("/usr/bin")];
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join("bin"));
    }
    dirs
}

#[cfg(windows)]
fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("C:\\llamacpp"),
        PathBuf::from("C:\\Program Files\\llama.cpp"),
    ];
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join("llamacpp"));
    }
    dirs
}

/// Resolve the executable to launch: an explicit path wins, discovery is
/// the fallback.
pub fn resolve_executable(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) if !path.as_os_str().is_empty() => Some(path.to_path_buf()),
        _ => find_server_executable(),
    }
}
