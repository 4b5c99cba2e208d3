//! Locate a usable engine executable.
//!
//! Candidates come from the configured override path and from every alias
//! resolved against each `PATH` directory. A candidate wins when it is an
//! executable regular file and passes the capability probe:
//!
//! 1. `exe --version` (stdin closed, stdout and stderr merged) must mention
//!    every configured banner substring.
//! 2. `exe --help` must exit with status 0.
//!
//! The default lookup runs once per process. When nothing qualifies the
//! bridge stays unavailable until the process restarts.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// Process-wide result of the default discovery.
static DISCOVERED: OnceLock<Result<PathBuf, String>> = OnceLock::new();

/// Find the engine once and remember the answer, success or failure.
///
/// Only the configuration passed on the first call is consulted.
pub fn discover(config: &BridgeConfig) -> BridgeResult<PathBuf> {
    DISCOVERED
        .get_or_init(|| discover_with(config).map_err(|e| e.to_string()))
        .clone()
        .map_err(BridgeError::Unavailable)
}

/// Find the engine for an explicit configuration, without caching.
#[tracing::instrument(level = "debug", skip(config))]
pub fn discover_with(config: &BridgeConfig) -> BridgeResult<PathBuf> {
    let path_var = std::env::var("PATH").unwrap_or_default();
    discover_in(config, &path_var)
}

/// Discovery against a given `PATH` string.
pub fn discover_in(config: &BridgeConfig, path_var: &str) -> BridgeResult<PathBuf> {
    let candidates = candidates(config, path_var);
    if candidates.is_empty() {
        return Err(BridgeError::Unavailable(format!(
            "no {} executable in ({})",
            config.aliases.join(", "),
            path_var
        )));
    }

    let mut rejected = Vec::new();
    for candidate in candidates {
        match probe(&candidate, &config.banner) {
            Ok(()) => {
                tracing::info!(engine = %candidate.display(), "engine discovered");
                return Ok(candidate);
            }
            Err(reason) => {
                tracing::debug!(candidate = %candidate.display(), %reason, "candidate rejected");
                rejected.push(format!("{}: {}", candidate.display(), reason));
            }
        }
    }

    Err(BridgeError::Unavailable(rejected.join("; ")))
}

/// Every executable that could be the engine, in priority order.
///
/// The configured override comes first, then each alias in PATH order.
pub fn candidates(config: &BridgeConfig, path_var: &str) -> Vec<PathBuf> {
    let mut results: Vec<PathBuf> = Vec::new();

    if let Some(path) = &config.engine_path {
        if is_executable(path) {
            results.push(path.clone());
        } else {
            tracing::warn!(path = %path.display(), "configured engine is not an executable file");
        }
    }

    for alias in &config.aliases {
        for found in find_in_path(alias, path_var) {
            if !results.contains(&found) {
                results.push(found);
            }
        }
    }

    results
}

/// Find all occurrences of a command in PATH directories.
pub fn find_in_path(name: &str, path_var: &str) -> Vec<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .filter(|path| is_executable(path))
        .collect()
}

/// Regular file with at least one execute bit set.
pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|metadata| metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        // On non-Unix systems, just check if file exists
        true
    }
}

/// Run the capability probe; the error is a human-readable reason.
pub fn probe(exe: &Path, banner: &[String]) -> Result<(), String> {
    let output = Command::new(exe)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("--version failed to run: {}", e))?;

    let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
    merged.push('\n');
    merged.push_str(&String::from_utf8_lossy(&output.stderr));

    let missing: Vec<&str> = banner
        .iter()
        .map(String::as_str)
        .filter(|needle| !merged.lines().any(|line| line.contains(needle)))
        .collect();
    if !missing.is_empty() {
        return Err(format!("--version banner lacks {:?}", missing));
    }

    let status = Command::new(exe)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| format!("--help failed to run: {}", e))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("--help exited with {}", status))
    }
}
