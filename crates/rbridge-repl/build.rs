//! Stamps the binary with a commit id and a build date for `rbridge --version`.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};

fn main() {
    let root = workspace_root();
    let git_dir = root.join(".git");
    if git_dir.is_dir() {
        for watched in ["HEAD", "refs/heads", "packed-refs"] {
            println!("cargo::rerun-if-changed={}", git_dir.join(watched).display());
        }
    }
    println!("cargo::rerun-if-env-changed=SOURCE_DATE_EPOCH");

    let commit = short_commit(&root).unwrap_or_else(|| "unknown".into());
    println!("cargo::rustc-env=RBRIDGE_GIT_HASH={commit}");
    println!("cargo::rustc-env=RBRIDGE_BUILD_DATE={}", build_date().format("%Y-%m-%d"));
}

/// Two levels above this crate's manifest.
fn workspace_root() -> PathBuf {
    let manifest = env::var_os("CARGO_MANIFEST_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from);
    manifest
        .ancestors()
        .nth(2)
        .map_or_else(|| manifest.clone(), Path::to_path_buf)
}

/// `None` outside a checkout or when git is not installed.
fn short_commit(root: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let commit = String::from_utf8(output.stdout).ok()?;
    let commit = commit.trim();
    (!commit.is_empty()).then(|| commit.to_owned())
}

/// Honors `SOURCE_DATE_EPOCH` so packaged builds are reproducible.
fn build_date() -> DateTime<Utc> {
    env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|secs| secs.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}
