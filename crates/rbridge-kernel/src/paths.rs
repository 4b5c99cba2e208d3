//! XDG Base Directory paths for rbridge.
//!
//! | Purpose | XDG Variable | Default |
//! |---------|--------------|---------|
//! | Data | `$XDG_DATA_HOME` | `~/.local/share` |
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` |
//!
//! Session scratch space is not here: every session owns a private temp
//! directory under the system temp dir (or `temp_root` from the config).

use std::path::PathBuf;

use directories::BaseDirs;

/// Get the user's home directory.
///
/// Returns `$HOME` or falls back to `/tmp` if not set.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Get XDG data home directory.
///
/// Returns `$XDG_DATA_HOME` or falls back to `~/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".local").join("share"))
}

/// Get XDG config home directory.
///
/// Returns `$XDG_CONFIG_HOME` or falls back to `~/.config`.
pub fn xdg_config_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".config"))
}

/// Get the rbridge data directory (REPL history lives here).
pub fn data_dir() -> PathBuf {
    xdg_data_home().join("rbridge")
}

/// Get the rbridge config directory.
pub fn config_dir() -> PathBuf {
    xdg_config_home().join("rbridge")
}

/// Where the REPL keeps its line history.
pub fn history_file() -> PathBuf {
    data_dir().join("history.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_dir_is_absolute() {
        assert!(home_dir().is_absolute());
    }

    #[test]
    fn rbridge_paths_build_on_xdg_primitives() {
        assert_eq!(data_dir(), xdg_data_home().join("rbridge"));
        assert_eq!(config_dir(), xdg_config_home().join("rbridge"));
    }

    #[test]
    fn history_is_under_data() {
        let history = history_file();
        assert!(history.starts_with(data_dir()));
        assert!(history.ends_with("history.txt"));
    }
}
