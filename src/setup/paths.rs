//! Path utilities for control center locations
//!
//! Everything lives under one home directory:
//! `$LLAMA_CONTROL_HOME`, else `<data dir>/llama-control`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "LLAMA_CONTROL_HOME";

/// Models are recognised by this extension
pub const MODEL_EXTENSION: &str = "gguf";

/// Resolve the home directory
pub fn default_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::data_dir()
        .map(|d| d.join("llama-control"))
        .unwrap_or_else(|| PathBuf::from(".llama-control"))
}

/// Files and directories derived from the home directory
#[derive(Debug, Clone)]
pub struct HomeLayout {
    pub home: PathBuf,
}

impl HomeLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.home.join("logs.json")
    }

    /// Temporary archives, outside the binaries directory
    pub fn downloads_dir(&self) -> PathBuf {
        self.home.join("downloads")
    }

    pub fn default_binaries_dir(&self) -> PathBuf {
        self.home.join("bin")
    }

    pub fn default_models_dir(&self) -> PathBuf {
        self.home.join("models")
    }

    /// Ensure the home and downloads directories exist
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.home)?;
        std::fs::create_dir_all(self.downloads_dir())?;
        Ok(())
    }
}

/// Name of the server executable for this platform
#[cfg(target_os = "windows")]
pub const SERVER_EXECUTABLE: &str = "llama-server.exe";

#[cfg(not(target_os = "windows"))]
pub const SERVER_EXECUTABLE: &str = "llama-server";

/// Path of the server executable inside a binaries directory
pub fn server_executable(binaries_dir: &Path) -> PathBuf {
    binaries_dir.join(SERVER_EXECUTABLE)
}

/// Variable the dynamic loader searches for shared libraries
#[cfg(target_os = "windows")]
pub const LIBRARY_PATH_VAR: &str = "PATH";

#[cfg(target_os = "macos")]
pub const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Library search path with the binaries directory (and its direct
/// subdirectories, for archives that ship `lib/` folders) prepended
pub fn library_search_path(binaries_dir: &Path, current: Option<OsString>) -> OsString {
    let mut dirs_to_add = vec![binaries_dir.to_path_buf()];
    if let Ok(entries) = std::fs::read_dir(binaries_dir) {
        let mut subdirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        subdirs.sort();
        dirs_to_add.extend(subdirs);
    }

    let existing: Vec<PathBuf> = current
        .as_ref()
        .map(|c| std::env::split_paths(c).collect())
        .unwrap_or_default();

    let mut parts: Vec<PathBuf> = dirs_to_add
        .into_iter()
        .filter(|d| !existing.contains(d))
        .collect();
    parts.extend(existing);

    std::env::join_paths(parts).unwrap_or_else(|_| binaries_dir.as_os_str().to_os_string())
}

/// True when the directory exists and holds at least one entry
pub fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
