//! Platform-specific directories.
//!
//! - logs: the platform cache dir (`~/.cache/game-client/logs` on Linux)
//! - data: the platform data dir (`~/.local/share/game-client` on Linux)

use std::path::PathBuf;

const APPLICATION: &str = "game-client";

pub fn log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APPLICATION)
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp/game-client"))
        .join("logs")
}

pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APPLICATION)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./save_data"))
}
