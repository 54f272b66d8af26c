use std::path::PathBuf;

use thiserror::Error;

use crate::util::CHAT_BINARY_NAME;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("home directory not found")]
    NoHomeDirectory,
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

type Result<T, E = DirectoryError> = std::result::Result<T, E>;

/// The gchat data directory
///
/// - Linux: `$XDG_DATA_HOME/gchat` or `$HOME/.local/share/gchat`
/// - MacOS: `$HOME/Library/Application Support/gchat`
pub fn data_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or(DirectoryError::NoHomeDirectory)?
        .join(CHAT_BINARY_NAME))
}

/// The directory containing log files
///
/// Uses the runtime dir when available so logs do not outlive the session on systems that clear
/// it, otherwise falls back to the temp dir.
pub fn logs_dir() -> Result<PathBuf> {
    let base = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
    Ok(base.join(format!("{CHAT_BINARY_NAME}log")))
}

/// The path to the user's settings file
pub fn settings_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("settings.json"))
}
