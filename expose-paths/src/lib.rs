//! XDG Base Directory paths for expose.
//!
//! CLI tools should use XDG paths for cross-platform consistency,
//! not platform-native paths. The one exception is the tunnel vendor's
//! own directory, which lives where the vendor tool expects it.

use std::path::PathBuf;

/// File name of the port status store inside [`data_dir`].
pub const STATUS_FILE_NAME: &str = "status.json";

/// Get the expose data directory.
///
/// Returns `$XDG_DATA_HOME/expose` if set, otherwise `~/.local/share/expose`.
/// This is where the port status store and its lock file live.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("expose")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share/expose")
    } else {
        PathBuf::from(".local/share/expose")
    }
}

/// Default location of the port status store.
pub fn status_store_path() -> PathBuf {
    data_dir().join(STATUS_FILE_NAME)
}

/// Directory where cloudflared keeps credentials and where runner
/// configurations are written (`~/.cloudflared`).
pub fn cloudflared_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(".cloudflared")
}
