//! Cross-platform node paths using the `dirs` crate.
//!
//! Config dir:
//!   Windows: %APPDATA%\acoustic-node\
//!   macOS:   ~/Library/Application Support/acoustic-node/
//!   Linux:   ~/.config/acoustic-node/

use std::path::PathBuf;

/// Resolved configuration paths.
#[derive(Debug, Clone)]
pub struct NodePaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
}

impl NodePaths {
    const APP_NAME: &'static str = "acoustic-node";

    /// Falls back to the current directory if the platform has no standard
    /// config location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        let settings_file = config_dir.join("settings.toml");

        Self {
            config_dir,
            settings_file,
        }
    }
}

impl Default for NodePaths {
    fn default() -> Self {
        Self::new()
    }
}
