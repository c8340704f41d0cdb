//! Node configuration.
//!
//! Provides `NodeConfig` (top-level settings), one section per subsystem,
//! `NodePaths` for the platform config directory, and TOML persistence via
//! `NodeConfig::load` / `NodeConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::NodePaths;
pub use settings::{
    CaptureConfig, ConfigError, HostConfig, IdentityConfig, NodeConfig, PowerConfig,
    StreamConfig, TelemetryConfig, TimingConfig, WatchdogConfig,
};
