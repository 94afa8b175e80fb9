//! Sidecar configuration.
//!
//! The library core reads no environment; only the binary builds one of these.

use std::path::PathBuf;

pub const LOG_ENV: &str = "ATTENDANCED_LOG";
pub const WORKSPACE_ENV: &str = "ATTENDANCED_WORKSPACE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            workspace: None,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(filter) = lookup(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter.trim().to_string();
        }
        config.workspace = lookup(WORKSPACE_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        config
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }
}
