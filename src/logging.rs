use crate::config::DaemonConfig;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout carries the IPC responses.
pub fn init_logging(config: &DaemonConfig) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
