use attendanced::channel::UpdateChannel;
use attendanced::config::DaemonConfig;
use attendanced::ipc;
use attendanced::logging;

use std::io::{self, BufRead, Write};
use tracing::{error, info};

fn main() {
    let config = DaemonConfig::from_env();
    logging::init_logging(&config);

    // One bus per process, handed to everything that publishes or listens.
    let mut state = ipc::AppState::new(UpdateChannel::new());
    if let Some(workspace) = config.workspace.as_deref() {
        if let Err(e) = ipc::select_workspace(&mut state, workspace) {
            error!(workspace = %workspace.display(), error = %e, "could not open startup workspace");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "attendanced ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, shutting down");
}
