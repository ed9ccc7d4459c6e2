//! Shared helpers for the integration suites
#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use mcpherd::config::ServerConfig;

/// Default timeout wrapped around every awaited test step.
pub const TEST_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the path to the `mcp_test_server` binary.
///
/// Cargo sets `CARGO_BIN_EXE_mcp_test_server` automatically when running
/// integration tests in this workspace. Falls back to `target/debug` for
/// manual runs.
pub fn test_server_exe() -> PathBuf {
    if let Ok(p) = std::env::var("CARGO_BIN_EXE_mcp_test_server") {
        return PathBuf::from(p);
    }

    if let Ok(manifest) = std::env::var("CARGO_MANIFEST_DIR") {
        let debug = PathBuf::from(manifest)
            .join("target")
            .join("debug")
            .join("mcp_test_server");
        if debug.exists() {
            return debug;
        }
    }

    PathBuf::from("mcp_test_server")
}

/// A config pointing at the test server binary.
pub fn test_server_config(name: &str) -> ServerConfig {
    ServerConfig::new(name, test_server_exe().to_string_lossy().into_owned())
}

/// A config whose test server delays every post-handshake response.
pub fn slow_server_config(name: &str, delay: Duration) -> ServerConfig {
    test_server_config(name).env_var(
        "MCPHERD_TEST_DELAY_MS",
        delay.as_millis().to_string(),
    )
}

/// Initialize test logging once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcpherd=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
