//! Structured logging for the NetGuard core engine
//!
//! Provides file-based logging with daily rotation and structured output.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system
///
/// Creates the log directory and sets up daily rotating log files.
/// Console output goes to stderr so JSON results on stdout stay clean.
///
/// Set `RUST_LOG` to control the log level (default: info).
pub fn init_logging() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = get_log_directory()?;

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "netguard.log");

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .compact();

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .json();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = init_result {
        // Avoid panicking when a test or embedding process already installed a subscriber.
        if e.to_string().contains("already been set") {
            return Ok(log_dir);
        }
        return Err(Box::new(e));
    }

    tracing::info!("Logging initialized. Log directory: {}", log_dir.display());

    Ok(log_dir)
}

/// Get log directory path
///
/// Returns: `%APPDATA%/netguard/logs` on Windows,
///          `~/.config/netguard/logs` on Linux/macOS
fn get_log_directory() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .ok_or("Could not find APPDATA directory")?
            .join("netguard")
    } else {
        dirs::config_dir()
            .ok_or("Could not find config directory")?
            .join("netguard")
    };

    Ok(base_dir.join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_path() {
        let log_dir = get_log_directory().expect("Should get log directory");
        assert!(log_dir.to_string_lossy().contains("netguard"));
        assert!(log_dir.to_string_lossy().contains("logs"));
    }
}
