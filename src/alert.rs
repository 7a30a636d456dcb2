//! User-facing alert presentation.

use std::io::Write;
use tracing::{info, warn};

/// Presents a message to the user. Fire-and-forget.
pub trait AlertSink: Send + Sync {
    fn alert(&self, message: &str);
}

/// Messages shown at each threshold crossing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessages {
    pub warning: String,
    pub closed: String,
}

impl Default for AlertMessages {
    fn default() -> Self {
        Self {
            warning: "Session is about to close".to_string(),
            closed: "Session closed".to_string(),
        }
    }
}

/// Writes a banner to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAlert;

impl AlertSink for ConsoleAlert {
    fn alert(&self, message: &str) {
        info!(message, "Alert raised");

        let rule = "=".repeat(message.chars().count() + 4);
        let mut stderr = std::io::stderr().lock();
        if let Err(e) = writeln!(stderr, "\n{rule}\n| {message} |\n{rule}\n") {
            warn!("Failed to present alert: {}", e);
        }
    }
}
