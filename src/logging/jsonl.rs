//! JSONL writer for session timeout events.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::timeout::{TimeoutEvent, TimeoutSettings};

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStart {
        timestamp: DateTime<Utc>,
        version: String,
        total_timeout_seconds: u64,
        warning_timeout_seconds: u64,
    },
    TimerStarted {
        timestamp: DateTime<Utc>,
    },
    StartDeferred {
        timestamp: DateTime<Utc>,
        retry_in_ms: u64,
    },
    Activity {
        timestamp: DateTime<Utc>,
        idle_ms: u64,
    },
    Warning {
        timestamp: DateTime<Utc>,
        elapsed_ms: u64,
        remaining_ms: u64,
    },
    SessionClosed {
        timestamp: DateTime<Utc>,
        elapsed_ms: u64,
    },
    TimerStopped {
        timestamp: DateTime<Utc>,
        elapsed_ms: u64,
    },
    SessionEnd {
        timestamp: DateTime<Utc>,
        activity_resets: u64,
        warnings: u64,
        sessions_closed: u64,
    },
}

/// Running totals reported at session end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    pub activity_resets: u64,
    pub warnings: u64,
    pub sessions_closed: u64,
}

/// Appends session events to one JSONL file per local day.
pub struct JsonlLogger {
    logs_dir: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
    totals: SessionTotals,
}

impl JsonlLogger {
    /// Create a new JSONL logger.
    pub fn new(logs_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        Ok(Self {
            logs_dir,
            current_file: None,
            current_date: None,
            totals: SessionTotals::default(),
        })
    }

    /// Get or create the log file for today.
    fn get_writer(&mut self) -> Result<&mut BufWriter<File>> {
        let today = Local::now().format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&today) {
            let log_path = self.logs_dir.join(format!("{}.jsonl", today));

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open log file: {:?}", log_path))?;

            self.current_file = Some(BufWriter::new(file));
            self.current_date = Some(today);

            debug!("Opened log file: {:?}", log_path);
        }

        self.current_file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No log file available"))
    }

    fn write_line(&mut self, entry: &SessionEvent) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let writer = self.get_writer()?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    /// Log session start with the thresholds in effect.
    pub fn log_session_start(&mut self, version: &str, settings: &TimeoutSettings) -> Result<()> {
        let event = SessionEvent::SessionStart {
            timestamp: Utc::now(),
            version: version.to_string(),
            total_timeout_seconds: settings.total_timeout().as_secs(),
            warning_timeout_seconds: settings.warning_timeout().as_secs(),
        };
        info!("Session started");
        self.write_line(&event)
    }

    /// Log session end with totals gathered since start.
    pub fn log_session_end(&mut self) -> Result<()> {
        let totals = self.totals;
        let event = SessionEvent::SessionEnd {
            timestamp: Utc::now(),
            activity_resets: totals.activity_resets,
            warnings: totals.warnings,
            sessions_closed: totals.sessions_closed,
        };
        info!(
            "Session ended: {} resets, {} warnings, {} closes",
            totals.activity_resets, totals.warnings, totals.sessions_closed
        );
        self.write_line(&event)
    }

    /// Record a timeout service event. Ticks are not written.
    pub fn log_timeout_event(&mut self, event: &TimeoutEvent) -> Result<()> {
        let timestamp = Utc::now();
        let entry = match *event {
            TimeoutEvent::Tick { .. } => return Ok(()),
            TimeoutEvent::Started => SessionEvent::TimerStarted { timestamp },
            TimeoutEvent::StartDeferred { retry_in_ms } => SessionEvent::StartDeferred {
                timestamp,
                retry_in_ms,
            },
            TimeoutEvent::ActivityDetected { elapsed_ms } => {
                self.totals.activity_resets += 1;
                SessionEvent::Activity {
                    timestamp,
                    idle_ms: elapsed_ms,
                }
            }
            TimeoutEvent::Warning {
                elapsed_ms,
                remaining_ms,
            } => {
                self.totals.warnings += 1;
                SessionEvent::Warning {
                    timestamp,
                    elapsed_ms,
                    remaining_ms,
                }
            }
            TimeoutEvent::Expired { elapsed_ms } => {
                self.totals.sessions_closed += 1;
                SessionEvent::SessionClosed {
                    timestamp,
                    elapsed_ms,
                }
            }
            TimeoutEvent::Stopped { elapsed_ms } => SessionEvent::TimerStopped {
                timestamp,
                elapsed_ms,
            },
        };
        self.write_line(&entry)
    }

    pub fn totals(&self) -> SessionTotals {
        self.totals
    }
}

impl Drop for JsonlLogger {
    fn drop(&mut self) {
        if let Some(ref mut writer) = self.current_file {
            let _ = writer.flush();
        }
    }
}
