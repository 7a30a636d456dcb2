//! Idlewatch - session idle timeout in a terminal
//!
//! Runs the idle timer against a terminal host: every line typed counts as
//! user interaction, `:` commands drive the activity lifecycle and adjust the
//! thresholds while running.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use idlewatch::activity::{ActivityBridge, ActivityChannel, HostActivity, LoggingLifecycle};
use idlewatch::alert::ConsoleAlert;
use idlewatch::config::Config;
use idlewatch::host::{HostEvent, HostFlow, TerminalHost, HELP};
use idlewatch::logging::JsonlLogger;
use idlewatch::timeout::{TimeoutEvent, TimeoutService, TimerPhase};

/// Application version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = Config::load(config_path.as_deref())?;
    init_tracing(&config.logging.level)?;
    config.validate()?;

    info!("Starting idlewatch v{}", VERSION);

    // Host and timer share one event loop, like a UI main thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    runtime.block_on(run(config))?;

    info!("Idlewatch shutdown complete");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    info!(
        "Configuration loaded: idle timeout={}s, warning {}s before close",
        config.timeout.total_seconds, config.timeout.warning_seconds
    );

    let mut event_log = if config.logging.event_log {
        Some(JsonlLogger::new(config.logging.logs_dir())?)
    } else {
        None
    };

    let settings = config.timeout.settings();
    let channel = ActivityChannel::new();

    let timeout = TimeoutService::new(settings.clone(), Arc::new(ConsoleAlert))
        .with_messages(config.alerts.messages())
        .spawn(channel.subscribe());
    let mut timeout_events = timeout.subscribe();

    if let Some(log) = event_log.as_mut() {
        log.log_session_start(VERSION, &settings)?;
    }

    let bridge = ActivityBridge::new(HostActivity::new("terminal"), channel, LoggingLifecycle);
    let mut host = TerminalHost::new(bridge, settings);
    host.dispatch(HostEvent::Create);
    host.dispatch(HostEvent::Start);

    timeout.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Type to interact, :help for commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("Input closed");
                    host.dispatch(HostEvent::Quit);
                    break;
                };
                match host.handle_line(&line) {
                    Ok(HostFlow::Continue) => {}
                    Ok(HostFlow::ShowStatus) => {
                        let status = timeout.status();
                        let phase = match status.phase {
                            TimerPhase::Running => "running",
                            TimerPhase::Stopped => "stopped",
                        };
                        let thresholds = timeout.settings().thresholds();
                        println!(
                            "idle timer {}: {}s idle of {}s (warning at {}s before)",
                            phase,
                            status.elapsed_ms / 1_000,
                            thresholds.total_ms / 1_000,
                            thresholds.warning_ms / 1_000
                        );
                    }
                    Ok(HostFlow::ShowHelp) => println!("{}", HELP),
                    Ok(HostFlow::Quit) => {
                        info!("Quit command received");
                        break;
                    }
                    Err(e) => warn!("{}", e),
                }
            }
            event = timeout_events.recv() => match event {
                Ok(event) => record_event(event_log.as_mut(), &event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event log skipped {} timeout events", missed)
                }
                Err(RecvError::Closed) => {
                    error!("Timeout service stopped unexpectedly");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                host.dispatch(HostEvent::Quit);
                break;
            }
        }
    }

    info!("Shutting down...");
    timeout.shutdown().await;

    while let Ok(event) = timeout_events.try_recv() {
        record_event(event_log.as_mut(), &event);
    }
    if let Some(log) = event_log.as_mut() {
        log.log_session_end()?;
    }

    Ok(())
}

fn record_event(log: Option<&mut JsonlLogger>, event: &TimeoutEvent) {
    if let Some(log) = log {
        if let Err(e) = log.log_timeout_event(event) {
            warn!("Failed to log timeout event: {}", e);
        }
    }
}

/// Initialize tracing subscriber with the given log level.
fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    Ok(())
}
