//! Line-oriented terminal host.
//!
//! Stands in for a platform UI runtime: every stdin line is one host event.
//! Plain text counts as user interaction; lines starting with `:` are
//! lifecycle transitions or runtime commands.

use std::cell::Cell;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::activity::{ActivityBridge, Bundle, Intent, LifecycleCallbacks, SuperCall};
use crate::timeout::TimeoutSettings;

/// Usage text printed by `:help`.
pub const HELP: &str = "\
any text              user interaction (resets the idle timer)
:create :start :pause :stop :save :back :destroy
                      lifecycle transitions
:permission CODE NAME=GRANT...
:result REQUEST RESULT [DATA]
:total SECONDS        set the idle timeout
:warning SECONDS      set the warning lead time
:status               show the idle timer
:quit                 stop and destroy the activity, then exit";

/// One event reported by the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Interaction,
    Create,
    SaveState,
    Start,
    Pause,
    Stop,
    Destroy,
    BackPressed,
    PermissionsResult {
        request_code: i32,
        permissions: Vec<String>,
        grant_results: Vec<i32>,
    },
    ActivityResult {
        request_code: i32,
        result_code: i32,
        data: Option<String>,
    },
    SetTotalTimeout(Duration),
    SetWarningTimeout(Duration),
    Status,
    Help,
    Quit,
}

/// A `:` command the terminal could not understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostCommandError {
    #[error("unknown command `:{0}` (try :help)")]
    Unknown(String),

    #[error("`:{command}` expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("`:{command}`: {value:?} is not a valid number")]
    InvalidNumber { command: &'static str, value: String },

    #[error("`:permission`: {0:?} is not NAME=GRANT")]
    InvalidGrant(String),
}

fn number<T: FromStr>(command: &'static str, value: &str) -> Result<T, HostCommandError> {
    value.parse().map_err(|_| HostCommandError::InvalidNumber {
        command,
        value: value.to_string(),
    })
}

fn required<'a>(
    command: &'static str,
    expected: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, HostCommandError> {
    value.ok_or(HostCommandError::MissingArgument { command, expected })
}

impl FromStr for HostEvent {
    type Err = HostCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let Some(command_line) = line.trim().strip_prefix(':') else {
            return Ok(HostEvent::Interaction);
        };

        let mut words = command_line.split_whitespace();
        let command = words.next().unwrap_or_default();

        let event = match command {
            "create" => HostEvent::Create,
            "save" => HostEvent::SaveState,
            "start" => HostEvent::Start,
            "pause" => HostEvent::Pause,
            "stop" => HostEvent::Stop,
            "destroy" => HostEvent::Destroy,
            "back" => HostEvent::BackPressed,
            "status" => HostEvent::Status,
            "help" => HostEvent::Help,
            "quit" | "exit" => HostEvent::Quit,
            "total" => {
                let secs = required("total", "SECONDS", words.next())?;
                HostEvent::SetTotalTimeout(Duration::from_secs(number("total", secs)?))
            }
            "warning" => {
                let secs = required("warning", "SECONDS", words.next())?;
                HostEvent::SetWarningTimeout(Duration::from_secs(number("warning", secs)?))
            }
            "permission" => {
                let code = required("permission", "CODE NAME=GRANT...", words.next())?;
                let request_code = number("permission", code)?;
                let mut permissions = Vec::new();
                let mut grant_results = Vec::new();
                for grant in words {
                    let (name, result) = grant
                        .split_once('=')
                        .ok_or_else(|| HostCommandError::InvalidGrant(grant.to_string()))?;
                    permissions.push(name.to_string());
                    grant_results.push(number("permission", result)?);
                }
                HostEvent::PermissionsResult {
                    request_code,
                    permissions,
                    grant_results,
                }
            }
            "result" => {
                let request = required("result", "REQUEST RESULT [DATA]", words.next())?;
                let result = required("result", "REQUEST RESULT [DATA]", words.next())?;
                let data = words.collect::<Vec<_>>().join(" ");
                HostEvent::ActivityResult {
                    request_code: number("result", request)?,
                    result_code: number("result", result)?,
                    data: (!data.is_empty()).then_some(data),
                }
            }
            other => return Err(HostCommandError::Unknown(other.to_string())),
        };

        Ok(event)
    }
}

/// What the caller should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFlow {
    Continue,
    ShowStatus,
    ShowHelp,
    Quit,
}

/// Terminal host owning the one registered activity bridge.
pub struct TerminalHost<L> {
    bridge: ActivityBridge<L>,
    settings: TimeoutSettings,
    saved_state: Bundle,
}

impl<L: LifecycleCallbacks> TerminalHost<L> {
    pub fn new(bridge: ActivityBridge<L>, settings: TimeoutSettings) -> Self {
        info!(activity = %bridge.activity().name, "Activity registered with terminal host");
        Self {
            bridge,
            settings,
            saved_state: Bundle::new(),
        }
    }

    pub fn bridge(&self) -> &ActivityBridge<L> {
        &self.bridge
    }

    pub fn saved_state(&self) -> &Bundle {
        &self.saved_state
    }

    /// Parse and dispatch one input line.
    pub fn handle_line(&mut self, line: &str) -> Result<HostFlow, HostCommandError> {
        let event = line.parse()?;
        Ok(self.dispatch(event))
    }

    /// Deliver one event to the bridge.
    pub fn dispatch(&mut self, event: HostEvent) -> HostFlow {
        match event {
            HostEvent::Interaction => self.bridge.on_user_interaction(),
            HostEvent::Create => {
                let restored = (!self.saved_state.is_empty()).then(|| self.saved_state.clone());
                self.bridge.on_create(
                    restored.as_ref(),
                    SuperCall::new("onCreate", || debug!("Default onCreate")),
                );
            }
            HostEvent::SaveState => {
                let mut out_state = Bundle::new();
                out_state.insert("saved_at".to_string(), chrono::Utc::now().to_rfc3339());
                self.bridge.on_save_instance_state(
                    &mut out_state,
                    SuperCall::new("onSaveInstanceState", || debug!("Default onSaveInstanceState")),
                );
                self.saved_state = out_state;
            }
            HostEvent::Start => self
                .bridge
                .on_start(SuperCall::new("onStart", || debug!("Default onStart"))),
            HostEvent::Pause => self
                .bridge
                .on_pause(SuperCall::new("onPause", || debug!("Default onPause"))),
            HostEvent::Stop => self
                .bridge
                .on_stop(SuperCall::new("onStop", || debug!("Default onStop"))),
            HostEvent::Destroy => self
                .bridge
                .on_destroy(SuperCall::new("onDestroy", || debug!("Default onDestroy"))),
            HostEvent::BackPressed => {
                // The default back handler finishes the activity.
                let finishing = Cell::new(false);
                self.bridge.on_back_pressed(SuperCall::new("onBackPressed", || {
                    finishing.set(true)
                }));
                if finishing.get() {
                    return self.finish();
                }
            }
            HostEvent::PermissionsResult {
                request_code,
                permissions,
                grant_results,
            } => self.bridge.on_request_permissions_result(
                request_code,
                &permissions,
                &grant_results,
                SuperCall::new("onRequestPermissionsResult", || {
                    debug!("Default onRequestPermissionsResult")
                }),
            ),
            HostEvent::ActivityResult {
                request_code,
                result_code,
                data,
            } => {
                let intent = data.map(|data| Intent {
                    action: None,
                    data: Some(data),
                });
                self.bridge.on_activity_result(
                    request_code,
                    result_code,
                    intent.as_ref(),
                    SuperCall::new("onActivityResult", || debug!("Default onActivityResult")),
                );
            }
            HostEvent::SetTotalTimeout(total) => {
                info!("Idle timeout set to {:?}", total);
                self.settings.set_total_timeout(total);
            }
            HostEvent::SetWarningTimeout(warning) => {
                info!("Warning lead time set to {:?}", warning);
                self.settings.set_warning_timeout(warning);
            }
            HostEvent::Status => return HostFlow::ShowStatus,
            HostEvent::Help => return HostFlow::ShowHelp,
            HostEvent::Quit => return self.finish(),
        }
        HostFlow::Continue
    }

    /// Run the teardown transitions and ask the caller to exit.
    fn finish(&mut self) -> HostFlow {
        self.dispatch(HostEvent::Stop);
        self.dispatch(HostEvent::Destroy);
        HostFlow::Quit
    }
}
