//! Idle timer service: one task owning the timer, fed by activity signals.

use serde::Serialize;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, Sleep};
use tracing::{debug, info, warn};

use super::settings::TimeoutSettings;
use super::timer::{IdleTimer, TimerPhase, TICK_PERIOD_MS};
use crate::activity::{ActivitySignal, ActivitySubscription};
use crate::alert::{AlertMessages, AlertSink};

/// Delay before re-attempting a start while the total timeout is unset.
pub const RETRY_DELAY: Duration = Duration::from_millis(1_000);

const TICK_PERIOD: Duration = Duration::from_millis(TICK_PERIOD_MS);
const EVENT_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 16;

/// Notable things the service did, for observers such as the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeoutEvent {
    Started,
    StartDeferred { retry_in_ms: u64 },
    Tick { elapsed_ms: u64 },
    ActivityDetected { elapsed_ms: u64 },
    Warning { elapsed_ms: u64, remaining_ms: u64 },
    Expired { elapsed_ms: u64 },
    Stopped { elapsed_ms: u64 },
}

/// Snapshot of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerStatus {
    pub phase: TimerPhase,
    pub elapsed_ms: u64,
}

impl TimerStatus {
    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Start,
    Stop,
}

/// Idle timeout state machine bound to a tick source and an alert sink.
pub struct TimeoutService {
    settings: TimeoutSettings,
    alerts: Arc<dyn AlertSink>,
    messages: AlertMessages,
    timer: IdleTimer,
    /// The single live tick subscription.
    ticker: Option<Interval>,
    /// Pending deferred start.
    retry: Option<Pin<Box<Sleep>>>,
    events_tx: broadcast::Sender<TimeoutEvent>,
    status_tx: watch::Sender<TimerStatus>,
}

impl TimeoutService {
    pub fn new(settings: TimeoutSettings, alerts: Arc<dyn AlertSink>) -> Self {
        let timer = IdleTimer::new();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, _) = watch::channel(TimerStatus {
            phase: timer.phase(),
            elapsed_ms: timer.elapsed_ms(),
        });

        Self {
            settings,
            alerts,
            messages: AlertMessages::default(),
            timer,
            ticker: None,
            retry: None,
            events_tx,
            status_tx,
        }
    }

    /// Replace the default alert texts.
    pub fn with_messages(mut self, messages: AlertMessages) -> Self {
        self.messages = messages;
        self
    }

    /// Move the service onto its own task, listening on `activity`.
    ///
    /// The timer stays stopped until [`TimeoutHandle::start`] or the first
    /// activity signal.
    pub fn spawn(self, activity: ActivitySubscription) -> TimeoutHandle {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let status = self.status_tx.subscribe();
        let events = self.events_tx.clone();
        let settings = self.settings.clone();
        let task = tokio::spawn(self.run(activity, command_rx));

        TimeoutHandle {
            commands,
            status,
            events,
            settings,
            task,
        }
    }

    async fn run(
        mut self,
        mut activity: ActivitySubscription,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut listening = true;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Start) => self.start(),
                    Some(Command::Stop) => self.stop(),
                    None => break,
                },
                signal = activity.recv(), if listening => match signal {
                    Ok(ActivitySignal) => self.on_activity(),
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "Activity subscription lagged");
                        self.on_activity();
                    }
                    Err(RecvError::Closed) => {
                        warn!("Activity channel closed; idle timer will no longer reset");
                        listening = false;
                    }
                },
                _ = next_tick(&mut self.ticker) => self.on_tick(),
                _ = retry_due(&mut self.retry) => self.start(),
            }
        }

        self.stop();
        debug!("Timeout service exiting");
    }

    fn start(&mut self) {
        let thresholds = self.settings.thresholds();
        if !thresholds.is_configured() {
            let already_waiting = self.retry.is_some();
            self.retry = Some(Box::pin(time::sleep(RETRY_DELAY)));
            if !already_waiting {
                debug!("Total timeout not configured; deferring start by {:?}", RETRY_DELAY);
                self.emit(TimeoutEvent::StartDeferred {
                    retry_in_ms: RETRY_DELAY.as_millis() as u64,
                });
            }
            return;
        }

        self.retry = None;
        // Replacing the interval drops any previous subscription.
        self.ticker = Some(time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD));
        self.timer.begin();
        self.publish_status();

        debug!(
            total_ms = thresholds.total_ms,
            warning_ms = thresholds.warning_ms,
            "Idle timer started"
        );
        self.emit(TimeoutEvent::Started);
    }

    /// Release the tick subscription. A pending deferred start keeps polling
    /// and is only replaced by the next `start()`.
    fn stop(&mut self) {
        self.ticker = None;

        if self.timer.halt() {
            self.publish_status();
            debug!(elapsed_ms = self.timer.elapsed_ms(), "Idle timer stopped");
            self.emit(TimeoutEvent::Stopped {
                elapsed_ms: self.timer.elapsed_ms(),
            });
        }
    }

    fn on_activity(&mut self) {
        self.emit(TimeoutEvent::ActivityDetected {
            elapsed_ms: self.timer.elapsed_ms(),
        });
        self.stop();
        self.start();
    }

    fn on_tick(&mut self) {
        let thresholds = self.settings.thresholds();
        let report = self.timer.tick(thresholds);

        debug!("Time elapsed: {} second(s)", report.elapsed_ms / 1_000);
        self.publish_status();
        self.emit(TimeoutEvent::Tick {
            elapsed_ms: report.elapsed_ms,
        });

        if report.warning {
            let remaining_ms = thresholds.total_ms.saturating_sub(report.elapsed_ms);
            info!(elapsed_ms = report.elapsed_ms, remaining_ms, "Session about to close");
            self.alerts.alert(&self.messages.warning);
            self.emit(TimeoutEvent::Warning {
                elapsed_ms: report.elapsed_ms,
                remaining_ms,
            });
        }

        if report.expired {
            // The timer already halted itself; release the tick subscription.
            self.ticker = None;
            self.emit(TimeoutEvent::Stopped {
                elapsed_ms: report.elapsed_ms,
            });
            info!(elapsed_ms = report.elapsed_ms, "Session closed after idle timeout");
            self.alerts.alert(&self.messages.closed);
            self.emit(TimeoutEvent::Expired {
                elapsed_ms: report.elapsed_ms,
            });
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(TimerStatus {
            phase: self.timer.phase(),
            elapsed_ms: self.timer.elapsed_ms(),
        });
    }

    fn emit(&self, event: TimeoutEvent) {
        // Nobody listening is normal.
        let _ = self.events_tx.send(event);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn retry_due(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

/// Control surface of a spawned [`TimeoutService`].
#[derive(Debug)]
pub struct TimeoutHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<TimerStatus>,
    events: broadcast::Sender<TimeoutEvent>,
    settings: TimeoutSettings,
    task: JoinHandle<()>,
}

impl TimeoutHandle {
    /// Start the idle timer, deferring while the total timeout is zero.
    pub async fn start(&self) {
        self.send(Command::Start).await;
    }

    /// Stop the idle timer. Stopping a stopped timer does nothing.
    pub async fn stop(&self) {
        self.send(Command::Stop).await;
    }

    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            warn!(?command, "Timeout service is no longer running");
        }
    }

    pub fn status(&self) -> TimerStatus {
        *self.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Subscribe to service events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TimeoutEvent> {
        self.events.subscribe()
    }

    /// Thresholds the service evaluates; changes apply from the next tick.
    pub fn settings(&self) -> &TimeoutSettings {
        &self.settings
    }

    /// Stop the timer and wait for the service task to finish.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!("Timeout service task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityChannel;
    use crate::alert::testing::RecordingAlert;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::sleep;

    const WARNING: &str = "Session is about to close";
    const CLOSED: &str = "Session closed";

    struct Fixture {
        handle: TimeoutHandle,
        channel: ActivityChannel,
        alerts: Arc<RecordingAlert>,
        events: broadcast::Receiver<TimeoutEvent>,
    }

    fn spawn(settings: TimeoutSettings) -> Fixture {
        let channel = ActivityChannel::new();
        let alerts = Arc::new(RecordingAlert::default());
        let handle = TimeoutService::new(settings, alerts.clone()).spawn(channel.subscribe());
        let events = handle.subscribe();
        Fixture {
            handle,
            channel,
            alerts,
            events,
        }
    }

    fn secs(total: u64, warning: u64) -> TimeoutSettings {
        TimeoutSettings::new(Duration::from_secs(total), Duration::from_secs(warning))
    }

    async fn wait_for(
        events: &mut broadcast::Receiver<TimeoutEvent>,
        wanted: impl Fn(&TimeoutEvent) -> bool,
    ) -> TimeoutEvent {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if wanted(&event) {
                return event;
            }
        }
    }

    fn drain(events: &mut broadcast::Receiver<TimeoutEvent>) -> Vec<TimeoutEvent> {
        let mut seen = Vec::new();
        loop {
            match events.try_recv() {
                Ok(event) => seen.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_tracks_tick_count() {
        let f = spawn(secs(120, 60));
        f.handle.start().await;

        sleep(Duration::from_millis(7_500)).await;

        assert_eq!(
            f.handle.status(),
            TimerStatus {
                phase: TimerPhase::Running,
                elapsed_ms: 7_000
            }
        );
        assert!(f.alerts.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closes_session_after_total_timeout() {
        let mut f = spawn(secs(5, 60));
        f.handle.start().await;

        sleep(Duration::from_millis(4_500)).await;
        assert!(f.handle.is_running());
        assert!(f.alerts.messages().is_empty());

        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(f.alerts.messages(), vec![CLOSED]);
        assert_eq!(
            f.handle.status(),
            TimerStatus {
                phase: TimerPhase::Stopped,
                elapsed_ms: 5_000
            }
        );

        let events = drain(&mut f.events);
        assert!(events.contains(&TimeoutEvent::Expired { elapsed_ms: 5_000 }));
        assert!(events.contains(&TimeoutEvent::Stopped { elapsed_ms: 5_000 }));

        // No further ticks once stopped.
        sleep(Duration::from_secs(10)).await;
        assert_eq!(f.handle.status().elapsed_ms, 5_000);
        assert_eq!(f.alerts.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn warns_once_then_closes() {
        let mut f = spawn(secs(10, 4));
        f.handle.start().await;

        sleep(Duration::from_millis(6_500)).await;
        assert_eq!(f.alerts.messages(), vec![WARNING]);
        assert!(f.handle.is_running());

        sleep(Duration::from_millis(4_000)).await;
        assert_eq!(f.alerts.messages(), vec![WARNING, CLOSED]);
        assert!(!f.handle.is_running());

        let events = drain(&mut f.events);
        assert!(events.contains(&TimeoutEvent::Warning {
            elapsed_ms: 6_000,
            remaining_ms: 4_000
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_restarts_the_count() {
        let mut f = spawn(secs(5, 60));
        f.handle.start().await;

        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(f.handle.status().elapsed_ms, 3_000);

        drain(&mut f.events);
        f.channel.publish();
        wait_for(&mut f.events, |e| *e == TimeoutEvent::Started).await;
        assert_eq!(
            f.handle.status(),
            TimerStatus {
                phase: TimerPhase::Running,
                elapsed_ms: 0
            }
        );

        // Expiry is now measured from the reset at 3.5s, i.e. at 8.5s.
        sleep(Duration::from_millis(4_600)).await;
        assert!(f.handle.is_running());
        assert_eq!(f.handle.status().elapsed_ms, 4_000);

        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(f.alerts.messages(), vec![CLOSED]);
        assert!(!f.handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_signals_leave_one_ticker() {
        let mut f = spawn(secs(120, 60));
        f.handle.start().await;
        sleep(Duration::from_millis(2_500)).await;

        drain(&mut f.events);
        f.channel.publish();
        f.channel.publish();
        wait_for(&mut f.events, |e| *e == TimeoutEvent::Started).await;
        wait_for(&mut f.events, |e| *e == TimeoutEvent::Started).await;
        assert_eq!(f.handle.status().elapsed_ms, 0);
        assert!(f.handle.is_running());

        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(f.handle.status().elapsed_ms, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_restarts_a_stopped_timer() {
        let mut f = spawn(secs(2, 60));
        f.handle.start().await;
        sleep(Duration::from_millis(2_500)).await;
        assert!(!f.handle.is_running());

        drain(&mut f.events);
        f.channel.publish();
        wait_for(&mut f.events, |e| *e == TimeoutEvent::Started).await;
        assert_eq!(f.handle.status().elapsed_ms, 0);
        assert!(f.handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let mut f = spawn(secs(5, 60));
        f.handle.start().await;
        sleep(Duration::from_millis(1_500)).await;

        f.handle.stop().await;
        f.handle.stop().await;
        sleep(Duration::from_millis(10)).await;

        let stops = drain(&mut f.events)
            .into_iter()
            .filter(|e| matches!(e, TimeoutEvent::Stopped { .. }))
            .count();
        assert_eq!(stops, 1);
        assert_eq!(
            f.handle.status(),
            TimerStatus {
                phase: TimerPhase::Stopped,
                elapsed_ms: 1_000
            }
        );

        sleep(Duration::from_secs(10)).await;
        assert!(f.alerts.messages().is_empty());
        assert_eq!(f.handle.status().elapsed_ms, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_start_waits_for_total_timeout() {
        let mut f = spawn(TimeoutSettings::unconfigured());
        f.handle.start().await;

        sleep(Duration::from_millis(5_500)).await;
        assert!(!f.handle.is_running());
        assert!(f.alerts.messages().is_empty());

        let events = drain(&mut f.events);
        assert_eq!(events, vec![TimeoutEvent::StartDeferred { retry_in_ms: 1_000 }]);

        // Next retry lands at 6s; three ticks later the session closes.
        f.handle.settings().set_total_timeout(Duration::from_secs(3));
        sleep(Duration::from_millis(1_000)).await;
        assert!(f.handle.is_running());

        sleep(Duration::from_millis(3_000)).await;
        assert_eq!(f.alerts.messages(), vec![CLOSED]);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_start_survives_stop() {
        let f = spawn(TimeoutSettings::unconfigured());
        f.handle.start().await;
        sleep(Duration::from_millis(500)).await;
        f.handle.stop().await;

        // The retry still due at 1s picks up the new total.
        f.handle.settings().set_total_timeout(Duration::from_secs(3));
        sleep(Duration::from_millis(2_000)).await;
        assert!(f.handle.is_running());
        assert_eq!(f.handle.status().elapsed_ms, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_while_unconfigured_defers_once() {
        let mut f = spawn(TimeoutSettings::unconfigured());
        f.handle.start().await;
        sleep(Duration::from_millis(200)).await;

        for _ in 0..3 {
            f.channel.publish();
            sleep(Duration::from_millis(200)).await;
        }

        let deferrals = drain(&mut f.events)
            .into_iter()
            .filter(|e| matches!(e, TimeoutEvent::StartDeferred { .. }))
            .count();
        assert_eq!(deferrals, 1);
        assert!(!f.handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn shortened_timeout_applies_on_next_tick() {
        let f = spawn(secs(10, 4));
        f.handle.start().await;
        sleep(Duration::from_millis(2_500)).await;

        f.handle.settings().set_total_timeout(Duration::from_secs(3));
        sleep(Duration::from_millis(1_000)).await;

        assert_eq!(f.alerts.messages(), vec![CLOSED]);
        assert_eq!(f.handle.status().elapsed_ms, 3_000);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_messages_are_presented() {
        let channel = ActivityChannel::new();
        let alerts = Arc::new(RecordingAlert::default());
        let handle = TimeoutService::new(secs(2, 1), alerts.clone())
            .with_messages(AlertMessages {
                warning: "one second left".into(),
                closed: "logged out".into(),
            })
            .spawn(channel.subscribe());
        handle.start().await;

        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(alerts.messages(), vec!["one second left", "logged out"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_the_task() {
        let f = spawn(secs(5, 1));
        f.handle.start().await;
        sleep(Duration::from_millis(1_500)).await;

        let mut events = f.handle.subscribe();
        f.handle.shutdown().await;

        assert_eq!(
            events.recv().await,
            Ok(TimeoutEvent::Stopped { elapsed_ms: 1_000 })
        );
    }
}
