//! Host lifecycle bridge.
//!
//! The bridge sits where the host UI runtime reports events. User interaction
//! becomes an [`ActivitySignal`](super::ActivitySignal) on the shared channel;
//! every lifecycle transition is handed, payload and continuation untouched,
//! to a delegated [`LifecycleCallbacks`] implementation.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use super::ActivityChannel;

/// Saved instance state handed to create / save-state callbacks.
pub type Bundle = BTreeMap<String, String>;

/// Identity of the host activity a callback concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostActivity {
    pub name: String,
}

impl HostActivity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Result payload returned to an activity by another one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intent {
    pub action: Option<String>,
    pub data: Option<String>,
}

/// Continuation into the host's default handler for a callback.
pub struct SuperCall<'a> {
    label: &'static str,
    call: Box<dyn FnOnce() + 'a>,
}

impl<'a> SuperCall<'a> {
    pub fn new(label: &'static str, call: impl FnOnce() + 'a) -> Self {
        Self {
            label,
            call: Box::new(call),
        }
    }

    /// A continuation for hosts that have no default behaviour.
    pub fn noop(label: &'static str) -> Self {
        Self::new(label, || {})
    }

    /// Name of the default handler this continues into.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run the default handler.
    pub fn invoke(self) {
        (self.call)()
    }
}

impl fmt::Debug for SuperCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperCall").field("label", &self.label).finish()
    }
}

/// Lifecycle handler the bridge delegates to.
///
/// Implementations decide whether and when to run `super_call`.
pub trait LifecycleCallbacks: Send + Sync {
    fn on_create(
        &self,
        activity: &HostActivity,
        saved_state: Option<&Bundle>,
        super_call: SuperCall<'_>,
    );

    fn on_save_instance_state(
        &self,
        activity: &HostActivity,
        out_state: &mut Bundle,
        super_call: SuperCall<'_>,
    );

    fn on_start(&self, activity: &HostActivity, super_call: SuperCall<'_>);

    fn on_pause(&self, activity: &HostActivity, super_call: SuperCall<'_>);

    fn on_stop(&self, activity: &HostActivity, super_call: SuperCall<'_>);

    fn on_destroy(&self, activity: &HostActivity, super_call: SuperCall<'_>);

    fn on_back_pressed(&self, activity: &HostActivity, super_call: SuperCall<'_>);

    fn on_request_permissions_result(
        &self,
        activity: &HostActivity,
        request_code: i32,
        permissions: &[String],
        grant_results: &[i32],
        super_call: SuperCall<'_>,
    );

    fn on_activity_result(
        &self,
        activity: &HostActivity,
        request_code: i32,
        result_code: i32,
        data: Option<&Intent>,
        super_call: SuperCall<'_>,
    );
}

/// Bridge between the host runtime and the activity channel.
///
/// The delegate is required up front, so no lifecycle callback can arrive
/// before one is installed.
pub struct ActivityBridge<L> {
    activity: HostActivity,
    channel: ActivityChannel,
    callbacks: L,
}

impl<L: LifecycleCallbacks> ActivityBridge<L> {
    pub fn new(activity: HostActivity, channel: ActivityChannel, callbacks: L) -> Self {
        debug!(activity = %activity.name, "Activity bridge created");
        Self {
            activity,
            channel,
            callbacks,
        }
    }

    pub fn activity(&self) -> &HostActivity {
        &self.activity
    }

    pub fn callbacks(&self) -> &L {
        &self.callbacks
    }

    /// The host saw some user interaction.
    pub fn on_user_interaction(&self) {
        let subscribers = self.channel.publish();
        debug!(subscribers, "User interaction");
    }

    pub fn on_create(&self, saved_state: Option<&Bundle>, super_call: SuperCall<'_>) {
        self.callbacks.on_create(&self.activity, saved_state, super_call);
    }

    pub fn on_save_instance_state(&self, out_state: &mut Bundle, super_call: SuperCall<'_>) {
        self.callbacks
            .on_save_instance_state(&self.activity, out_state, super_call);
    }

    pub fn on_start(&self, super_call: SuperCall<'_>) {
        self.callbacks.on_start(&self.activity, super_call);
    }

    pub fn on_pause(&self, super_call: SuperCall<'_>) {
        self.callbacks.on_pause(&self.activity, super_call);
    }

    pub fn on_stop(&self, super_call: SuperCall<'_>) {
        self.callbacks.on_stop(&self.activity, super_call);
    }

    pub fn on_destroy(&self, super_call: SuperCall<'_>) {
        self.callbacks.on_destroy(&self.activity, super_call);
    }

    pub fn on_back_pressed(&self, super_call: SuperCall<'_>) {
        self.callbacks.on_back_pressed(&self.activity, super_call);
    }

    pub fn on_request_permissions_result(
        &self,
        request_code: i32,
        permissions: &[String],
        grant_results: &[i32],
        super_call: SuperCall<'_>,
    ) {
        self.callbacks.on_request_permissions_result(
            &self.activity,
            request_code,
            permissions,
            grant_results,
            super_call,
        );
    }

    pub fn on_activity_result(
        &self,
        request_code: i32,
        result_code: i32,
        data: Option<&Intent>,
        super_call: SuperCall<'_>,
    ) {
        self.callbacks.on_activity_result(
            &self.activity,
            request_code,
            result_code,
            data,
            super_call,
        );
    }
}

/// Delegate that logs each transition and then runs the default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLifecycle;

impl LoggingLifecycle {
    fn forward(&self, activity: &HostActivity, super_call: SuperCall<'_>) {
        debug!(activity = %activity.name, callback = super_call.label(), "Lifecycle transition");
        super_call.invoke();
    }
}

impl LifecycleCallbacks for LoggingLifecycle {
    fn on_create(
        &self,
        activity: &HostActivity,
        saved_state: Option<&Bundle>,
        super_call: SuperCall<'_>,
    ) {
        debug!(
            restored_keys = saved_state.map(|s| s.len()).unwrap_or(0),
            "Restoring instance state"
        );
        self.forward(activity, super_call);
    }

    fn on_save_instance_state(
        &self,
        activity: &HostActivity,
        out_state: &mut Bundle,
        super_call: SuperCall<'_>,
    ) {
        debug!(saved_keys = out_state.len(), "Saving instance state");
        self.forward(activity, super_call);
    }

    fn on_start(&self, activity: &HostActivity, super_call: SuperCall<'_>) {
        self.forward(activity, super_call);
    }

    fn on_pause(&self, activity: &HostActivity, super_call: SuperCall<'_>) {
        self.forward(activity, super_call);
    }

    fn on_stop(&self, activity: &HostActivity, super_call: SuperCall<'_>) {
        self.forward(activity, super_call);
    }

    fn on_destroy(&self, activity: &HostActivity, super_call: SuperCall<'_>) {
        self.forward(activity, super_call);
    }

    fn on_back_pressed(&self, activity: &HostActivity, super_call: SuperCall<'_>) {
        self.forward(activity, super_call);
    }

    fn on_request_permissions_result(
        &self,
        activity: &HostActivity,
        request_code: i32,
        permissions: &[String],
        grant_results: &[i32],
        super_call: SuperCall<'_>,
    ) {
        info!(
            request_code,
            ?permissions,
            ?grant_results,
            "Permission request answered"
        );
        self.forward(activity, super_call);
    }

    fn on_activity_result(
        &self,
        activity: &HostActivity,
        request_code: i32,
        result_code: i32,
        data: Option<&Intent>,
        super_call: SuperCall<'_>,
    ) {
        info!(request_code, result_code, ?data, "Activity result received");
        self.forward(activity, super_call);
    }
}
