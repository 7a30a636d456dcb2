//! User activity plumbing: the broadcast channel and the host bridge that feeds it.

mod bridge;
mod channel;

pub use bridge::{
    ActivityBridge, Bundle, HostActivity, Intent, LifecycleCallbacks, LoggingLifecycle, SuperCall,
};
pub use channel::{ActivityChannel, ActivitySignal, ActivitySubscription};
