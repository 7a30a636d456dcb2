//! Process-wide fan-out of user activity signals.

use tokio::sync::broadcast;
use tracing::trace;

/// Default buffer for pending signals per subscriber.
const DEFAULT_CAPACITY: usize = 16;

/// A user interacted with the device. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySignal;

/// Receiving half of an [`ActivityChannel`].
pub type ActivitySubscription = broadcast::Receiver<ActivitySignal>;

/// Publish/subscribe point for [`ActivitySignal`]s.
///
/// Cloning yields another handle to the same channel, so one instance built at
/// startup can be handed to the bridge and to every timer service.
#[derive(Debug, Clone)]
pub struct ActivityChannel {
    tx: broadcast::Sender<ActivitySignal>,
}

impl ActivityChannel {
    /// Create a channel with the default per-subscriber capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a channel buffering up to `capacity` signals per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to signals published from now on.
    pub fn subscribe(&self) -> ActivitySubscription {
        self.tx.subscribe()
    }

    /// Publish one signal. Returns how many subscribers will see it.
    pub fn publish(&self) -> usize {
        // No subscribers is fine: nobody is tracking idleness yet.
        let delivered = self.tx.send(ActivitySignal).unwrap_or(0);
        trace!(subscribers = delivered, "Activity signal published");
        delivered
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ActivityChannel {
    fn default() -> Self {
        Self::new()
    }
}
