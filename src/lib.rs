//! Idlewatch - session idle timeout
//!
//! User interaction reported by the host UI is bridged onto a broadcast
//! channel; an idle timer service listening on that channel resets on every
//! interaction, warns shortly before the session times out and closes the
//! session when the idle timeout is reached.

pub mod activity;
pub mod alert;
pub mod config;
pub mod host;
pub mod logging;
pub mod timeout;
