//! Session event logging.

mod jsonl;

pub use jsonl::{JsonlLogger, SessionEvent, SessionTotals};
