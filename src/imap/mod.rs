//! IMAP bounce monitoring for the send-and-wait strategy.
//!
//! [`ImapBounceMonitor::await_bounce`] polls the account inbox on a fixed
//! interval until either a non-delivery notice matching the probed address
//! shows up (early exit) or the configured deadline elapses. What counts as
//! a bounce is decided by a pluggable [`BounceClassifier`]; the default
//! [`KeywordClassifier`] uses subject markers plus the address verbatim in
//! the body.

mod classifier;
mod error;
mod monitor;
mod session;

pub use classifier::{BounceClassifier, FetchedMessage, KeywordClassifier};
pub use error::ImapError;
pub use monitor::{BounceVerdict, BounceWatch, ImapBounceMonitor};
pub use session::{ImapResponse, ImapSession, ImapStatus};
