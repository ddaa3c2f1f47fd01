//! DNS MX resolution.
//!
//! The public entry point is [`check_mx`], which performs a synchronous lookup
//! using the system resolver and returns a [`MxStatus`] describing the
//! outcome. "No MX records" is a status, not an error: the engine classifies
//! it as a confident negative, whereas a failed lookup stays an [`Error`] so
//! it can be reported as unknown rather than invalid.

mod error;
mod resolver;
mod types;

pub use error::MxError as Error;
pub use resolver::{check_mx, has_mail_exchanger};
pub use types::{MxRecord, MxStatus};
