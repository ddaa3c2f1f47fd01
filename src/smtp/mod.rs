//! SMTP probing against a configured outbound relay.
//!
//! Two operations share one session shape (connect, EHLO, STARTTLS, EHLO
//! again, `AUTH PLAIN`): [`RelayProbe::rcpt_probe`] asks the relay whether it
//! accepts a recipient and reads the numeric reply, and
//! [`RelayProbe::send_probe`] delivers a tokenised test message so that the
//! bounce monitor can later look for a matching non-delivery notice.

mod error;
mod message;
mod probe;
mod session;

pub use error::SmtpError;
pub use message::{build_probe_message, probe_token};
pub use probe::{ProbeOutcome, RelayProbe, SendOutcome};
pub use session::{SmtpReply, SmtpSession};
