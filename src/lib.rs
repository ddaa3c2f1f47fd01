#![forbid(unsafe_code)]
//! mailprobe — email deliverability probing.
//!
//! The pipeline runs four gates per candidate address: structural syntax
//! validation, DNS MX resolution, an authenticated SMTP probe against a
//! configured relay, and (under the send-and-wait strategy) an IMAP bounce
//! watch that polls the account mailbox for a non-delivery notice within a
//! bounded window. [`engine::Verifier`] folds those into one verdict per
//! address; [`batch::run_batch`] iterates a row range with rate-limit
//! pacing.

pub mod batch;
pub mod cancel;
pub mod engine;
pub mod imap;
pub mod mx;
pub mod smtp;
pub mod syntax;

pub use batch::{BatchReport, RowRange, run_batch};
pub use cancel::CancelFlag;
pub use engine::{
    DefaultVerifier, EmailCandidate, ProbeStrategy, VerdictReason, VerificationConfig,
    VerificationResult, VerificationStatus, Verifier,
};
pub use imap::{BounceClassifier, BounceVerdict, BounceWatch, ImapBounceMonitor, KeywordClassifier};
pub use mx::{Error as MxError, MxRecord, MxStatus, check_mx, has_mail_exchanger};
pub use smtp::{ProbeOutcome, RelayProbe, SendOutcome, SmtpError};
pub use syntax::{is_valid_syntax, split_address};
