use std::fmt;
use std::time::Duration;

/// One address to verify, together with the source record it came from.
/// The row fields are carried through unchanged into the output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EmailCandidate {
    pub address: String,
    pub source_row: Vec<String>,
}

impl EmailCandidate {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            source_row: Vec::new(),
        }
    }

    pub fn with_row(address: impl Into<String>, source_row: Vec<String>) -> Self {
        Self {
            address: address.into(),
            source_row,
        }
    }
}

/// Terminal classification of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VerificationStatus {
    Valid,
    Invalid,
    /// The verification could not conclude; retrying may help. Never to be
    /// conflated with [`VerificationStatus::Invalid`].
    Unknown,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Invalid => f.write_str("invalid"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Why a candidate did not verify cleanly. Only [`Self::SmtpRejected`] and
/// [`Self::BounceDetected`] are confident negatives; the `*Unavailable` and
/// `*Failed` tags accompany [`VerificationStatus::Unknown`] so retries can be
/// targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VerdictReason {
    SyntaxError,
    NoMailExchanger,
    DnsUnavailable,
    SmtpRejected,
    SmtpUnavailable,
    SendFailed,
    BounceDetected,
    BounceCheckFailed,
}

impl VerdictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax error",
            Self::NoMailExchanger => "no mail exchanger",
            Self::DnsUnavailable => "dns unavailable",
            Self::SmtpRejected => "smtp rejected",
            Self::SmtpUnavailable => "smtp unavailable",
            Self::SendFailed => "send failed",
            Self::BounceDetected => "bounce detected",
            Self::BounceCheckFailed => "bounce check failed",
        }
    }
}

impl fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produced exactly once per candidate; immutable.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VerificationResult {
    pub candidate: EmailCandidate,
    pub status: VerificationStatus,
    pub reason: Option<VerdictReason>,
    /// Time from the first network action to the verdict. Syntax failures
    /// report zero: no network work was performed.
    pub elapsed: Duration,
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self.status, VerificationStatus::Valid)
    }

    /// Human-readable status cell, e.g. `invalid (smtp rejected)`.
    pub fn status_label(&self) -> String {
        match self.reason {
            Some(reason) => format!("{} ({reason})", self.status),
            None => self.status.to_string(),
        }
    }
}
