use std::borrow::Cow;
use std::time::Duration;

/// Which of the two verification strategies the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProbeStrategy {
    /// MX lookup plus a `RCPT TO` probe through the relay. Cheap, no message
    /// is delivered.
    ProbeOnly,
    /// Transmit a real test message and watch the mailbox for a bounce. The
    /// only strategy that observes actual delivery behaviour, at the cost of
    /// the full bounce window per candidate.
    SendAndWait,
}

/// Read-only per-batch configuration: one credentialed mail account, the
/// relay and mailbox endpoints, and the timing knobs of both strategies.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Mail account identity, also the envelope sender of probes.
    pub account: String,
    /// App password or equivalent credential for SMTP AUTH and IMAP LOGIN.
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub imap_host: String,
    pub imap_port: u16,
    /// Hostname announced in EHLO; defaults to the account's domain.
    pub helo_domain: Option<String>,
    pub strategy: ProbeStrategy,
    /// How long the bounce monitor waits for a non-delivery notice.
    pub bounce_wait: Duration,
    /// Interval between mailbox scans during the bounce watch.
    pub poll_interval: Duration,
    /// Pause after a successful send before the first mailbox scan, letting
    /// the message and an eventual bounce transit.
    pub settle_delay: Duration,
    /// Minimum interval between consecutive probe starts (rate-limit pacing).
    pub probe_delay: Duration,
    /// Per-operation network timeout (connect, each protocol round-trip).
    /// Zero disables the deadline.
    pub command_timeout: Duration,
    pub require_starttls: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            password: String::new(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            imap_host: "imap.gmail.com".to_string(),
            imap_port: 993,
            helo_domain: None,
            strategy: ProbeStrategy::ProbeOnly,
            bounce_wait: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(10),
            probe_delay: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            require_starttls: true,
        }
    }
}

impl VerificationConfig {
    /// Hostname for `EHLO`; falls back to the account's own domain, then to
    /// `localhost` when the account is not an address.
    pub fn helo(&self) -> Cow<'_, str> {
        if let Some(helo) = self.helo_domain.as_deref().filter(|h| !h.is_empty()) {
            return Cow::Borrowed(helo);
        }
        match self.account.rsplit_once('@') {
            Some((_, domain)) if !domain.is_empty() => Cow::Borrowed(domain),
            _ => Cow::Borrowed("localhost"),
        }
    }

    /// The per-operation timeout as an `Option`; zero disables it.
    pub fn timeout(&self) -> Option<Duration> {
        if self.command_timeout.is_zero() {
            None
        } else {
            Some(self.command_timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helo_falls_back_to_account_domain() {
        let config = VerificationConfig {
            account: "probe@example.com".to_string(),
            ..VerificationConfig::default()
        };
        assert_eq!(config.helo(), "example.com");

        let explicit = VerificationConfig {
            helo_domain: Some("probe.example.org".to_string()),
            ..config.clone()
        };
        assert_eq!(explicit.helo(), "probe.example.org");

        let bare = VerificationConfig {
            account: "not-an-address".to_string(),
            ..VerificationConfig::default()
        };
        assert_eq!(bare.helo(), "localhost");
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = VerificationConfig {
            command_timeout: Duration::ZERO,
            ..VerificationConfig::default()
        };
        assert_eq!(config.timeout(), None);
    }
}
