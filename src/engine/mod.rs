//! Per-candidate verification: the state machine that turns one address into
//! one [`VerificationResult`].
//!
//! The three network components sit behind trait seams
//! ([`MailExchangerCheck`], [`RecipientProbe`], [`BounceWatcher`]) so that
//! the state machine can be exercised against stubs; the invariant that a
//! syntax failure performs zero network work is asserted that way.

mod config;
mod types;

pub use config::{ProbeStrategy, VerificationConfig};
pub use types::{EmailCandidate, VerdictReason, VerificationResult, VerificationStatus};

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::imap::{
    BounceClassifier, BounceVerdict, BounceWatch, ImapBounceMonitor, ImapError, KeywordClassifier,
};
use crate::mx::{self, Error as MxError};
use crate::smtp::{ProbeOutcome, RelayProbe, SendOutcome, SmtpError};
use crate::syntax::{is_valid_syntax, split_address};

/// Does the candidate's domain accept mail at all.
pub trait MailExchangerCheck {
    fn has_mail_exchanger(&self, domain: &str) -> Result<bool, MxError>;
}

/// MX lookup against the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDns;

impl MailExchangerCheck for SystemDns {
    fn has_mail_exchanger(&self, domain: &str) -> Result<bool, MxError> {
        mx::has_mail_exchanger(domain)
    }
}

/// The two relay operations the engine needs.
pub trait RecipientProbe {
    fn rcpt_probe(&self, address: &str) -> Result<ProbeOutcome, SmtpError>;
    fn send_probe(&self, address: &str) -> Result<SendOutcome, SmtpError>;
}

impl RecipientProbe for RelayProbe {
    fn rcpt_probe(&self, address: &str) -> Result<ProbeOutcome, SmtpError> {
        RelayProbe::rcpt_probe(self, address)
    }

    fn send_probe(&self, address: &str) -> Result<SendOutcome, SmtpError> {
        RelayProbe::send_probe(self, address)
    }
}

/// Watches the mailbox for a bounce matching one sent probe.
pub trait BounceWatcher {
    fn await_bounce(
        &self,
        watch: &BounceWatch,
        cancel: &CancelFlag,
    ) -> Result<BounceVerdict, ImapError>;
}

/// Real IMAP watcher: a monitor plus the classifier deciding what counts as
/// a bounce.
pub struct MailboxBounceWatcher {
    pub monitor: ImapBounceMonitor,
    pub classifier: Box<dyn BounceClassifier + Send + Sync>,
}

impl BounceWatcher for MailboxBounceWatcher {
    fn await_bounce(
        &self,
        watch: &BounceWatch,
        cancel: &CancelFlag,
    ) -> Result<BounceVerdict, ImapError> {
        self.monitor
            .await_bounce(watch, self.classifier.as_ref(), cancel)
    }
}

/// Orchestrates syntax check, MX lookup, SMTP probe and bounce watch into a
/// single per-address verdict under the configured strategy.
pub struct Verifier<M, P, B> {
    config: VerificationConfig,
    dns: M,
    probe: P,
    watcher: B,
}

/// The fully wired verifier used outside of tests.
pub type DefaultVerifier = Verifier<SystemDns, RelayProbe, MailboxBounceWatcher>;

impl DefaultVerifier {
    /// Wires the real DNS, SMTP and IMAP components from `config`, with the
    /// default keyword bounce classifier.
    pub fn from_config(config: VerificationConfig) -> Self {
        Self::with_classifier(config, Box::new(KeywordClassifier::default()))
    }

    /// Same wiring with a caller-supplied bounce classifier.
    pub fn with_classifier(
        config: VerificationConfig,
        classifier: Box<dyn BounceClassifier + Send + Sync>,
    ) -> Self {
        let probe = RelayProbe {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            username: config.account.clone(),
            password: config.password.clone(),
            helo: config.helo().into_owned(),
            timeout: config.timeout(),
            require_starttls: config.require_starttls,
        };
        let watcher = MailboxBounceWatcher {
            monitor: ImapBounceMonitor {
                host: config.imap_host.clone(),
                port: config.imap_port,
                username: config.account.clone(),
                password: config.password.clone(),
                timeout: config.timeout(),
            },
            classifier,
        };
        Verifier {
            config,
            dns: SystemDns,
            probe,
            watcher,
        }
    }
}

impl<M, P, B> Verifier<M, P, B>
where
    M: MailExchangerCheck,
    P: RecipientProbe,
    B: BounceWatcher,
{
    /// Assembles a verifier from explicit components; the test seam.
    pub fn with_components(config: VerificationConfig, dns: M, probe: P, watcher: B) -> Self {
        Self {
            config,
            dns,
            probe,
            watcher,
        }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Produces exactly one verdict for `candidate`. Elapsed time covers the
    /// first network action to the verdict; a syntax failure reports zero.
    pub fn verify(&self, candidate: EmailCandidate, cancel: &CancelFlag) -> VerificationResult {
        if !is_valid_syntax(&candidate.address) {
            debug!(address = %candidate.address, "syntax check failed, no network work");
            return VerificationResult {
                candidate,
                status: VerificationStatus::Invalid,
                reason: Some(VerdictReason::SyntaxError),
                elapsed: Duration::ZERO,
            };
        }

        let started = Instant::now();
        let (status, reason) = match self.config.strategy {
            ProbeStrategy::ProbeOnly => self.probe_only(&candidate.address),
            ProbeStrategy::SendAndWait => self.send_and_wait(&candidate.address, cancel),
        };
        let elapsed = started.elapsed();
        debug!(
            address = %candidate.address,
            %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "verdict reached"
        );
        VerificationResult {
            candidate,
            status,
            reason,
            elapsed,
        }
    }

    fn probe_only(&self, address: &str) -> (VerificationStatus, Option<VerdictReason>) {
        let Some((_, domain)) = split_address(address) else {
            // unreachable once the syntax gate passed
            return (
                VerificationStatus::Invalid,
                Some(VerdictReason::SyntaxError),
            );
        };

        match self.dns.has_mail_exchanger(domain) {
            Ok(false) => {
                return (
                    VerificationStatus::Invalid,
                    Some(VerdictReason::NoMailExchanger),
                );
            }
            Err(err) => {
                warn!(domain, error = %err, "MX lookup did not conclude");
                return (
                    VerificationStatus::Unknown,
                    Some(VerdictReason::DnsUnavailable),
                );
            }
            Ok(true) => {}
        }

        match self.probe.rcpt_probe(address) {
            Ok(ProbeOutcome::Accepted(_)) => (VerificationStatus::Valid, None),
            Ok(ProbeOutcome::Rejected(_)) => (
                VerificationStatus::Invalid,
                Some(VerdictReason::SmtpRejected),
            ),
            Ok(ProbeOutcome::Indeterminate(reply)) => {
                warn!(address, code = reply.code, "inconclusive RCPT reply");
                (
                    VerificationStatus::Unknown,
                    Some(VerdictReason::SmtpUnavailable),
                )
            }
            Err(err) => {
                warn!(address, error = %err, "smtp probe failed");
                (
                    VerificationStatus::Unknown,
                    Some(VerdictReason::SmtpUnavailable),
                )
            }
        }
    }

    fn send_and_wait(
        &self,
        address: &str,
        cancel: &CancelFlag,
    ) -> (VerificationStatus, Option<VerdictReason>) {
        match self.probe.send_probe(address) {
            Ok(SendOutcome::Sent { token, .. }) => {
                debug!(address, %token, "probe sent, settling before bounce watch");
            }
            Ok(SendOutcome::Refused(reply)) => {
                warn!(address, code = reply.code, "relay refused probe");
                return (VerificationStatus::Invalid, Some(VerdictReason::SendFailed));
            }
            Err(err) => {
                warn!(address, error = %err, "probe transmission failed");
                return (VerificationStatus::Invalid, Some(VerdictReason::SendFailed));
            }
        }

        if !cancel.sleep(self.config.settle_delay) {
            return (
                VerificationStatus::Unknown,
                Some(VerdictReason::BounceCheckFailed),
            );
        }

        let watch = BounceWatch {
            target_address: address.to_string(),
            deadline: self.config.bounce_wait,
            poll_interval: self.config.poll_interval,
        };
        match self.watcher.await_bounce(&watch, cancel) {
            Ok(BounceVerdict::Bounced) => (
                VerificationStatus::Invalid,
                Some(VerdictReason::BounceDetected),
            ),
            Ok(BounceVerdict::Clean) => (VerificationStatus::Valid, None),
            Ok(BounceVerdict::Interrupted) => (
                VerificationStatus::Unknown,
                Some(VerdictReason::BounceCheckFailed),
            ),
            Err(err) => {
                warn!(address, error = %err, "bounce watch failed");
                (
                    VerificationStatus::Unknown,
                    Some(VerdictReason::BounceCheckFailed),
                )
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::smtp::SmtpReply;
    use std::cell::Cell;
    use std::io;
    use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum DnsScript {
        Records,
        NoRecords,
        Transient,
    }

    pub(crate) struct StubDns {
        pub script: DnsScript,
        pub calls: Cell<usize>,
    }

    impl StubDns {
        pub fn new(script: DnsScript) -> Self {
            Self {
                script,
                calls: Cell::new(0),
            }
        }
    }

    impl MailExchangerCheck for &StubDns {
        fn has_mail_exchanger(&self, _domain: &str) -> Result<bool, MxError> {
            self.calls.set(self.calls.get() + 1);
            match self.script {
                DnsScript::Records => Ok(true),
                DnsScript::NoRecords => Ok(false),
                DnsScript::Transient => Err(MxError::Lookup {
                    source: ResolveError::from(ResolveErrorKind::Message("timed out")),
                }),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum ProbeScript {
        Accept,
        Reject,
        Tempfail,
        ConnectError,
        SendOk,
        SendRefused,
    }

    pub(crate) struct StubProbe {
        pub script: ProbeScript,
        pub calls: Cell<usize>,
    }

    impl StubProbe {
        pub fn new(script: ProbeScript) -> Self {
            Self {
                script,
                calls: Cell::new(0),
            }
        }
    }

    fn reply(code: u16) -> SmtpReply {
        SmtpReply {
            code,
            lines: vec!["stub".to_string()],
        }
    }

    fn connect_error() -> SmtpError {
        SmtpError::Connect {
            host: "relay.test".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        }
    }

    impl RecipientProbe for &StubProbe {
        fn rcpt_probe(&self, _address: &str) -> Result<ProbeOutcome, SmtpError> {
            self.calls.set(self.calls.get() + 1);
            match self.script {
                ProbeScript::Accept => Ok(ProbeOutcome::Accepted(reply(250))),
                ProbeScript::Reject => Ok(ProbeOutcome::Rejected(reply(550))),
                ProbeScript::Tempfail => Ok(ProbeOutcome::Indeterminate(reply(451))),
                _ => Err(connect_error()),
            }
        }

        fn send_probe(&self, _address: &str) -> Result<SendOutcome, SmtpError> {
            self.calls.set(self.calls.get() + 1);
            match self.script {
                ProbeScript::SendOk => Ok(SendOutcome::Sent {
                    token: "stubtoken".to_string(),
                    reply: reply(250),
                }),
                ProbeScript::SendRefused => Ok(SendOutcome::Refused(reply(550))),
                _ => Err(connect_error()),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum WatchScript {
        Bounced,
        Clean,
        Fails,
    }

    pub(crate) struct StubWatcher {
        pub script: WatchScript,
        pub calls: Cell<usize>,
    }

    impl StubWatcher {
        pub fn new(script: WatchScript) -> Self {
            Self {
                script,
                calls: Cell::new(0),
            }
        }
    }

    impl BounceWatcher for &StubWatcher {
        fn await_bounce(
            &self,
            _watch: &BounceWatch,
            _cancel: &CancelFlag,
        ) -> Result<BounceVerdict, ImapError> {
            self.calls.set(self.calls.get() + 1);
            match self.script {
                WatchScript::Bounced => Ok(BounceVerdict::Bounced),
                WatchScript::Clean => Ok(BounceVerdict::Clean),
                WatchScript::Fails => Err(ImapError::AuthRejected("stub".to_string())),
            }
        }
    }

    pub(crate) fn fast_config(strategy: ProbeStrategy) -> VerificationConfig {
        VerificationConfig {
            account: "probe@example.com".to_string(),
            strategy,
            settle_delay: Duration::ZERO,
            probe_delay: Duration::ZERO,
            bounce_wait: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            ..VerificationConfig::default()
        }
    }

    fn verify_with(
        strategy: ProbeStrategy,
        dns: &StubDns,
        probe: &StubProbe,
        watcher: &StubWatcher,
        address: &str,
    ) -> VerificationResult {
        let verifier = Verifier::with_components(fast_config(strategy), dns, probe, watcher);
        verifier.verify(EmailCandidate::new(address), &CancelFlag::new())
    }

    #[test]
    fn syntax_failure_is_invalid_with_zero_elapsed_and_no_network() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::Accept);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let result = verify_with(
            ProbeStrategy::ProbeOnly,
            &dns,
            &probe,
            &watcher,
            "user@ex ample.com",
        );
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert_eq!(result.reason, Some(VerdictReason::SyntaxError));
        assert_eq!(result.elapsed, Duration::ZERO);
        assert_eq!(dns.calls.get(), 0);
        assert_eq!(probe.calls.get(), 0);
        assert_eq!(watcher.calls.get(), 0);
    }

    #[test]
    fn missing_mx_is_invalid_without_smtp_attempt() {
        let dns = StubDns::new(DnsScript::NoRecords);
        let probe = StubProbe::new(ProbeScript::Accept);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let result = verify_with(
            ProbeStrategy::ProbeOnly,
            &dns,
            &probe,
            &watcher,
            "a@nxdomain-does-not-exist.test",
        );
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert_eq!(result.reason, Some(VerdictReason::NoMailExchanger));
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn transient_dns_failure_is_unknown() {
        let dns = StubDns::new(DnsScript::Transient);
        let probe = StubProbe::new(ProbeScript::Accept);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let result = verify_with(
            ProbeStrategy::ProbeOnly,
            &dns,
            &probe,
            &watcher,
            "a@example.com",
        );
        assert_eq!(result.status, VerificationStatus::Unknown);
        assert_eq!(result.reason, Some(VerdictReason::DnsUnavailable));
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn accepted_rcpt_is_valid() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::Accept);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let result = verify_with(
            ProbeStrategy::ProbeOnly,
            &dns,
            &probe,
            &watcher,
            "good@validmx.test",
        );
        assert_eq!(result.status, VerificationStatus::Valid);
        assert_eq!(result.reason, None);
        assert_eq!(watcher.calls.get(), 0);
    }

    #[test]
    fn rejected_rcpt_is_invalid() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::Reject);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let result = verify_with(
            ProbeStrategy::ProbeOnly,
            &dns,
            &probe,
            &watcher,
            "ghost@example.com",
        );
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert_eq!(result.reason, Some(VerdictReason::SmtpRejected));
    }

    #[test]
    fn transient_or_unreachable_smtp_is_unknown() {
        for script in [ProbeScript::Tempfail, ProbeScript::ConnectError] {
            let dns = StubDns::new(DnsScript::Records);
            let probe = StubProbe::new(script);
            let watcher = StubWatcher::new(WatchScript::Clean);
            let result = verify_with(
                ProbeStrategy::ProbeOnly,
                &dns,
                &probe,
                &watcher,
                "maybe@example.com",
            );
            assert_eq!(result.status, VerificationStatus::Unknown);
            assert_eq!(result.reason, Some(VerdictReason::SmtpUnavailable));
        }
    }

    #[test]
    fn refused_send_is_invalid_send_failed() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::SendRefused);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let result = verify_with(
            ProbeStrategy::SendAndWait,
            &dns,
            &probe,
            &watcher,
            "user@example.com",
        );
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert_eq!(result.reason, Some(VerdictReason::SendFailed));
        assert_eq!(watcher.calls.get(), 0);
    }

    #[test]
    fn bounce_detected_is_invalid() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::SendOk);
        let watcher = StubWatcher::new(WatchScript::Bounced);
        let result = verify_with(
            ProbeStrategy::SendAndWait,
            &dns,
            &probe,
            &watcher,
            "ghost@example.com",
        );
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert_eq!(result.reason, Some(VerdictReason::BounceDetected));
    }

    #[test]
    fn clean_bounce_window_is_valid() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::SendOk);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let result = verify_with(
            ProbeStrategy::SendAndWait,
            &dns,
            &probe,
            &watcher,
            "user@example.com",
        );
        assert_eq!(result.status, VerificationStatus::Valid);
        assert_eq!(result.reason, None);
        assert_eq!(watcher.calls.get(), 1);
    }

    #[test]
    fn failing_bounce_watch_is_unknown_not_valid() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::SendOk);
        let watcher = StubWatcher::new(WatchScript::Fails);
        let result = verify_with(
            ProbeStrategy::SendAndWait,
            &dns,
            &probe,
            &watcher,
            "user@example.com",
        );
        assert_eq!(result.status, VerificationStatus::Unknown);
        assert_eq!(result.reason, Some(VerdictReason::BounceCheckFailed));
    }

    #[test]
    fn identical_stub_responses_yield_identical_verdicts() {
        let dns = StubDns::new(DnsScript::Records);
        let probe = StubProbe::new(ProbeScript::Reject);
        let watcher = StubWatcher::new(WatchScript::Clean);
        let first = verify_with(
            ProbeStrategy::ProbeOnly,
            &dns,
            &probe,
            &watcher,
            "ghost@example.com",
        );
        let second = verify_with(
            ProbeStrategy::ProbeOnly,
            &dns,
            &probe,
            &watcher,
            "ghost@example.com",
        );
        assert_eq!(first.status, second.status);
        assert_eq!(first.reason, second.reason);
    }
}
