use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cancel::CancelFlag;
use crate::imap::classifier::{BounceClassifier, FetchedMessage};
use crate::imap::error::ImapError;
use crate::imap::session::ImapSession;

/// Ephemeral correlation of one sent probe with one mailbox poll.
#[derive(Debug, Clone)]
pub struct BounceWatch {
    pub target_address: String,
    pub deadline: Duration,
    pub poll_interval: Duration,
}

/// What one full bounce watch concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceVerdict {
    /// A non-delivery notice referencing the target arrived within the
    /// window. Known as soon as it is seen; the watch exits early.
    Bounced,
    /// No matching notice for the entire window. Only known once the full
    /// deadline has elapsed; the absence of a bounce is a confidence signal,
    /// not proof.
    Clean,
    /// The watch was cancelled before the deadline; no verdict.
    Interrupted,
}

/// Polls a mailbox over IMAP for a bounded duration, looking for a
/// non-delivery notification referencing the probed address.
#[derive(Debug, Clone)]
pub struct ImapBounceMonitor {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Option<Duration>,
}

/// One round of mailbox inspection: every currently unseen message, parsed.
pub(crate) trait InboxScan {
    fn unseen_messages(&mut self) -> Result<Vec<FetchedMessage>, ImapError>;
}

impl InboxScan for ImapSession {
    fn unseen_messages(&mut self) -> Result<Vec<FetchedMessage>, ImapError> {
        let mut messages = Vec::new();
        for seq in self.search_unseen()? {
            let raw = self.fetch_message(seq)?;
            debug!(seq, "fetched unseen message");
            messages.push(FetchedMessage::parse(&raw));
        }
        Ok(messages)
    }
}

impl ImapBounceMonitor {
    /// Scans unseen inbox messages every `watch.poll_interval` until a match
    /// is found or `watch.deadline` elapses. Session and authentication
    /// failures are errors, never silently "not bounced": the caller must
    /// not conflate monitor failure with delivery success. A best-effort
    /// LOGOUT closes the session on every path, errors included.
    pub fn await_bounce(
        &self,
        watch: &BounceWatch,
        classifier: &dyn BounceClassifier,
        cancel: &CancelFlag,
    ) -> Result<BounceVerdict, ImapError> {
        let mut session = ImapSession::connect(&self.host, self.port, self.timeout)?;
        let result = self.login_and_watch(&mut session, watch, classifier, cancel);
        session.logout();
        result
    }

    fn login_and_watch(
        &self,
        session: &mut ImapSession,
        watch: &BounceWatch,
        classifier: &dyn BounceClassifier,
        cancel: &CancelFlag,
    ) -> Result<BounceVerdict, ImapError> {
        session.login(&self.username, &self.password)?;
        session.select_inbox()?;
        watch_for_bounce(session, watch, classifier, cancel)
    }
}

/// The poll loop itself, generic over the scan source so the timing
/// behaviour can be exercised without a live mailbox.
fn watch_for_bounce<S: InboxScan>(
    scan: &mut S,
    watch: &BounceWatch,
    classifier: &dyn BounceClassifier,
    cancel: &CancelFlag,
) -> Result<BounceVerdict, ImapError> {
    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Ok(BounceVerdict::Interrupted);
        }

        for message in scan.unseen_messages()? {
            debug!(subject = %message.subject, "inspecting unseen message");
            if classifier.is_bounce(&message, &watch.target_address) {
                info!(target = %watch.target_address, "bounce notification matched");
                return Ok(BounceVerdict::Bounced);
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= watch.deadline {
            return Ok(BounceVerdict::Clean);
        }
        let nap = watch.poll_interval.min(watch.deadline - elapsed);
        if !cancel.sleep(nap) {
            return Ok(BounceVerdict::Interrupted);
        }
    }
}
