//! Batch orchestration: row-range slicing, sequential verification with
//! inter-probe pacing, and partitioned result collection.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cancel::CancelFlag;
use crate::engine::{
    BounceWatcher, EmailCandidate, MailExchangerCheck, RecipientProbe, VerdictReason,
    VerificationResult, VerificationStatus, Verifier,
};

/// 1-based inclusive row range. An empty or out-of-range slice selects
/// nothing; it is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Applies the range to a slice of rows.
    pub fn slice<'a, T>(&self, rows: &'a [T]) -> &'a [T] {
        if self.start == 0 || self.start > self.end || self.start > rows.len() {
            return &[];
        }
        let end = self.end.min(rows.len());
        &rows[self.start - 1..end]
    }
}

/// Outcome of one batch run: results partitioned by status, in input order,
/// plus the total wall-clock duration. `Unknown` verdicts land in `invalid`
/// with their reason preserved so callers can retarget retries.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub valid: Vec<VerificationResult>,
    pub invalid: Vec<VerificationResult>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }
}

/// Verifies `candidates[range]` one at a time through `verifier`.
///
/// Probing is intentionally sequential: mail providers throttle per-account
/// connections, so the orchestrator enforces a minimum interval between
/// consecutive probe starts instead of dispatching in parallel. Candidates
/// that performed no network work (syntax failures) do not consume a pacing
/// slot. Cancellation stops between candidates; a single candidate's failure
/// never aborts the batch.
pub fn run_batch<M, P, B>(
    candidates: &[EmailCandidate],
    range: RowRange,
    verifier: &Verifier<M, P, B>,
    cancel: &CancelFlag,
) -> BatchReport
where
    M: MailExchangerCheck,
    P: RecipientProbe,
    B: BounceWatcher,
{
    let selected = range.slice(candidates);
    let started = Instant::now();
    let mut report = BatchReport::default();
    let mut last_probe_start: Option<Instant> = None;
    let pace = verifier.config().probe_delay;

    for candidate in selected {
        if cancel.is_cancelled() {
            warn!(
                done = report.total(),
                remaining = selected.len() - report.total(),
                "batch cancelled, skipping remaining candidates"
            );
            break;
        }

        if let Some(previous) = last_probe_start {
            let since = previous.elapsed();
            if since < pace && !cancel.sleep(pace - since) {
                break;
            }
        }

        let probe_started = Instant::now();
        let result = verifier.verify(candidate.clone(), cancel);
        // syntax failures touch no network and do not consume a pacing slot
        if result.reason != Some(VerdictReason::SyntaxError) {
            last_probe_start = Some(probe_started);
        }

        match result.status {
            VerificationStatus::Valid => report.valid.push(result),
            VerificationStatus::Invalid | VerificationStatus::Unknown => {
                report.invalid.push(result)
            }
        }
    }

    report.elapsed = started.elapsed();
    info!(
        total = report.total(),
        valid = report.valid.len(),
        invalid = report.invalid.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "batch finished"
    );
    report
}
