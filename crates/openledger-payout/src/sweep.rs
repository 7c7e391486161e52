//! Scheduled payout jobs: the daily dispatch run and the retry sweep.
//!
//! Both take the clock as an argument so schedulers (and tests) control
//! time, and both are idempotent per payout identity — re-running a
//! sweep never double-pays, because dispatch goes through the payout
//! state machine and the provider sees the payout-derived key.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use openledger_escrow::EscrowLedger;
use openledger_types::{PayoutId, PayoutStatus};

use crate::batcher::PayoutBatcher;
use crate::dispatcher::PayoutDispatcher;
use crate::gateway::PayoutGateway;

/// Outcome counts of one sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub attempted: usize,
    pub paid: usize,
    pub failed: usize,
}

/// Dispatch every SCHEDULED payout whose date has arrived.
pub fn dispatch_due_scheduled<G: PayoutGateway>(
    dispatcher: &mut PayoutDispatcher<G>,
    batcher: &mut PayoutBatcher,
    ledger: &mut EscrowLedger,
    now: DateTime<Utc>,
) -> SweepReport {
    let due = batcher.due_scheduled(now.date_naive());
    run(dispatcher, batcher, ledger, due, now, "scheduled run")
}

/// Re-dispatch every FAILED payout whose backoff has elapsed.
pub fn sweep_due_retries<G: PayoutGateway>(
    dispatcher: &mut PayoutDispatcher<G>,
    batcher: &mut PayoutBatcher,
    ledger: &mut EscrowLedger,
    now: DateTime<Utc>,
) -> SweepReport {
    let due = batcher.due_for_retry(now);
    run(dispatcher, batcher, ledger, due, now, "retry sweep")
}

fn run<G: PayoutGateway>(
    dispatcher: &mut PayoutDispatcher<G>,
    batcher: &mut PayoutBatcher,
    ledger: &mut EscrowLedger,
    due: Vec<PayoutId>,
    now: DateTime<Utc>,
    label: &str,
) -> SweepReport {
    let mut report = SweepReport::default();
    for payout_id in due {
        report.attempted += 1;
        match dispatcher.dispatch(batcher, ledger, payout_id, now) {
            Ok(PayoutStatus::Paid) => report.paid += 1,
            Ok(_) => report.failed += 1,
            Err(err) => {
                // A conflict here means another worker got there first;
                // the sweep moves on.
                warn!(payout = %payout_id, %err, "sweep dispatch skipped");
                report.failed += 1;
            }
        }
    }
    info!(
        label,
        attempted = report.attempted,
        paid = report.paid,
        failed = report.failed,
        "payout sweep finished"
    );
    report
}
