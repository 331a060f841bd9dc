//! The balance stage: credit owners and finish the order, or run the recovery path.
use std::sync::Arc;

use log::*;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    messages::{Completion, PipelineError, UpdatedOrder},
    recv_shared,
    SharedReceiver,
};
use crate::{
    db_types::OrderStatus,
    traits::{PipelineDatabase, SettleOutcome},
};

pub(crate) fn spawn<B>(
    num_workers: usize,
    db: Arc<B>,
    input: SharedReceiver<UpdatedOrder>,
    output: mpsc::Sender<Completion>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    B: PipelineDatabase + 'static,
{
    (0..num_workers.max(1))
        .map(|_| {
            let db = Arc::clone(&db);
            let input = Arc::clone(&input);
            let output = output.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let updated = tokio::select! {
                        _ = cancel.cancelled() => break,
                        updated = recv_shared(&input) => match updated {
                            Some(updated) => updated,
                            None => break,
                        },
                    };
                    let completion = update_balance(db.as_ref(), updated).await;
                    if output.send(completion).await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}

/// Settle one order, or compensate for an upstream failure.
///
/// * Error record: put the order back to NEW so the next tick retries it, and carry the error
///   to the sink. If even the release fails the lease simply goes stale and is reclaimed later.
/// * PROCESSING order: the accrual is known; credit every owner and mark the order PROCESSED in
///   one transaction. A transient failure here also sends the order back to NEW.
/// * Anything else (NEW: remote not ready yet; INVALID: terminal): nothing to credit.
async fn update_balance<B: PipelineDatabase>(db: &B, updated: UpdatedOrder) -> Completion {
    let number = updated.number;
    let order = match updated.result {
        Err(error) => {
            if let Err(e) = db.release_lease(&number).await {
                warn!("💰️ Could not release order {number} back to NEW: {e}");
            }
            return Completion { number, error: Some(error) };
        },
        Ok(order) => order,
    };
    if order.status != OrderStatus::Processing {
        return Completion { number, error: None };
    }
    match db.settle_order(&number).await {
        Ok(SettleOutcome::Credited(owners)) => {
            trace!("💰️ Order {number} credited to {owners} owner(s)");
            Completion { number, error: None }
        },
        Ok(SettleOutcome::Skipped(status)) => {
            debug!("💰️ Order {number} was already {status} when settling; nothing credited");
            Completion { number, error: None }
        },
        Err(e) => {
            if let Err(re) = db.release_lease(&number).await {
                warn!("💰️ Could not release order {number} back to NEW: {re}");
            }
            Completion { number: number.clone(), error: Some(PipelineError::Storage { number, source: e }) }
        },
    }
}
