//! The order stage: persist each verdict in its own short transaction.
use std::sync::Arc;

use log::*;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    messages::{FetchedOrder, PipelineError, UpdatedOrder},
    recv_shared,
    SharedReceiver,
};
use crate::{db_types::OrderStatus, traits::PipelineDatabase};

pub(crate) fn spawn<B>(
    num_workers: usize,
    db: Arc<B>,
    input: SharedReceiver<FetchedOrder>,
    output: mpsc::Sender<UpdatedOrder>,
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
                    let fetched = tokio::select! {
                        _ = cancel.cancelled() => break,
                        fetched = recv_shared(&input) => match fetched {
                            Some(fetched) => fetched,
                            None => break,
                        },
                    };
                    let record = update_order(db.as_ref(), fetched).await;
                    if output.send(record).await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}

/// Apply one verdict. Fetch errors pass straight through so the balance stage can run the
/// recovery transaction; a storage failure here becomes such an error record itself.
async fn update_order<B: PipelineDatabase>(db: &B, fetched: FetchedOrder) -> UpdatedOrder {
    let number = fetched.number;
    let verdict = match fetched.verdict {
        Ok(verdict) => verdict,
        Err(e) => return UpdatedOrder { number, result: Err(e) },
    };
    let status = OrderStatus::from(verdict.status);
    match db.record_verdict(&number, status, verdict.accrual).await {
        Ok(order) => {
            trace!("📦️ Order {number} moved to {status}");
            UpdatedOrder { number, result: Ok(order) }
        },
        Err(e) => {
            debug!("📦️ Recording verdict for {number} failed: {e}");
            UpdatedOrder { number: number.clone(), result: Err(PipelineError::Storage { number, source: e }) }
        },
    }
}
