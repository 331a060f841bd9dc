//! The fetch stage: a pool of workers asking the accrual service for verdicts.
use std::sync::Arc;

use accrual_client::FetchResult;
use log::*;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    messages::{FetchedOrder, PipelineError},
    recv_shared,
    throttle::Throttle,
    SharedReceiver,
};
use crate::{db_types::Order, traits::AccrualSource};

pub(crate) fn spawn<S>(
    num_workers: usize,
    accrual: Arc<S>,
    throttle: Throttle,
    input: SharedReceiver<Order>,
    output: mpsc::Sender<FetchedOrder>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    S: AccrualSource + 'static,
{
    (0..num_workers.max(1))
        .map(|_| {
            let accrual = Arc::clone(&accrual);
            let throttle = throttle.clone();
            let input = Arc::clone(&input);
            let output = output.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let order = tokio::select! {
                        _ = cancel.cancelled() => break,
                        order = recv_shared(&input) => match order {
                            Some(order) => order,
                            None => break,
                        },
                    };
                    // Honour any Retry-After deadline before touching the wire again.
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = throttle.wait_ready() => {},
                    }
                    let number = order.number.clone();
                    let record = match accrual.fetch_verdict(&number).await {
                        Ok(FetchResult::Verdict(verdict)) => FetchedOrder { number, verdict: Ok(verdict) },
                        Ok(FetchResult::Throttled(delay)) => {
                            // The order is not consumed: it keeps its lease and a later tick
                            // reclaims it once the lease goes stale.
                            throttle.back_off(delay).await;
                            continue;
                        },
                        Err(e) => {
                            debug!("🚚️ Fetching verdict for {number} failed: {e}");
                            FetchedOrder {
                                number: number.clone(),
                                verdict: Err(PipelineError::Fetch { number, source: e }),
                            }
                        },
                    };
                    if output.send(record).await.is_err() {
                        break;
                    }
                }
            })
        })
        .collect()
}
