//! The balance actualization pipeline.
//!
//! A periodically-driven reconciliation loop. Each tick atomically claims a batch of
//! unprocessed orders (plus any stale leases), streams them through three bounded worker pools —
//! fetch the external verdict, persist it, credit the owner's balance — and forwards per-order
//! errors to an advisory sink. Streams between stages are capacity-one channels, so a slow
//! downstream stalls its upstream instead of buffering the batch in memory.
//!
//! Ordering: nothing is promised across orders in a batch; within one order the
//! fetch → persist → credit sequence is strict. The claim query's `SKIP LOCKED` select is the
//! only cross-process serialization point — two actualizer instances never lease the same order.
mod balance_stage;
mod fetch_stage;
mod messages;
mod order_stage;
mod throttle;

#[cfg(test)]
mod tests;

use std::{sync::Arc, time::Duration};

use log::*;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

pub use self::{
    messages::{Completion, FetchedOrder, PipelineError, UpdatedOrder},
    throttle::Throttle,
};
use crate::{
    db_types::{Order, OrderStatus},
    events::{ErrorPump, ErrorSink},
    traits::{AccrualSource, PipelineDatabase},
};

type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Workers in a pool pull from one shared stream; each worker processes its items sequentially.
async fn recv_shared<T>(rx: &SharedReceiver<T>) -> Option<T> {
    rx.lock().await.recv().await
}

#[derive(Debug, Clone)]
pub struct ActualizerConfig {
    /// Period between pipeline runs.
    pub tick_interval: Duration,
    /// Maximum orders claimed per tick. Keep this at least as large as the biggest worker pool
    /// or a tick's tail latency is dominated by one slow order.
    pub batch_size: i64,
    pub fetch_workers: usize,
    pub order_workers: usize,
    pub balance_workers: usize,
    /// Capacity of the advisory error sink.
    pub error_buffer_size: usize,
    /// How long a PROCESSING lease may sit untouched before a tick reclaims it.
    pub lease_timeout: Duration,
}

impl Default for ActualizerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            batch_size: 500,
            fetch_workers: 2,
            order_workers: 2,
            balance_workers: 2,
            error_buffer_size: 1024,
            lease_timeout: Duration::from_secs(60),
        }
    }
}

/// The pipeline orchestrator. Construct it once, attach an error listener, then [`start`] it.
///
/// [`start`]: BalancesActualizer::start
pub struct BalancesActualizer<B, S> {
    db: Arc<B>,
    accrual: Arc<S>,
    config: ActualizerConfig,
    throttle: Throttle,
    sink: ErrorSink<PipelineError>,
    pump: Option<ErrorPump<PipelineError>>,
}

impl<B, S> BalancesActualizer<B, S>
where
    B: PipelineDatabase + 'static,
    S: AccrualSource + 'static,
{
    pub fn new(db: Arc<B>, accrual: Arc<S>, config: ActualizerConfig) -> Self {
        let pump = ErrorPump::new(config.error_buffer_size);
        let sink = pump.sink();
        Self { db, accrual, config, throttle: Throttle::new(), sink, pump: Some(pump) }
    }

    /// Attach the error consumer. The sink is advisory: dropping errors on overflow is preferred
    /// over stalling the pipeline. Returns `None` if a listener was already attached.
    pub fn listen_errors<F>(&mut self, callback: F) -> Option<JoinHandle<()>>
    where F: FnMut(PipelineError) + Send + 'static {
        self.pump.take().map(|pump| pump.listen(callback))
    }

    /// Start the periodic loop. The first tick fires one full interval after start. Cancel the
    /// token to stop; the loop finishes at most one in-flight tick's transactions and exits.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.worker_handle();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            info!("🔄️ Balances actualizer started (every {:?})", this.config.tick_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("🔄️ Balances actualizer stopped");
                        break;
                    },
                    _ = ticker.tick() => this.run_tick(&cancel).await,
                }
            }
        })
    }

    /// One pass over the queue: claim, fan out, drain. Public so operators and tests can force a
    /// run without waiting for the ticker.
    pub async fn run_tick(&self, cancel: &CancellationToken) {
        let mut orders = match self
            .db
            .claim_batch(&[OrderStatus::New], OrderStatus::Processing, self.config.batch_size)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                self.sink.report(PipelineError::Claim(e));
                return;
            },
        };
        match self.db.reclaim_stale(self.config.lease_timeout, self.config.batch_size).await {
            Ok(reclaimed) => orders.extend(reclaimed),
            // A failed reclaim only delays recovery; the freshly claimed batch still runs.
            Err(e) => self.sink.report(PipelineError::Claim(e)),
        }
        if orders.is_empty() {
            trace!("🔄️ Nothing to actualize this tick");
            return;
        }
        debug!("🔄️ Actualizing {} orders", orders.len());

        let (source_tx, source_rx) = mpsc::channel::<Order>(1);
        let (fetched_tx, fetched_rx) = mpsc::channel::<FetchedOrder>(1);
        let (updated_tx, updated_rx) = mpsc::channel::<UpdatedOrder>(1);
        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(1);

        let mut workers = fetch_stage::spawn(
            self.config.fetch_workers,
            Arc::clone(&self.accrual),
            self.throttle.clone(),
            Arc::new(Mutex::new(source_rx)),
            fetched_tx,
            cancel.clone(),
        );
        workers.extend(order_stage::spawn(
            self.config.order_workers,
            Arc::clone(&self.db),
            Arc::new(Mutex::new(fetched_rx)),
            updated_tx,
            cancel.clone(),
        ));
        workers.extend(balance_stage::spawn(
            self.config.balance_workers,
            Arc::clone(&self.db),
            Arc::new(Mutex::new(updated_rx)),
            done_tx,
            cancel.clone(),
        ));

        let feeder = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for order in orders {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = source_tx.send(order) => {
                            if sent.is_err() {
                                break;
                            }
                        },
                    }
                }
            })
        };

        while let Some(completion) = done_rx.recv().await {
            if let Some(error) = completion.error {
                self.sink.report(error);
            }
        }
        let _ = feeder.await;
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// A shareable handle for the ticker task: everything but the (single-consumer) error pump.
    fn worker_handle(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            accrual: Arc::clone(&self.accrual),
            config: self.config.clone(),
            throttle: self.throttle.clone(),
            sink: self.sink.clone(),
            pump: None,
        }
    }
}
