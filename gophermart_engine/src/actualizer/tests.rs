use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use accrual_client::{AccrualApiError, AccrualOrder, FetchResult, RemoteOrderStatus};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gm_common::Points;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ActualizerConfig, BalancesActualizer, PipelineError};
use crate::{
    db_types::{Order, OrderNumber, OrderStatus, User},
    traits::{AccrualSource, PipelineDatabase, SettleOutcome, StorageError},
};

//--------------------------------------     FakeStore       ---------------------------------------------------------
/// An in-memory stand-in for the Postgres backend, just stateful enough to run whole-pipeline
/// scenarios: orders with leases, owners, balances, and a one-shot settle-failure switch.
#[derive(Default)]
struct FakeStore {
    orders: Mutex<HashMap<String, Order>>,
    leases: Mutex<HashMap<String, Instant>>,
    owners: Mutex<HashMap<String, Uuid>>,
    balances: Mutex<HashMap<Uuid, Points>>,
    fail_next_settle: AtomicBool,
}

impl FakeStore {
    fn seed_order(&self, user: Uuid, number: &str, minutes_ago: i64) {
        let order = Order {
            number: OrderNumber::from(number),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() - chrono::Duration::minutes(minutes_ago),
        };
        self.orders.lock().unwrap().insert(number.to_string(), order);
        self.owners.lock().unwrap().insert(number.to_string(), user);
        self.balances.lock().unwrap().entry(user).or_default();
    }

    fn status_of(&self, number: &str) -> OrderStatus {
        self.orders.lock().unwrap()[number].status
    }

    fn balance_of(&self, user: Uuid) -> Points {
        *self.balances.lock().unwrap().get(&user).unwrap()
    }
}

#[async_trait]
impl PipelineDatabase for FakeStore {
    async fn claim_batch(
        &self,
        source: &[OrderStatus],
        target: OrderStatus,
        limit: i64,
    ) -> Result<Vec<Order>, StorageError> {
        let mut orders = self.orders.lock().unwrap();
        let mut claimable: Vec<&Order> =
            orders.values().filter(|o| source.contains(&o.status)).collect();
        claimable.sort_by(|a, b| (a.uploaded_at, &a.number.0).cmp(&(b.uploaded_at, &b.number.0)));
        let numbers: Vec<String> =
            claimable.into_iter().take(limit as usize).map(|o| o.number.0.clone()).collect();
        let mut leases = self.leases.lock().unwrap();
        let mut claimed = Vec::new();
        for number in numbers {
            let order = orders.get_mut(&number).unwrap();
            order.status = target;
            leases.insert(number, Instant::now());
            claimed.push(order.clone());
        }
        Ok(claimed)
    }

    async fn reclaim_stale(&self, lease_timeout: Duration, limit: i64) -> Result<Vec<Order>, StorageError> {
        let mut orders = self.orders.lock().unwrap();
        let mut leases = self.leases.lock().unwrap();
        let mut reclaimed = Vec::new();
        for (number, order) in orders.iter_mut() {
            if reclaimed.len() >= limit as usize {
                break;
            }
            let stale = order.status == OrderStatus::Processing
                && leases.get(number).map_or(true, |at| at.elapsed() >= lease_timeout);
            if stale {
                leases.insert(number.clone(), Instant::now());
                reclaimed.push(order.clone());
            }
        }
        Ok(reclaimed)
    }

    async fn record_verdict(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Points>,
    ) -> Result<Order, StorageError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(number.as_str()).ok_or_else(|| StorageError::OrderNotFound(number.clone()))?;
        order.status = status;
        order.accrual = accrual;
        Ok(order.clone())
    }

    async fn settle_order(&self, number: &OrderNumber) -> Result<SettleOutcome, StorageError> {
        if self.fail_next_settle.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Database("injected commit failure".to_string()));
        }
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(number.as_str()).ok_or_else(|| StorageError::OrderNotFound(number.clone()))?;
        if order.status != OrderStatus::Processing {
            return Ok(SettleOutcome::Skipped(order.status));
        }
        let accrual = order.accrual.unwrap_or_default();
        order.status = OrderStatus::Processed;
        let owner = self.owners.lock().unwrap()[number.as_str()];
        *self.balances.lock().unwrap().entry(owner).or_default() += accrual;
        Ok(SettleOutcome::Credited(1))
    }

    async fn release_lease(&self, number: &OrderNumber) -> Result<(), StorageError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(number.as_str()).ok_or_else(|| StorageError::OrderNotFound(number.clone()))?;
        order.status = OrderStatus::New;
        Ok(())
    }

    async fn users_by_orders(
        &self,
        numbers: &[OrderNumber],
    ) -> Result<(Vec<User>, HashMap<Uuid, Vec<OrderNumber>>), StorageError> {
        let owners = self.owners.lock().unwrap();
        let balances = self.balances.lock().unwrap();
        let mut users: Vec<User> = Vec::new();
        let mut mapping: HashMap<Uuid, Vec<OrderNumber>> = HashMap::new();
        for number in numbers {
            if let Some(&owner) = owners.get(number.as_str()) {
                if !users.iter().any(|u| u.id == owner) {
                    users.push(User {
                        id: owner,
                        login: owner.to_string(),
                        pass: String::new(),
                        balance: *balances.get(&owner).unwrap_or(&Points::default()),
                    });
                }
                mapping.entry(owner).or_default().push(number.clone());
            }
        }
        Ok((users, mapping))
    }
}

//--------------------------------------    FakeAccrual      ---------------------------------------------------------
/// A scriptable accrual service: fixed verdicts per order, an optional one-shot 429, and a log
/// of when each outbound request happened.
#[derive(Default)]
struct FakeAccrual {
    accruals: HashMap<String, f64>,
    unknown: Vec<String>,
    throttle_first: AtomicBool,
    calls: Mutex<Vec<Instant>>,
}

impl FakeAccrual {
    fn with_accruals(accruals: &[(&str, f64)]) -> Self {
        Self {
            accruals: accruals.iter().map(|(n, a)| (n.to_string(), *a)).collect(),
            ..Self::default()
        }
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccrualSource for FakeAccrual {
    async fn fetch_verdict(&self, number: &OrderNumber) -> Result<FetchResult, AccrualApiError> {
        self.calls.lock().unwrap().push(Instant::now());
        if self.throttle_first.swap(false, Ordering::SeqCst) {
            return Ok(FetchResult::Throttled(Duration::from_secs(2)));
        }
        if self.unknown.iter().any(|n| n == number.as_str()) {
            return Ok(FetchResult::Verdict(AccrualOrder::unknown(number.as_str())));
        }
        match self.accruals.get(number.as_str()) {
            Some(&accrual) => Ok(FetchResult::Verdict(AccrualOrder {
                order: number.as_str().to_string(),
                status: RemoteOrderStatus::Processed,
                accrual: Some(Points::from(accrual)),
            })),
            None => Err(AccrualApiError::UnexpectedStatus { status: 500, order: number.as_str().to_string() }),
        }
    }
}

//--------------------------------------     scenarios       ---------------------------------------------------------

fn test_config() -> ActualizerConfig {
    ActualizerConfig {
        tick_interval: Duration::from_secs(5),
        batch_size: 10,
        fetch_workers: 2,
        order_workers: 2,
        balance_workers: 2,
        error_buffer_size: 16,
        lease_timeout: Duration::from_secs(60),
    }
}

struct Harness {
    store: Arc<FakeStore>,
    accrual: Arc<FakeAccrual>,
    actualizer: BalancesActualizer<FakeStore, FakeAccrual>,
    errors: Arc<Mutex<Vec<PipelineError>>>,
    listener: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn new(store: FakeStore, accrual: FakeAccrual, config: ActualizerConfig) -> Self {
        let _ = env_logger::try_init();
        let store = Arc::new(store);
        let accrual = Arc::new(accrual);
        let mut actualizer =
            BalancesActualizer::new(Arc::clone(&store), Arc::clone(&accrual), config);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let listener = actualizer.listen_errors(move |e| sink.lock().unwrap().push(e)).unwrap();
        Self { store, accrual, actualizer, errors, listener }
    }

    async fn finish(self) -> Vec<PipelineError> {
        drop(self.actualizer);
        self.listener.await.unwrap();
        Arc::try_unwrap(self.errors).unwrap().into_inner().unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn happy_path_credits_the_owner_once_per_order() {
    let user = Uuid::new_v4();
    let store = FakeStore::default();
    store.seed_order(user, "5857088487", 10);
    store.seed_order(user, "2503317444", 5);
    let accrual = FakeAccrual::with_accruals(&[("5857088487", 150.5), ("2503317444", 200.7)]);

    let h = Harness::new(store, accrual, test_config());
    h.actualizer.run_tick(&CancellationToken::new()).await;

    assert_eq!(h.store.status_of("5857088487"), OrderStatus::Processed);
    assert_eq!(h.store.status_of("2503317444"), OrderStatus::Processed);
    assert!(h.store.balance_of(user).approx_eq(Points::from(351.2)));
    let errors = h.finish().await;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[tokio::test(start_paused = true)]
async fn orders_unknown_to_the_accrual_service_become_invalid() {
    let user = Uuid::new_v4();
    let store = FakeStore::default();
    store.seed_order(user, "1111111116", 1);
    let accrual = FakeAccrual { unknown: vec!["1111111116".to_string()], ..FakeAccrual::default() };

    let h = Harness::new(store, accrual, test_config());
    h.actualizer.run_tick(&CancellationToken::new()).await;

    assert_eq!(h.store.status_of("1111111116"), OrderStatus::Invalid);
    assert_eq!(h.store.balance_of(user), Points::from(0.0));
    assert!(h.finish().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_after_is_respected_and_the_throttled_order_recovers() {
    let user = Uuid::new_v4();
    let store = FakeStore::default();
    store.seed_order(user, "5857088487", 30);
    store.seed_order(user, "2503317444", 20);
    store.seed_order(user, "3376308833", 10);
    let accrual = FakeAccrual {
        throttle_first: AtomicBool::new(true),
        ..FakeAccrual::with_accruals(&[("5857088487", 10.0), ("2503317444", 10.0), ("3376308833", 10.0)])
    };
    // One fetch worker makes the request ordering deterministic.
    let config = ActualizerConfig { fetch_workers: 1, ..test_config() };

    let h = Harness::new(store, accrual, config.clone());
    let cancel = CancellationToken::new();
    h.actualizer.run_tick(&cancel).await;

    // The 429'd order kept its lease; the other two settled after the back-off.
    assert_eq!(h.store.status_of("5857088487"), OrderStatus::Processing);
    assert_eq!(h.store.status_of("2503317444"), OrderStatus::Processed);
    assert_eq!(h.store.status_of("3376308833"), OrderStatus::Processed);

    // At least Retry-After elapsed between the 429 and the next outbound request.
    {
        let calls = h.accrual.call_times();
        assert!(calls.len() >= 2);
        assert!(calls[1] - calls[0] >= Duration::from_secs(2), "second request was not delayed");
    }

    // Once the lease goes stale, the next tick reclaims and settles the throttled order.
    tokio::time::advance(config.lease_timeout + Duration::from_secs(1)).await;
    h.actualizer.run_tick(&cancel).await;
    assert_eq!(h.store.status_of("5857088487"), OrderStatus::Processed);
    assert!(h.store.balance_of(user).approx_eq(Points::from(30.0)));
    assert!(h.finish().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_settle_failure_rolls_back_to_new_and_recovers_next_tick() {
    let user = Uuid::new_v4();
    let store = FakeStore::default();
    store.seed_order(user, "5857088487", 1);
    store.fail_next_settle.store(true, Ordering::SeqCst);
    let accrual = FakeAccrual::with_accruals(&[("5857088487", 42.5)]);

    let h = Harness::new(store, accrual, test_config());
    let cancel = CancellationToken::new();
    h.actualizer.run_tick(&cancel).await;

    assert_eq!(h.store.status_of("5857088487"), OrderStatus::New);
    assert_eq!(h.store.balance_of(user), Points::from(0.0));

    h.actualizer.run_tick(&cancel).await;
    assert_eq!(h.store.status_of("5857088487"), OrderStatus::Processed);
    assert!(h.store.balance_of(user).approx_eq(Points::from(42.5)));

    let errors = h.finish().await;
    assert_eq!(errors.len(), 1, "exactly the injected failure should surface: {errors:?}");
    assert!(matches!(&errors[0], PipelineError::Storage { number, .. } if number.as_str() == "5857088487"));
}

#[tokio::test(start_paused = true)]
async fn fetch_errors_send_the_order_back_to_new() {
    let user = Uuid::new_v4();
    let store = FakeStore::default();
    store.seed_order(user, "5857088487", 1);
    // No scripted accrual for the order: the fake answers with an unexpected 500.
    let accrual = FakeAccrual::default();

    let h = Harness::new(store, accrual, test_config());
    h.actualizer.run_tick(&CancellationToken::new()).await;

    assert_eq!(h.store.status_of("5857088487"), OrderStatus::New);
    assert_eq!(h.store.balance_of(user), Points::from(0.0));
    let errors = h.finish().await;
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], PipelineError::Fetch { .. }));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_ticker_promptly() {
    let store = FakeStore::default();
    let accrual = FakeAccrual::default();
    let h = Harness::new(store, accrual, test_config());

    let cancel = CancellationToken::new();
    let runner = h.actualizer.start(cancel.clone());
    // Let a couple of (empty) ticks go by, then pull the plug.
    tokio::time::advance(Duration::from_secs(12)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner).await.expect("ticker did not stop").unwrap();
    assert!(h.finish().await.is_empty());
}
