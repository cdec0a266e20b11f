//! Accrual reconciliation pipeline.
//!
//! A producer task polls the ledger on a fixed interval for orders still
//! waiting on the accrual authority (`PROCESSING` first, then `NEW`) and pushes
//! their numbers into a bounded channel. The consumer resolves them one at a
//! time, so at most one authority request is in flight, and writes each verdict
//! back to the ledger.
//!
//! Backpressure: the channel holds `queue_capacity` numbers. A full channel
//! suspends the producer, an empty one suspends the consumer. A number that is
//! already queued or being resolved is not queued again.
//!
//! Shutdown: cancelling the token stops the producer within one tick, which
//! closes the channel. The consumer finishes whatever is still queued and
//! [`Reconciler::run`] returns only after the producer task has exited.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accrual::{AccrualAuthority, AuthorityStatus, Resolution};
use crate::domain::{OrderNumber, OrderStatus, OrderUpdate};
use crate::ports::{LedgerStore, RepositoryResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
    Dispatching,
    Stopped,
}

/// What happened to a single order during one resolve-and-apply step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Updated(OrderStatus),
    /// Unknown to the authority, stored as `INVALID`.
    NotRegistered,
    /// The authority asked us to back off. The order was left untouched.
    RateLimited,
    /// Authority or store failure. The order was left untouched.
    Failed,
}

/// Order numbers currently queued or being resolved.
#[derive(Debug, Default)]
struct PendingSet(Mutex<HashSet<OrderNumber>>);

impl PendingSet {
    fn insert(&self, number: &OrderNumber) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(number.clone())
    }

    fn remove(&self, number: &OrderNumber) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(number);
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    authority: Arc<dyn AccrualAuthority>,
    config: SchedulerConfig,
    pending: Arc<PendingSet>,
    state: Arc<watch::Sender<SchedulerState>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        authority: Arc<dyn AccrualAuthority>,
        config: SchedulerConfig,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            store,
            authority,
            config,
            pending: Arc::new(PendingSet::default()),
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Numbers queued or in flight right now.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Runs the pipeline on its own task until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            poll_interval = ?self.config.poll_interval,
            queue_capacity = self.config.queue_capacity,
            "Accrual reconciler started"
        );
        self.state.send_replace(SchedulerState::Idle);

        let (tx, mut rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let producer = Producer {
            store: Arc::clone(&self.store),
            pending: Arc::clone(&self.pending),
            state: Arc::clone(&self.state),
            poll_interval: self.config.poll_interval,
            tx,
            shutdown,
        };
        let producer = tokio::spawn(producer.run());

        while let Some(number) = rx.recv().await {
            let outcome = self.reconcile_once(&number).await;
            debug!(order = %number, ?outcome, "order reconciled");
            self.pending.remove(&number);
        }

        if let Err(e) = producer.await {
            error!("Accrual producer task failed: {}", e);
        }

        self.state.send_replace(SchedulerState::Stopped);
        info!("Accrual reconciler stopped");
    }

    /// Resolves one order through the authority and writes the verdict back.
    pub async fn reconcile_once(&self, number: &OrderNumber) -> ReconcileOutcome {
        match self.authority.resolve(number).await {
            Ok(Resolution::Verdict(verdict)) => {
                if let AuthorityStatus::Unrecognized(raw) = &verdict.status {
                    warn!(
                        order = %number,
                        status = %raw,
                        "unrecognized accrual status, treating order as INVALID"
                    );
                }
                let update =
                    OrderUpdate::new(number.clone(), verdict.status.order_status(), verdict.accrual);
                match self.apply(&update).await {
                    Ok(()) => ReconcileOutcome::Updated(update.status),
                    Err(_) => ReconcileOutcome::Failed,
                }
            }
            Ok(Resolution::NotRegistered) => {
                info!(order = %number, "order not registered in accrual system, marking INVALID");
                match self.apply(&OrderUpdate::invalid(number.clone())).await {
                    Ok(()) => ReconcileOutcome::NotRegistered,
                    Err(_) => ReconcileOutcome::Failed,
                }
            }
            Err(e) if e.is_rate_limited() => {
                warn!(order = %number, "{}", e);
                ReconcileOutcome::RateLimited
            }
            Err(e) => {
                error!(order = %number, "failed to get accrual: {}", e);
                ReconcileOutcome::Failed
            }
        }
    }

    async fn apply(&self, update: &OrderUpdate) -> RepositoryResult<()> {
        self.store.update_order(update).await.map_err(|e| {
            error!(order = %update.number, status = %update.status, "failed to update order: {}", e);
            e
        })
    }
}

struct Producer {
    store: Arc<dyn LedgerStore>,
    pending: Arc<PendingSet>,
    state: Arc<watch::Sender<SchedulerState>>,
    poll_interval: Duration,
    tx: mpsc::Sender<OrderNumber>,
    shutdown: CancellationToken,
}

impl Producer {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.state.send_replace(SchedulerState::Polling);
            let numbers = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                numbers = self.poll() => numbers,
            };

            let numbers = match numbers {
                Ok(numbers) => numbers,
                Err(e) => {
                    error!("failed to poll pending orders: {}", e);
                    self.state.send_replace(SchedulerState::Idle);
                    continue;
                }
            };

            self.state.send_replace(SchedulerState::Dispatching);
            if !self.dispatch(numbers).await {
                break;
            }
            self.state.send_replace(SchedulerState::Idle);
        }
        debug!("accrual producer stopped");
        // Dropping `self.tx` here closes the channel for the consumer.
    }

    async fn poll(&self) -> RepositoryResult<Vec<OrderNumber>> {
        let mut numbers = Vec::new();
        for status in OrderStatus::PENDING {
            numbers.extend(self.store.get_orders_by_status(status).await?);
        }
        Ok(numbers)
    }

    /// Returns `false` once the pipeline is shutting down.
    async fn dispatch(&self, numbers: Vec<OrderNumber>) -> bool {
        let mut queued = 0usize;
        for number in numbers {
            if !self.pending.insert(&number) {
                continue;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.pending.remove(&number);
                    return false;
                }
                sent = self.tx.send(number.clone()) => {
                    if sent.is_err() {
                        self.pending.remove(&number);
                        return false;
                    }
                    queued += 1;
                }
            }
        }

        if queued > 0 {
            debug!("queued {} order(s) for accrual", queued);
        }
        true
    }
}
