//! Demand-driven incremental poller
//!
//! Turns a paginated "list new records since X" endpoint into a pull-based,
//! potentially infinite sequence of records.
//!
//! All state (queue, demand, cursor, in-flight flag) lives in one actor task.
//! Demand increases, fetch completions and timer ticks reach it as events on
//! a single `select!` loop, so they are serialized relative to each other.
//!
//! ```text
//!            request_more(n)                      fetch_page(cursor)
//! consumer ───────────────────▶ ┌───────────┐ ─────────────────────▶ source
//!          ◀─────────────────── │  actor    │ ◀─────────────────────
//!               recv()          └───────────┘      page / error
//!                                     │ cursor (watch)
//!                                     ▼
//!                              CheckpointWriter
//! ```
//!
//! On every tick (and on every demand increase):
//! - queue empty, demand > 0, nothing in flight: start one fetch
//! - otherwise: emit `min(demand, queued)` records in fetch order
//!
//! A non-empty page keeps the tick at `active_interval`; an empty page slows
//! it to `empty_interval` until the next non-empty page. Failed fetches are
//! retried on the next tick without limit.
//!
//! A cursor reset starts a new epoch. A fetch started in an earlier epoch
//! still delivers its records, but it no longer moves the cursor, so the
//! fetch after a reset always starts from the zero position.

use crate::cursor::Cursor;
use crate::error::ConnectorResult;
use crate::traits::PageSource;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poller timing
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Tick period while records are flowing
    pub active_interval: Duration,
    /// Tick period after a fetch returned nothing
    pub empty_interval: Duration,
    /// Periodically forget the cursor and rescan from the start
    pub cursor_reset_interval: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_millis(1),
            empty_interval: Duration::from_secs(30),
            cursor_reset_interval: None,
        }
    }
}

/// What the poller is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// No demand, or waiting for the next tick
    Idle,
    /// A fetch is in flight
    Fetching,
    /// Queued records are being handed to the consumer
    Draining,
    /// Cancelled
    Stopped,
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time view of the poller, published after every event
#[derive(Debug, Clone)]
pub struct PollerSnapshot<C> {
    pub cursor: C,
    pub demand: u64,
    pub queued: usize,
    pub in_flight: bool,
    pub tick_interval: Duration,
    /// Fetches started so far
    pub fetches: u64,
    /// Fetches that failed so far
    pub failures: u64,
    /// Records handed to the consumer so far
    pub emitted: u64,
    pub state: PollerState,
}

/// Result of one fetch, tagged with the reset epoch it was started in
struct FetchCompletion<R> {
    epoch: u64,
    result: ConnectorResult<Vec<R>>,
}

/// Entry point for starting pollers
pub struct Poller;

impl Poller {
    /// Spawn the poller actor for `source`, starting at `cursor`.
    ///
    /// Nothing is fetched until the consumer calls [`PollerHandle::request_more`].
    pub fn start<S: PageSource>(
        source: Arc<S>,
        cursor: S::Cursor,
        config: PollerConfig,
        cancel: CancellationToken,
    ) -> PollerHandle<S::Record, S::Cursor> {
        let name = source.name().to_string();
        let (demand_tx, demand_rx) = mpsc::unbounded_channel();
        let (records_tx, records_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (cursor_tx, cursor_rx) = watch::channel(cursor.clone());

        let actor = PollerActor {
            name: name.clone(),
            source,
            tick_interval: config.active_interval,
            config,
            cursor,
            epoch: 0,
            queue: VecDeque::new(),
            demand: 0,
            in_flight: false,
            fetches: 0,
            failures: 0,
            emitted: 0,
            records_tx,
            completions_tx,
            cursor_tx,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(actor.snapshot(PollerState::Idle));

        let task = tokio::spawn(actor.run(demand_rx, completions_rx, snapshot_tx, cancel.clone()));

        PollerHandle {
            name,
            demand_tx,
            records_rx,
            cursor_rx,
            snapshot_rx,
            cancel,
            task: Some(task),
        }
    }
}

/// Consumer side of a running poller
pub struct PollerHandle<R, C> {
    name: String,
    demand_tx: mpsc::UnboundedSender<u64>,
    records_rx: mpsc::UnboundedReceiver<R>,
    cursor_rx: watch::Receiver<C>,
    snapshot_rx: watch::Receiver<PollerSnapshot<C>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<R, C: Clone> PollerHandle<R, C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask for `n` more records. Triggers an immediate state check.
    pub fn request_more(&self, n: u64) {
        if n == 0 {
            return;
        }
        if self.demand_tx.send(n).is_err() {
            debug!("Stream '{}': demand after poller stopped ignored", self.name);
        }
    }

    /// Next record, or `None` once the poller has stopped
    pub async fn recv(&mut self) -> Option<R> {
        self.records_rx.recv().await
    }

    /// Live view of the cursor, for checkpointing
    pub fn cursor(&self) -> watch::Receiver<C> {
        self.cursor_rx.clone()
    }

    pub fn snapshot(&self) -> PollerSnapshot<C> {
        self.snapshot_rx.borrow().clone()
    }

    /// Stop ticking and refuse new fetches. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the actor to exit
    pub async fn stop(&mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Stream '{}': poller task ended abnormally: {}", self.name, e);
            }
        }
    }
}

struct PollerActor<S: PageSource> {
    name: String,
    source: Arc<S>,
    config: PollerConfig,
    tick_interval: Duration,
    cursor: S::Cursor,
    /// Bumped on every cursor reset
    epoch: u64,
    queue: VecDeque<S::Record>,
    demand: u64,
    in_flight: bool,
    fetches: u64,
    failures: u64,
    emitted: u64,
    records_tx: mpsc::UnboundedSender<S::Record>,
    completions_tx: mpsc::UnboundedSender<FetchCompletion<S::Record>>,
    cursor_tx: watch::Sender<S::Cursor>,
}

impl<S: PageSource> PollerActor<S> {
    async fn run(
        mut self,
        mut demand_rx: mpsc::UnboundedReceiver<u64>,
        mut completions_rx: mpsc::UnboundedReceiver<FetchCompletion<S::Record>>,
        snapshot_tx: watch::Sender<PollerSnapshot<S::Cursor>>,
        cancel: CancellationToken,
    ) {
        info!(
            "Stream '{}': poller started at cursor {:?}",
            self.name, self.cursor
        );

        let mut ticker = new_interval(self.tick_interval);
        let mut reset = self.config.cursor_reset_interval.map(new_interval);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(completion) = completions_rx.recv() => {
                    if let Some(period) = self.on_fetch_completed(completion) {
                        ticker = new_interval(period);
                    }
                }

                demand = demand_rx.recv() => match demand {
                    Some(n) => {
                        self.demand = self.demand.saturating_add(n);
                        debug!(
                            "Stream '{}': demand +{} -> {} ({} queued)",
                            self.name, n, self.demand, self.queue.len()
                        );
                        self.evaluate();
                    }
                    None => {
                        debug!("Stream '{}': consumer gone", self.name);
                        break;
                    }
                },

                _ = ticker.tick() => self.evaluate(),

                _ = next_reset(&mut reset) => self.reset_cursor(),
            }

            let state = self.state();
            snapshot_tx.send_replace(self.snapshot(state));
        }

        snapshot_tx.send_replace(self.snapshot(PollerState::Stopped));
        info!(
            "Stream '{}': poller stopped at cursor {:?} \
             ({} fetches, {} records emitted, {} left queued)",
            self.name,
            self.cursor,
            self.fetches,
            self.emitted,
            self.queue.len()
        );
    }

    /// One state check: fetch when starved, otherwise drain.
    fn evaluate(&mut self) {
        if self.queue.is_empty() {
            if self.demand > 0 && !self.in_flight {
                self.start_fetch();
            }
            return;
        }

        let n = self.queue.len().min(self.demand as usize);
        if n == 0 {
            return;
        }
        for record in self.queue.drain(..n) {
            if self.records_tx.send(record).is_err() {
                debug!("Stream '{}': consumer closed, dropping records", self.name);
                break;
            }
        }
        self.demand -= n as u64;
        self.emitted += n as u64;
        debug!(
            "Stream '{}': emitted {} ({} queued, demand {})",
            self.name,
            n,
            self.queue.len(),
            self.demand
        );
    }

    fn start_fetch(&mut self) {
        self.in_flight = true;
        self.fetches += 1;
        debug!(
            "Stream '{}': fetching after cursor {:?}",
            self.name, self.cursor
        );

        let source = self.source.clone();
        let cursor = self.cursor.clone();
        let epoch = self.epoch;
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_page(&cursor).await;
            // fails only after cancellation; the late result is discarded
            let _ = completions.send(FetchCompletion { epoch, result });
        });
    }

    /// Apply a fetch result. Returns the new tick period when it changed.
    fn on_fetch_completed(
        &mut self,
        completion: FetchCompletion<S::Record>,
    ) -> Option<Duration> {
        self.in_flight = false;

        let records = match completion.result {
            Ok(records) => records,
            Err(e) => {
                self.failures += 1;
                warn!(
                    "Stream '{}': fetch after cursor {:?} failed: {}",
                    self.name, self.cursor, e
                );
                return None;
            }
        };

        let period = if records.is_empty() {
            debug!("Stream '{}': nothing new", self.name);
            self.config.empty_interval
        } else if completion.epoch != self.epoch {
            info!(
                "Stream '{}': fetched {} records from before the reset, cursor stays {:?}",
                self.name,
                records.len(),
                self.cursor
            );
            self.queue.extend(records);
            self.config.active_interval
        } else {
            let before = self.cursor.clone();
            for record in &records {
                let position = self.source.position(record);
                self.cursor.advance(&position);
            }
            info!(
                "Stream '{}': fetched {} records, cursor {:?} -> {:?}",
                self.name,
                records.len(),
                before,
                self.cursor
            );
            self.cursor_tx.send_replace(self.cursor.clone());
            self.queue.extend(records);
            self.config.active_interval
        };

        if period == self.tick_interval {
            return None;
        }
        debug!(
            "Stream '{}': tick interval {:?} -> {:?}",
            self.name, self.tick_interval, period
        );
        self.tick_interval = period;
        Some(period)
    }

    fn reset_cursor(&mut self) {
        info!(
            "Stream '{}': resetting cursor {:?} for a full rescan",
            self.name, self.cursor
        );
        self.cursor = S::Cursor::default();
        self.epoch += 1;
        self.cursor_tx.send_replace(self.cursor.clone());
    }

    fn state(&self) -> PollerState {
        if self.in_flight {
            PollerState::Fetching
        } else if !self.queue.is_empty() && self.demand > 0 {
            PollerState::Draining
        } else {
            PollerState::Idle
        }
    }

    fn snapshot(&self, state: PollerState) -> PollerSnapshot<S::Cursor> {
        PollerSnapshot {
            cursor: self.cursor.clone(),
            demand: self.demand,
            queued: self.queue.len(),
            in_flight: self.in_flight,
            tick_interval: self.tick_interval,
            fetches: self.fetches,
            failures: self.failures,
            emitted: self.emitted,
            state,
        }
    }
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_reset(reset: &mut Option<Interval>) {
    match reset {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
