//! Per-stream dispatch: fetch -> transform -> gate -> push -> acknowledge
//!
//! A [`Dispatcher`] owns one poller and its checkpoint writer. Records are
//! transformed and admitted through the rate-limit gate one at a time, in
//! fetch order; each admitted record is then pushed (and acknowledged) on its
//! own task so a slow push never stalls the stream.
//!
//! Failures never leave the record they belong to:
//! - transform failure: record dropped
//! - push failure: record dropped, not acknowledged
//! - duplicate conflict: counts as delivered, acknowledged
//! - acknowledge failure: logged, the push is not rolled back

use crate::checkpoint::{CheckpointWriter, SharedCheckpointStore};
use crate::error::{Result, StreamStatus};
use crate::poller::{Poller, PollerConfig};
use crate::rate_limiter::RateLimitGate;
use crate::traits::{Acknowledger, Destination, PageSource, PushOutcome, Transform};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poller: PollerConfig,
    /// Records requested from the poller ahead of the gate
    pub prefetch: u64,
    /// How often the cursor is persisted
    pub checkpoint_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            prefetch: 16,
            checkpoint_interval: Duration::from_secs(5),
        }
    }
}

/// Live per-stream counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    fetched: AtomicU64,
    rejected: AtomicU64,
    transform_failed: AtomicU64,
    admitted: AtomicU64,
    pushed: AtomicU64,
    duplicates: AtomicU64,
    push_failed: AtomicU64,
    acknowledged: AtomicU64,
    ack_failed: AtomicU64,
}

impl DispatchStats {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transform_failed: self.transform_failed.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            push_failed: self.push_failed.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            ack_failed: self.ack_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    /// Records received from the poller
    pub fetched: u64,
    /// Records filtered out by the transform
    pub rejected: u64,
    /// Records the transform could not map
    pub transform_failed: u64,
    /// Records let through the gate
    pub admitted: u64,
    /// Records created at the destination
    pub pushed: u64,
    /// Pushes answered with "already exists"
    pub duplicates: u64,
    pub push_failed: u64,
    pub acknowledged: u64,
    pub ack_failed: u64,
}

impl DispatchStatsSnapshot {
    /// Records the destination holds after this session
    pub fn delivered(&self) -> u64 {
        self.pushed + self.duplicates
    }
}

impl fmt::Display for DispatchStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} rejected={} transform_failed={} pushed={} duplicates={} push_failed={} acknowledged={} ack_failed={}",
            self.fetched,
            self.rejected,
            self.transform_failed,
            self.pushed,
            self.duplicates,
            self.push_failed,
            self.acknowledged,
            self.ack_failed
        )
    }
}

type SharedTransform<I, O> = Arc<dyn Transform<Input = I, Output = O>>;
type SharedDestination<O> = Arc<dyn Destination<Record = O>>;
type SharedAcknowledger<I> = Arc<dyn Acknowledger<Record = I>>;

/// Orchestrates one entity stream
pub struct Dispatcher<S: PageSource, O> {
    name: String,
    source: Arc<S>,
    transform: SharedTransform<S::Record, O>,
    destination: SharedDestination<O>,
    acknowledger: Option<SharedAcknowledger<S::Record>>,
    gate: Arc<RateLimitGate>,
    checkpoint: SharedCheckpointStore<S::Cursor>,
    config: DispatcherConfig,
    stats: Arc<DispatchStats>,
    status: RwLock<StreamStatus>,
}

impl<S, O> Dispatcher<S, O>
where
    S: PageSource,
    O: Send + Sync + 'static,
{
    pub fn new(
        source: Arc<S>,
        transform: SharedTransform<S::Record, O>,
        destination: SharedDestination<O>,
        gate: Arc<RateLimitGate>,
        checkpoint: SharedCheckpointStore<S::Cursor>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            name: source.name().to_string(),
            source,
            transform,
            destination,
            acknowledger: None,
            gate,
            checkpoint,
            config,
            stats: Arc::new(DispatchStats::default()),
            status: RwLock::new(StreamStatus::Starting),
        }
    }

    /// Confirm each delivered record back to the source
    pub fn with_acknowledger(mut self, acknowledger: SharedAcknowledger<S::Record>) -> Self {
        self.acknowledger = Some(acknowledger);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> StreamStatus {
        *self.status.read()
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Run the stream until `cancel` fires.
    ///
    /// Pushes still in flight at shutdown are left to finish on their own.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let cursor = self.checkpoint.load().await;
        let stream_cancel = cancel.child_token();

        let mut poller = Poller::start(
            self.source.clone(),
            cursor,
            self.config.poller.clone(),
            stream_cancel.clone(),
        );
        let writer = CheckpointWriter::spawn(
            self.name.clone(),
            self.checkpoint.clone(),
            poller.cursor(),
            self.config.checkpoint_interval,
            stream_cancel.clone(),
        );

        *self.status.write() = StreamStatus::Running;
        info!(
            "Stream '{}' started, pushing to {} (prefetch {})",
            self.name,
            self.destination.name(),
            self.config.prefetch
        );
        poller.request_more(self.config.prefetch);

        loop {
            let record = tokio::select! {
                biased;
                _ = stream_cancel.cancelled() => break,
                record = poller.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };
            DispatchStats::incr(&self.stats.fetched);
            let position = self.source.position(&record);

            let transformed = tokio::select! {
                biased;
                _ = stream_cancel.cancelled() => break,
                result = self.transform.transform(&record) => result,
            };
            let output = match transformed {
                Ok(output) => output,
                Err(e) if e.is_rejection() => {
                    DispatchStats::incr(&self.stats.rejected);
                    info!("Stream '{}': skipping record {:?}: {}", self.name, position, e);
                    poller.request_more(1);
                    continue;
                }
                Err(e) => {
                    DispatchStats::incr(&self.stats.transform_failed);
                    warn!(
                        "Stream '{}': dropping record {:?}, transform failed: {}",
                        self.name, position, e
                    );
                    poller.request_more(1);
                    continue;
                }
            };

            tokio::select! {
                biased;
                _ = stream_cancel.cancelled() => break,
                waited = self.gate.admit() => {
                    if !waited.is_zero() {
                        debug!(
                            "Stream '{}': record {:?} waited {:?} at the gate",
                            self.name, position, waited
                        );
                    }
                }
            }
            DispatchStats::incr(&self.stats.admitted);

            tokio::spawn(deliver(
                self.name.clone(),
                format!("{:?}", position),
                record,
                output,
                self.destination.clone(),
                self.acknowledger.clone(),
                self.stats.clone(),
            ));
            poller.request_more(1);
        }

        stream_cancel.cancel();
        poller.stop().await;
        if let Err(e) = writer.await {
            warn!("Stream '{}': checkpoint writer ended abnormally: {}", self.name, e);
        }

        *self.status.write() = StreamStatus::Stopped;
        info!("Stream '{}' stopped: {}", self.name, self.stats());
        Ok(())
    }
}

async fn deliver<I, O>(
    stream: String,
    position: String,
    record: I,
    output: O,
    destination: SharedDestination<O>,
    acknowledger: Option<SharedAcknowledger<I>>,
    stats: Arc<DispatchStats>,
) where
    I: Send + Sync,
    O: Send + Sync,
{
    match destination.push(&output).await {
        Ok(PushOutcome::Created) => {
            DispatchStats::incr(&stats.pushed);
            info!("Stream '{}': pushed record {}", stream, position);
        }
        Ok(PushOutcome::AlreadyExists) => {
            DispatchStats::incr(&stats.duplicates);
            info!(
                "Stream '{}': record {} already exists at {}",
                stream,
                position,
                destination.name()
            );
        }
        Err(e) => {
            DispatchStats::incr(&stats.push_failed);
            warn!("Stream '{}': push of record {} failed: {}", stream, position, e);
            return;
        }
    }

    let Some(acknowledger) = acknowledger else {
        return;
    };
    match acknowledger.acknowledge(&record).await {
        Ok(()) => {
            DispatchStats::incr(&stats.acknowledged);
            debug!("Stream '{}': acknowledged record {}", stream, position);
        }
        Err(e) => {
            DispatchStats::incr(&stats.ack_failed);
            warn!(
                "Stream '{}': acknowledging record {} failed: {}",
                stream, position, e
            );
        }
    }
}
