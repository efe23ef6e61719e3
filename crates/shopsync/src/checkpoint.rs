//! # Cursor Checkpointing
//!
//! Durable, corruption-tolerant persistence of one cursor per stream.
//!
//! ## Features
//!
//! - **Plain text**: one value per file (`42`, `2023-05-01T10:00:00+02:00`)
//! - **Atomic updates**: write to a temp file, fsync, rename over the old value
//! - **Never fatal on read**: a missing or corrupt file yields the zero cursor
//! - **Bounded write amplification**: [`CheckpointWriter`] saves on a fixed
//!   period, and only when the cursor moved since the last save
//!
//! ## Usage
//!
//! ```ignore
//! use shopsync::checkpoint::{CheckpointStore, FileCheckpointStore};
//! use shopsync::cursor::RecordId;
//!
//! let store = FileCheckpointStore::<RecordId>::new("state/last-fetched-id.txt");
//! let cursor = store.load().await; // RecordId(0) on first start
//! store.save(&RecordId(42)).await?;
//! ```

use crate::cursor::Cursor;
use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Storage backend for a single stream cursor.
#[async_trait]
pub trait CheckpointStore<C: Cursor>: Send + Sync {
    /// Read the persisted cursor. Never fails: problems are logged and the
    /// zero cursor is returned.
    async fn load(&self) -> C;

    /// Overwrite the persisted cursor.
    async fn save(&self, cursor: &C) -> ConnectorResult<()>;
}

/// Shared checkpoint backend.
pub type SharedCheckpointStore<C> = Arc<dyn CheckpointStore<C>>;

/// Checkpoint stored as a plain-text file.
pub struct FileCheckpointStore<C> {
    path: PathBuf,
    fsync: bool,
    _cursor: PhantomData<fn() -> C>,
}

impl<C: Cursor> FileCheckpointStore<C> {
    /// Create a store writing to `path` (parent directories are created on save).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fsync: true,
            _cursor: PhantomData,
        }
    }

    /// Disable fsync after writes (tests, tmpfs).
    pub fn without_fsync(mut self) -> Self {
        self.fsync = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<C: Cursor> CheckpointStore<C> for FileCheckpointStore<C> {
    async fn load(&self) -> C {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "No checkpoint at {}; starting from {:?}",
                    self.path.display(),
                    C::default()
                );
                return C::default();
            }
            Err(e) => {
                warn!(
                    "Failed to read checkpoint {}: {}; starting from {:?}",
                    self.path.display(),
                    e,
                    C::default()
                );
                return C::default();
            }
        };

        match C::decode(&contents) {
            Ok(cursor) => {
                info!("Loaded checkpoint {:?} from {}", cursor, self.path.display());
                cursor
            }
            Err(e) => {
                warn!(
                    "Failed to parse checkpoint {}: {}; starting from {:?}",
                    self.path.display(),
                    e,
                    C::default()
                );
                C::default()
            }
        }
    }

    async fn save(&self, cursor: &C) -> ConnectorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await?;

        file.write_all(cursor.encode().as_bytes()).await?;
        if self.fsync {
            file.sync_all().await?;
        }
        drop(file);

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            ConnectorError::State(format!(
                "failed to replace checkpoint {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Saved checkpoint {:?} to {}", cursor, self.path.display());
        Ok(())
    }
}

/// In-memory checkpoint (for testing or when persistence isn't needed).
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore<C> {
    value: Mutex<Option<C>>,
    saves: Mutex<usize>,
}

impl<C: Cursor> MemoryCheckpointStore<C> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            saves: Mutex::new(0),
        }
    }

    pub fn with_value(cursor: C) -> Self {
        Self {
            value: Mutex::new(Some(cursor)),
            saves: Mutex::new(0),
        }
    }

    /// Last saved value
    pub fn get(&self) -> Option<C> {
        self.value.lock().clone()
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl<C: Cursor> CheckpointStore<C> for MemoryCheckpointStore<C> {
    async fn load(&self) -> C {
        self.get().unwrap_or_default()
    }

    async fn save(&self, cursor: &C) -> ConnectorResult<()> {
        *self.value.lock() = Some(cursor.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

/// Periodically persists the latest cursor published on a watch channel.
pub struct CheckpointWriter;

impl CheckpointWriter {
    /// Spawn the writer task.
    ///
    /// Every `period` the current value of `cursor` is saved if it differs
    /// from the last saved value. The task ends when `cancel` fires or the
    /// sender side is dropped. Save failures are logged and retried on the
    /// next period.
    pub fn spawn<C: Cursor>(
        name: impl Into<String>,
        store: SharedCheckpointStore<C>,
        mut cursor: watch::Receiver<C>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let name = name.into();
        // Baseline is the value at spawn time, not at first poll of the task
        let mut last_saved = cursor.borrow_and_update().clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if cursor.has_changed().is_err() {
                    debug!("Stream '{}': cursor source closed, checkpoint writer exiting", name);
                    break;
                }

                let current = cursor.borrow_and_update().clone();
                if current == last_saved {
                    continue;
                }

                match store.save(&current).await {
                    Ok(()) => {
                        debug!("Stream '{}': checkpointed cursor {:?}", name, current);
                        last_saved = current;
                    }
                    Err(e) => {
                        warn!("Stream '{}': failed to save checkpoint: {}", name, e);
                    }
                }
            }
        })
    }
}
