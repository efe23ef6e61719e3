//! shopsync - Shopware to MailBluster synchronisation
//!
//! Two long-running streams pull new records out of a Shopware shop and push
//! them into MailBluster:
//!
//! - **orders**: unexported orders after a time cursor, enriched with the full
//!   order, pushed as MailBluster orders and marked as exported afterwards
//! - **customers**: customers after an id cursor, pushed as leads
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐ demand ┌────────────┐ record ┌───────────┐ admit ┌──────┐ push ┌─────────────┐
//! │  Poller  │◀───────│ Dispatcher │───────▶│ Transform │──────▶│ Gate │─────▶│ Destination │──▶ ack
//! └──────────┘        └────────────┘        └───────────┘       └──────┘      └─────────────┘
//!      │ cursor (watch)
//!      ▼
//! ┌──────────────────┐
//! │ CheckpointWriter │──▶ state/<stream cursor>.txt
//! └──────────────────┘
//! ```
//!
//! The [`poller::Poller`] fetches pages only while the consumer has
//! outstanding demand, the [`rate_limiter::RateLimitGate`] admits records in
//! arrival order under the destination's request budget, and a failure on
//! one record never stops its stream.
//!
//! # Usage
//!
//! ```bash
//! # Run both streams
//! shopsync -c shopsync.yaml
//!
//! # Validate configuration
//! shopsync -c shopsync.yaml validate
//!
//! # Show persisted cursors
//! shopsync -c shopsync.yaml cursor
//! ```

pub mod checkpoint;
pub mod config;
pub mod connectors;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod mapping;
pub mod poller;
pub mod rate_limiter;
pub mod sync_service;
pub mod traits;
pub mod types;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::SyncConfig;
pub use cursor::{Cursor, OrderTime, RecordId};
pub use dispatcher::{DispatchStatsSnapshot, Dispatcher, DispatcherConfig};
pub use error::{ConnectorError, ConnectorResult, Result, StreamStatus, SyncError};
pub use poller::{Poller, PollerConfig, PollerHandle};
pub use rate_limiter::{RateLimitConfig, RateLimitGate, RateLimiterStats};
pub use sync_service::SyncService;
pub use traits::{Acknowledger, Destination, PageSource, PushOutcome, Transform, TransformError};
pub use types::SensitiveString;
