//! Destination and acknowledgment traits

use crate::error::ConnectorResult;
use async_trait::async_trait;

/// Successful result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The destination stored a new record
    Created,
    /// The destination already had this record (idempotent conflict)
    AlreadyExists,
}

impl PushOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }
}

/// Write side of a stream.
///
/// A duplicate conflict must be reported as `Ok(PushOutcome::AlreadyExists)`,
/// never as an error: delivery is at-least-once and re-pushes are expected.
#[async_trait]
pub trait Destination: Send + Sync {
    type Record: Send + Sync;

    /// Destination name used in logs
    fn name(&self) -> &str;

    async fn push(&self, record: &Self::Record) -> ConnectorResult<PushOutcome>;
}

/// Post-push confirmation sent back to the source (e.g. mark as exported).
#[async_trait]
pub trait Acknowledger: Send + Sync {
    type Record: Send + Sync;

    async fn acknowledge(&self, record: &Self::Record) -> ConnectorResult<()>;
}
