//! Testing utilities for streams
//!
//! Scriptable in-memory implementations of every boundary trait, so the
//! poller and dispatcher can be exercised without a shop or a marketing API.
//!
//! # Example
//!
//! ```rust,ignore
//! use shopsync::traits::testing::*;
//!
//! let source = Arc::new(MockPageSource::new("customers").with_page([5, 7, 9]));
//! let destination = Arc::new(MockDestination::new().duplicate_on([7]));
//!
//! // ... run a Dispatcher ...
//!
//! assert_eq!(destination.pushed_ids(), vec![5, 7, 9]);
//! ```

use super::sink::{Acknowledger, Destination, PushOutcome};
use super::source::PageSource;
use super::transform::{Transform, TransformError};
use crate::cursor::RecordId;
use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Record produced by [`MockPageSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRecord {
    pub id: u64,
    pub label: String,
}

impl MockRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            label: format!("record-{}", id),
        }
    }
}

// ============================================================================
// Mock Source
// ============================================================================

/// A page source replaying a script of pages.
///
/// Once the script is exhausted every further fetch returns an empty page.
#[derive(Debug)]
pub struct MockPageSource {
    name: String,
    script: Mutex<VecDeque<ConnectorResult<Vec<MockRecord>>>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(RecordId, Instant)>>,
}

impl MockPageSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            latency: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a page containing records with the given ids
    pub fn with_page(self, ids: impl IntoIterator<Item = u64>) -> Self {
        let page = ids.into_iter().map(MockRecord::new).collect();
        self.script.lock().push_back(Ok(page));
        self
    }

    /// Queue an empty page
    pub fn with_empty_page(self) -> Self {
        self.script.lock().push_back(Ok(Vec::new()));
        self
    }

    /// Queue a failed fetch
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .push_back(Err(ConnectorError::transient(message)));
        self
    }

    /// Delay every fetch by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Cursors passed to `fetch_page`, in call order
    pub fn fetch_cursors(&self) -> Vec<RecordId> {
        self.calls.lock().iter().map(|(c, _)| *c).collect()
    }

    /// When each fetch was started
    pub fn fetch_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, t)| *t).collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl PageSource for MockPageSource {
    type Cursor = RecordId;
    type Record = MockRecord;

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self, record: &MockRecord) -> RecordId {
        RecordId(record.id)
    }

    async fn fetch_page(&self, cursor: &RecordId) -> ConnectorResult<Vec<MockRecord>> {
        self.calls.lock().push((*cursor, Instant::now()));
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ============================================================================
// Mock Transform
// ============================================================================

/// Identity transform that can reject or fail selected ids
#[derive(Debug, Default)]
pub struct MockTransform {
    rejected: Mutex<HashSet<u64>>,
    failing: Mutex<HashSet<u64>>,
    seen: Mutex<Vec<u64>>,
}

impl MockTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject these ids (filtered out)
    pub fn reject(self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.rejected.lock().extend(ids);
        self
    }

    /// Fail mapping for these ids
    pub fn fail_on(self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.failing.lock().extend(ids);
        self
    }

    /// Ids passed to `transform`, in call order
    pub fn seen_ids(&self) -> Vec<u64> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transform for MockTransform {
    type Input = MockRecord;
    type Output = MockRecord;

    async fn transform(&self, record: &MockRecord) -> Result<MockRecord, TransformError> {
        self.seen.lock().push(record.id);
        if self.rejected.lock().contains(&record.id) {
            return Err(TransformError::rejected(format!("record {} filtered", record.id)));
        }
        if self.failing.lock().contains(&record.id) {
            return Err(TransformError::mapping(format!(
                "record {} cannot be mapped",
                record.id
            )));
        }
        Ok(record.clone())
    }
}

// ============================================================================
// Mock Destination
// ============================================================================

/// A destination recording every push
#[derive(Debug)]
pub struct MockDestination {
    name: String,
    pushed: Mutex<Vec<(u64, Instant)>>,
    duplicates: Mutex<HashSet<u64>>,
    failing: Mutex<HashSet<u64>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for MockDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDestination {
    pub fn new() -> Self {
        Self {
            name: "mock-destination".to_string(),
            pushed: Mutex::new(Vec::new()),
            duplicates: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            latency: Mutex::new(None),
        }
    }

    /// Answer these ids with an "already exists" conflict
    pub fn duplicate_on(self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.duplicates.lock().extend(ids);
        self
    }

    /// Fail pushes for these ids
    pub fn fail_on(self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.failing.lock().extend(ids);
        self
    }

    /// Delay every push by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Ids of every push attempt, in call order
    pub fn pushed_ids(&self) -> Vec<u64> {
        self.pushed.lock().iter().map(|(id, _)| *id).collect()
    }

    /// When each push was started
    pub fn push_times(&self) -> Vec<Instant> {
        self.pushed.lock().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl Destination for MockDestination {
    type Record = MockRecord;

    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, record: &MockRecord) -> ConnectorResult<PushOutcome> {
        self.pushed.lock().push((record.id, Instant::now()));
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().contains(&record.id) {
            return Err(ConnectorError::http(400, format!("record {} invalid", record.id)));
        }
        if self.duplicates.lock().contains(&record.id) {
            return Ok(PushOutcome::AlreadyExists);
        }
        Ok(PushOutcome::Created)
    }
}

// ============================================================================
// Mock Acknowledger
// ============================================================================

/// An acknowledger recording every acknowledged id
#[derive(Debug, Default)]
pub struct MockAcknowledger {
    acknowledged: Mutex<Vec<u64>>,
    failing: Mutex<HashSet<u64>>,
}

impl MockAcknowledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail acknowledgment for these ids
    pub fn fail_on(self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.failing.lock().extend(ids);
        self
    }

    pub fn acknowledged_ids(&self) -> Vec<u64> {
        self.acknowledged.lock().clone()
    }
}

#[async_trait]
impl Acknowledger for MockAcknowledger {
    type Record = MockRecord;

    async fn acknowledge(&self, record: &MockRecord) -> ConnectorResult<()> {
        if self.failing.lock().contains(&record.id) {
            return Err(ConnectorError::connection("source unreachable"));
        }
        self.acknowledged.lock().push(record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_source_replays_script() {
        let source = MockPageSource::new("test")
            .with_page([1, 2])
            .with_failure("boom")
            .with_empty_page();

        let page = source.fetch_page(&RecordId(0)).await.unwrap();
        assert_eq!(page, vec![MockRecord::new(1), MockRecord::new(2)]);
        assert!(source.fetch_page(&RecordId(2)).await.is_err());
        assert!(source.fetch_page(&RecordId(2)).await.unwrap().is_empty());
        // exhausted script keeps returning empty pages
        assert!(source.fetch_page(&RecordId(2)).await.unwrap().is_empty());

        assert_eq!(
            source.fetch_cursors(),
            vec![RecordId(0), RecordId(2), RecordId(2), RecordId(2)]
        );
    }

    #[tokio::test]
    async fn test_mock_destination_outcomes() {
        let destination = MockDestination::new().duplicate_on([2]).fail_on([3]);

        assert_eq!(
            destination.push(&MockRecord::new(1)).await.unwrap(),
            PushOutcome::Created
        );
        assert_eq!(
            destination.push(&MockRecord::new(2)).await.unwrap(),
            PushOutcome::AlreadyExists
        );
        assert!(destination.push(&MockRecord::new(3)).await.is_err());
        assert_eq!(destination.pushed_ids(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_mock_transform() {
        let transform = MockTransform::new().reject([1]).fail_on([2]);

        assert!(transform
            .transform(&MockRecord::new(1))
            .await
            .unwrap_err()
            .is_rejection());
        assert!(matches!(
            transform.transform(&MockRecord::new(2)).await,
            Err(TransformError::Mapping(_))
        ));
        assert_eq!(
            transform.transform(&MockRecord::new(3)).await.unwrap(),
            MockRecord::new(3)
        );
        assert_eq!(transform.seen_ids(), vec![1, 2, 3]);
    }
}
