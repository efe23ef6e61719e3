//! Paginated source trait

use crate::cursor::Cursor;
use crate::error::ConnectorResult;
use async_trait::async_trait;
use std::fmt::Debug;

/// A "list new records since X" endpoint.
///
/// Implementations return one page of records ordered by position, all with
/// a position strictly after `cursor` (or from the start when `cursor` is the
/// zero value). An empty page means there is nothing new right now.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl PageSource for CustomerListSource {
///     type Cursor = RecordId;
///     type Record = CustomerSummary;
///
///     fn name(&self) -> &str {
///         "customers"
///     }
///
///     fn position(&self, record: &CustomerSummary) -> RecordId {
///         RecordId(record.id)
///     }
///
///     async fn fetch_page(&self, cursor: &RecordId) -> ConnectorResult<Vec<CustomerSummary>> {
///         self.client.fetch_customers(&self.filters(cursor)).await
///     }
/// }
/// ```
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    /// High-water mark type used to ask for new records
    type Cursor: Cursor;

    /// Record type returned by the list endpoint
    type Record: Debug + Send + Sync + 'static;

    /// Stream name used in logs
    fn name(&self) -> &str;

    /// Position of a record, compared against the cursor
    fn position(&self, record: &Self::Record) -> Self::Cursor;

    /// Fetch the next page after `cursor`
    async fn fetch_page(&self, cursor: &Self::Cursor) -> ConnectorResult<Vec<Self::Record>>;
}
