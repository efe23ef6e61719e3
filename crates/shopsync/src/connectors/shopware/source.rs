//! Shopware list endpoints as page sources

use super::filter::Filter;
use super::types::{CustomerSummary, OrderSummary};
use super::ShopwareClient;
use crate::cursor::{OrderTime, RecordId};
use crate::error::ConnectorResult;
use crate::traits::{Acknowledger, PageSource};
use async_trait::async_trait;
use std::sync::Arc;

/// Unexported orders placed after the time cursor
pub struct OrderListSource {
    client: Arc<ShopwareClient>,
    extra_filters: Vec<Filter>,
}

impl OrderListSource {
    pub fn new(client: Arc<ShopwareClient>, extra_filters: Vec<Filter>) -> Self {
        Self {
            client,
            extra_filters,
        }
    }

    /// Filters for the next page after `cursor`
    pub fn filters(&self, cursor: &OrderTime) -> Vec<Filter> {
        let mut filters = vec![Filter::is_null(format!(
            "attribute.{}",
            self.client.exported_attribute()
        ))];
        if let Some(time) = cursor.0 {
            filters.push(Filter::greater_than("orderTime", time.to_rfc3339()));
        }
        filters.extend(self.extra_filters.iter().cloned());
        filters
    }
}

#[async_trait]
impl PageSource for OrderListSource {
    type Cursor = OrderTime;
    type Record = OrderSummary;

    fn name(&self) -> &str {
        "orders"
    }

    fn position(&self, record: &OrderSummary) -> OrderTime {
        OrderTime::at(record.order_time)
    }

    async fn fetch_page(&self, cursor: &OrderTime) -> ConnectorResult<Vec<OrderSummary>> {
        self.client.fetch_orders(&self.filters(cursor)).await
    }
}

/// Customers with an id above the id cursor
pub struct CustomerListSource {
    client: Arc<ShopwareClient>,
    extra_filters: Vec<Filter>,
}

impl CustomerListSource {
    pub fn new(client: Arc<ShopwareClient>, extra_filters: Vec<Filter>) -> Self {
        Self {
            client,
            extra_filters,
        }
    }

    pub fn filters(&self, cursor: &RecordId) -> Vec<Filter> {
        let mut filters = vec![Filter::greater_than("id", cursor.to_string())];
        filters.extend(self.extra_filters.iter().cloned());
        filters
    }
}

#[async_trait]
impl PageSource for CustomerListSource {
    type Cursor = RecordId;
    type Record = CustomerSummary;

    fn name(&self) -> &str {
        "customers"
    }

    fn position(&self, record: &CustomerSummary) -> RecordId {
        RecordId(record.id)
    }

    async fn fetch_page(&self, cursor: &RecordId) -> ConnectorResult<Vec<CustomerSummary>> {
        self.client.fetch_customers(&self.filters(cursor)).await
    }
}

/// Marks delivered orders as exported in the shop
pub struct OrderExportAck {
    client: Arc<ShopwareClient>,
}

impl OrderExportAck {
    pub fn new(client: Arc<ShopwareClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Acknowledger for OrderExportAck {
    type Record = OrderSummary;

    async fn acknowledge(&self, record: &OrderSummary) -> ConnectorResult<()> {
        self.client.mark_order_as_exported(record.id).await
    }
}
