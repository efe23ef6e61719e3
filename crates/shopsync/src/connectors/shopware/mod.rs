//! Shopware 5 REST API source
//!
//! Lists new orders and customers, fetches full orders, and marks exported
//! orders through a custom order attribute.
//!
//! # Configuration
//!
//! ```yaml
//! shopware:
//!   base_url: https://shop.example.com
//!   username: api
//!   password: ${SHOPWARE_PASSWORD}
//!   exported_attribute: mbExported
//!   customer_filters:
//!     - property: customerGroup
//!       value: EK
//! ```

pub mod filter;
pub mod source;
pub mod types;

pub use filter::Filter;
pub use source::{CustomerListSource, OrderExportAck, OrderListSource};
pub use types::{CustomerSummary, Order, OrderSummary};

use super::{base_url, endpoint, error_for_status, http_client};
use crate::cursor;
use crate::error::ConnectorResult;
use crate::types::SensitiveString;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use types::DataEnvelope;
use validator::Validate;

/// Shopware connection settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct ShopwareConfig {
    /// Shop base URL (API paths are appended)
    #[validate(url)]
    pub base_url: String,

    /// API user
    #[validate(length(min = 1))]
    pub username: String,

    /// API key of the user
    pub password: SensitiveString,

    /// Order attribute holding the export timestamp (default: mbExported)
    #[serde(default = "default_exported_attribute")]
    #[validate(length(min = 1))]
    pub exported_attribute: String,

    /// Extra filters for the order list
    #[serde(default)]
    pub order_filters: Vec<Filter>,

    /// Extra filters for the customer list
    #[serde(default)]
    pub customer_filters: Vec<Filter>,

    /// Records per list request (default: 100)
    #[serde(default = "default_page_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub page_limit: u32,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u32,
}

fn default_exported_attribute() -> String {
    "mbExported".to_string()
}

fn default_page_limit() -> u32 {
    100
}

fn default_timeout() -> u32 {
    30
}

/// Shopware REST client
pub struct ShopwareClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: SensitiveString,
    exported_attribute: String,
    page_limit: u32,
}

impl ShopwareClient {
    pub fn new(config: &ShopwareConfig) -> ConnectorResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs as u64))?,
            base_url: base_url(&config.base_url)?,
            username: config.username.clone(),
            password: config.password.clone(),
            exported_attribute: config.exported_attribute.clone(),
            page_limit: config.page_limit,
        })
    }

    pub fn exported_attribute(&self) -> &str {
        &self.exported_attribute
    }

    /// List orders matching `filters`, oldest first
    pub async fn fetch_orders(&self, filters: &[Filter]) -> ConnectorResult<Vec<OrderSummary>> {
        let mut orders: Vec<OrderSummary> = self.list("/api/orders", "orderTime", filters).await?;
        let now = cursor::now();
        for order in &mut orders {
            order.fetched_at = Some(now);
        }
        info!("Fetched orders with ids: {}", join_ids(orders.iter().map(|o| o.id)));
        Ok(orders)
    }

    /// List customers matching `filters`, lowest id first
    pub async fn fetch_customers(
        &self,
        filters: &[Filter],
    ) -> ConnectorResult<Vec<CustomerSummary>> {
        let mut customers: Vec<CustomerSummary> =
            self.list("/api/customers", "id", filters).await?;
        let now = cursor::now();
        for customer in &mut customers {
            customer.fetched_at = Some(now);
        }
        info!(
            "Fetched customers with ids: {}",
            join_ids(customers.iter().map(|c| c.id))
        );
        Ok(customers)
    }

    /// Fetch the full order
    pub async fn fetch_order(&self, id: u64) -> ConnectorResult<Order> {
        debug!("Fetch order with id {}", id);
        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("/api/orders/{}", id)))
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await?;
        let envelope: DataEnvelope<Order> = error_for_status(response).await?.json().await?;

        let mut order = envelope.data;
        order.fetched_at = Some(cursor::now());
        Ok(order)
    }

    /// Stamp the export attribute of an order with the current time
    pub async fn mark_order_as_exported(&self, id: u64) -> ConnectorResult<()> {
        let mut attribute = serde_json::Map::new();
        attribute.insert(
            self.exported_attribute.clone(),
            serde_json::Value::String(cursor::now().to_rfc3339()),
        );
        let body = serde_json::json!({ "attribute": attribute });

        let response = self
            .client
            .put(endpoint(&self.base_url, &format!("/api/orders/{}", id)))
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .json(&body)
            .send()
            .await?;
        error_for_status(response).await?;

        info!("Marked order with id {} as exported", id);
        Ok(())
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        sort_property: &str,
        filters: &[Filter],
    ) -> ConnectorResult<Vec<T>> {
        let mut query = filter::to_query_params(filters);
        query.push(("limit".to_string(), self.page_limit.to_string()));
        query.push(("sort[0][property]".to_string(), sort_property.to_string()));
        query.push(("sort[0][direction]".to_string(), "ASC".to_string()));

        debug!("GET {} with {:?}", path, query);
        let response = self
            .client
            .get(endpoint(&self.base_url, path))
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .query(&query)
            .send()
            .await?;
        let envelope: DataEnvelope<Vec<T>> = error_for_status(response).await?.json().await?;
        Ok(envelope.data)
    }
}

fn join_ids(ids: impl Iterator<Item = u64>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}
