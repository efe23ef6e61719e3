//! MailBluster REST API destination
//!
//! Creates orders and leads. A 422 answer on the orders endpoint saying
//! "Order id already exists" is reported as [`PushOutcome::AlreadyExists`],
//! not as an error. Leads have no such case; every rejection is an error.

pub mod campaign;
pub mod types;

pub use campaign::{CampaignMapping, PartnerCampaignMapper};
pub use types::{Lead, MailBlusterOrder, OrderCustomer, Product};

use super::{base_url, endpoint, http_client, status_error};
use crate::error::ConnectorResult;
use crate::traits::{Destination, PushOutcome};
use crate::types::SensitiveString;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

/// MailBluster connection and throughput settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct MailBlusterConfig {
    /// API base URL (default: https://api.mailbluster.com)
    #[serde(default = "default_base_url")]
    #[validate(url)]
    pub base_url: String,

    /// API key, sent as the `Authorization` header
    pub api_key: SensitiveString,

    /// Requests allowed per rate-limit period
    #[validate(range(min = 1))]
    pub requests_per_minute: u32,

    /// Length of the rate-limit period in milliseconds (default: 65000)
    #[serde(default = "default_rate_limit_period_ms")]
    #[validate(range(min = 1))]
    pub rate_limit_period_ms: u64,

    /// Fixed partner -> campaign assignments
    #[serde(default)]
    pub campaign_mappings: Vec<CampaignMapping>,

    /// Regex whose first group is taken as campaign id for unmapped partners
    #[serde(default)]
    pub campaign_pass_through_pattern: Option<String>,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u32,
}

/// Body of the 422 answer for an order id that was pushed before
const ORDER_EXISTS: &str = "Order id already exists";

fn default_base_url() -> String {
    "https://api.mailbluster.com".to_string()
}

fn default_rate_limit_period_ms() -> u64 {
    65_000
}

fn default_timeout() -> u32 {
    30
}

impl MailBlusterConfig {
    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_millis(self.rate_limit_period_ms)
    }
}

/// MailBluster REST client
pub struct MailBlusterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SensitiveString,
}

impl MailBlusterClient {
    pub fn new(config: &MailBlusterConfig) -> ConnectorResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs as u64))?,
            base_url: base_url(&config.base_url)?,
            api_key: config.api_key.clone(),
        })
    }

    pub async fn create_order(&self, order: &MailBlusterOrder) -> ConnectorResult<PushOutcome> {
        self.create("/api/orders", order, &order.id, Some(ORDER_EXISTS))
            .await
    }

    pub async fn create_lead(&self, lead: &Lead) -> ConnectorResult<PushOutcome> {
        self.create("/api/leads", lead, &lead.email, None).await
    }

    async fn create<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        key: &str,
        duplicate_marker: Option<&str>,
    ) -> ConnectorResult<PushOutcome> {
        let response = self
            .client
            .post(endpoint(&self.base_url, path))
            .header(AUTHORIZATION, self.api_key.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("POST {} {} -> {}", path, key, status);
            return Ok(PushOutcome::Created);
        }

        let text = response.text().await.unwrap_or_default();
        if is_duplicate(status, &text, duplicate_marker) {
            return Ok(PushOutcome::AlreadyExists);
        }

        warn!(
            "POST {} {} rejected with {}:\nRequest:\n{}\nResponse:\n{}",
            path,
            key,
            status,
            serde_json::to_string_pretty(body).unwrap_or_default(),
            text
        );
        Err(status_error(status, text))
    }
}

fn is_duplicate(status: StatusCode, body: &str, marker: Option<&str>) -> bool {
    status == StatusCode::UNPROCESSABLE_ENTITY && marker.is_some_and(|m| body.contains(m))
}

/// Pushes mapped orders
pub struct OrderDestination {
    client: Arc<MailBlusterClient>,
}

impl OrderDestination {
    pub fn new(client: Arc<MailBlusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Destination for OrderDestination {
    type Record = MailBlusterOrder;

    fn name(&self) -> &str {
        "mailbluster-orders"
    }

    async fn push(&self, record: &MailBlusterOrder) -> ConnectorResult<PushOutcome> {
        self.client.create_order(record).await
    }
}

/// Pushes leads
pub struct LeadDestination {
    client: Arc<MailBlusterClient>,
}

impl LeadDestination {
    pub fn new(client: Arc<MailBlusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Destination for LeadDestination {
    type Record = Lead;

    fn name(&self) -> &str {
        "mailbluster-leads"
    }

    async fn push(&self, record: &Lead) -> ConnectorResult<PushOutcome> {
        self.client.create_lead(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use mockito::{Matcher, Server};
    use std::collections::BTreeMap;

    fn client(base_url: String) -> MailBlusterClient {
        let config: MailBlusterConfig = serde_yaml::from_str(&format!(
            "base_url: {}\napi_key: mb-key\nrequests_per_minute: 60\n",
            base_url
        ))
        .unwrap();
        MailBlusterClient::new(&config).unwrap()
    }

    fn order() -> MailBlusterOrder {
        MailBlusterOrder {
            id: "20001".to_string(),
            customer: OrderCustomer {
                email: "max@example.com".to_string(),
                meta: BTreeMap::new(),
                ..Default::default()
            },
            campaign_id: Some(5),
            currency: Some("EUR".to_string()),
            total_price: 19.95,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_config_defaults() {
        let yaml = "api_key: k\nrequests_per_minute: 60\n";
        let config: MailBlusterConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.base_url, "https://api.mailbluster.com");
        assert_eq!(config.rate_limit_period(), Duration::from_secs(65));
        assert!(config.campaign_pass_through_pattern.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_rate() {
        let yaml = "api_key: k\nrequests_per_minute: 0\n";
        let config: MailBlusterConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_create_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/orders")
            .match_header("authorization", "mb-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "id": "20001",
                "campaignId": 5,
                "customer": {"email": "max@example.com"}
            })))
            .with_status(201)
            .with_body(r#"{"message": "Order created"}"#)
            .create_async()
            .await;

        let outcome = client(server.url()).create_order(&order()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(outcome, PushOutcome::Created);
    }

    #[tokio::test]
    async fn test_existing_order_is_duplicate() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/orders")
            .with_status(422)
            .with_body(r#"{"message": "Order id already exists"}"#)
            .create_async()
            .await;

        let outcome = client(server.url()).create_order(&order()).await.unwrap();
        assert!(outcome.is_duplicate());
    }

    #[tokio::test]
    async fn test_other_validation_error_fails() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/leads")
            .with_status(422)
            .with_body(r#"{"message": "The email must be a valid email address."}"#)
            .create_async()
            .await;

        let lead = Lead {
            first_name: None,
            last_name: None,
            email: "broken".to_string(),
            subscribed: true,
        };
        let err = client(server.url()).create_lead(&lead).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Http { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_existing_lead_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/leads")
            .with_status(422)
            .with_body(r#"{"message": "Lead already exists"}"#)
            .create_async()
            .await;

        let lead = Lead {
            first_name: Some("Erika".to_string()),
            last_name: None,
            email: "erika@example.com".to_string(),
            subscribed: true,
        };
        let err = client(server.url()).create_lead(&lead).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Http { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_other_order_conflict_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/orders")
            .with_status(422)
            .with_body(r#"{"message": "Customer already exists with another email"}"#)
            .create_async()
            .await;

        let err = client(server.url()).create_order(&order()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Http { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/leads")
            .with_status(401)
            .create_async()
            .await;

        let lead = Lead {
            first_name: None,
            last_name: None,
            email: "erika@example.com".to_string(),
            subscribed: true,
        };
        let err = client(server.url()).create_lead(&lead).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Auth(_)));
    }

    #[test]
    fn test_duplicate_detection() {
        let unprocessable = StatusCode::UNPROCESSABLE_ENTITY;
        let body = r#"{"message":"Order id already exists"}"#;

        assert!(is_duplicate(unprocessable, body, Some(ORDER_EXISTS)));
        assert!(!is_duplicate(unprocessable, "invalid email", Some(ORDER_EXISTS)));
        assert!(!is_duplicate(unprocessable, "Lead already exists", Some(ORDER_EXISTS)));
        assert!(!is_duplicate(StatusCode::CONFLICT, body, Some(ORDER_EXISTS)));
        assert!(!is_duplicate(unprocessable, body, None));
    }
}
