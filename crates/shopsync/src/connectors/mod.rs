//! Remote system connectors
//!
//! | Connector | Role | Endpoints |
//! |-----------|------|-----------|
//! | [`shopware`] | source | `GET /api/orders`, `GET /api/customers`, `GET /api/orders/{id}`, `PUT /api/orders/{id}` |
//! | [`mailbluster`] | destination | `POST /api/orders`, `POST /api/leads` |

pub mod mailbluster;
pub mod shopware;

use crate::error::{ConnectorError, ConnectorResult};
use std::time::Duration;

/// Build the shared HTTP client for a connector
pub(crate) fn http_client(timeout: Duration) -> ConnectorResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| ConnectorError::config(format!("Failed to create HTTP client: {}", e)))
}

/// Parse a configured base URL; only http and https are accepted
pub(crate) fn base_url(raw: &str) -> ConnectorResult<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConnectorError::config(format!("Invalid base URL '{}': {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        scheme => Err(ConnectorError::config(format!(
            "Base URL must use http or https scheme, got '{}'",
            scheme
        ))),
    }
}

/// Join a base URL and an absolute API path without losing a base path prefix
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map a non-success response to a [`ConnectorError`]
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> ConnectorResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> ConnectorError {
    match status.as_u16() {
        401 | 403 => ConnectorError::Auth(format!("{}: {}", status, body)),
        404 => ConnectorError::NotFound(body),
        429 => ConnectorError::RateLimited(body),
        code => ConnectorError::http(code, body),
    }
}
