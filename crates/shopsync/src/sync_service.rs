//! Wires the configured streams together
//!
//! ```text
//! orders:    OrderListSource ──▶ OrderTransform ──┐                 ┌─▶ OrderDestination ──▶ OrderExportAck
//!                                                 ├─▶ RateLimitGate ┤
//! customers: CustomerListSource ─▶ LeadTransform ─┘                 └─▶ LeadDestination
//! ```
//!
//! Both streams share one gate because MailBluster limits requests per API key.

use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::SyncConfig;
use crate::connectors::mailbluster::{
    Lead, LeadDestination, MailBlusterClient, MailBlusterOrder, OrderDestination,
    PartnerCampaignMapper,
};
use crate::connectors::shopware::{
    CustomerListSource, OrderExportAck, OrderListSource, ShopwareClient,
};
use crate::cursor::{Cursor, OrderTime, RecordId};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SyncError};
use crate::mapping::{LeadTransform, OrderTransform};
use crate::rate_limiter::{RateLimitConfig, RateLimitGate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// File holding the order time cursor
pub const ORDER_CURSOR_FILE: &str = "order-time.txt";
/// File holding the customer id cursor
pub const CUSTOMER_CURSOR_FILE: &str = "last-fetched-id.txt";

pub fn order_cursor_store(state_dir: &Path) -> FileCheckpointStore<OrderTime> {
    FileCheckpointStore::new(state_dir.join(ORDER_CURSOR_FILE))
}

pub fn customer_cursor_store(state_dir: &Path) -> FileCheckpointStore<RecordId> {
    FileCheckpointStore::new(state_dir.join(CUSTOMER_CURSOR_FILE))
}

type OrderDispatcher = Dispatcher<OrderListSource, MailBlusterOrder>;
type CustomerDispatcher = Dispatcher<CustomerListSource, Lead>;

/// Both sync streams and their shared rate limiter
pub struct SyncService {
    orders: Option<Arc<OrderDispatcher>>,
    customers: Option<Arc<CustomerDispatcher>>,
    gate: Arc<RateLimitGate>,
    state_dir: PathBuf,
}

impl SyncService {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let shopware = Arc::new(ShopwareClient::new(&config.shopware)?);
        let mailbluster = Arc::new(MailBlusterClient::new(&config.mailbluster)?);
        let gate = Arc::new(RateLimitGate::new(RateLimitConfig::new(
            config.mailbluster.requests_per_minute,
            config.mailbluster.rate_limit_period(),
        )));
        let state_dir = config.settings.state_dir.clone();

        let orders = if config.streams.orders.enabled {
            let campaigns = PartnerCampaignMapper::new(
                &config.mailbluster.campaign_mappings,
                config.mailbluster.campaign_pass_through_pattern.as_deref(),
            )
            .map_err(|e| SyncError::config(format!("invalid campaign pattern: {}", e)))?;

            let dispatcher: OrderDispatcher = Dispatcher::new(
                Arc::new(OrderListSource::new(
                    shopware.clone(),
                    config.shopware.order_filters.clone(),
                )),
                Arc::new(OrderTransform::new(shopware.clone(), campaigns)),
                Arc::new(OrderDestination::new(mailbluster.clone())),
                gate.clone(),
                Arc::new(order_cursor_store(&state_dir)),
                config.streams.orders.dispatcher_config(),
            )
            .with_acknowledger(Arc::new(OrderExportAck::new(shopware.clone())));
            Some(Arc::new(dispatcher))
        } else {
            info!("Stream 'orders' is disabled");
            None
        };

        let customers = if config.streams.customers.enabled {
            let dispatcher: CustomerDispatcher = Dispatcher::new(
                Arc::new(CustomerListSource::new(
                    shopware.clone(),
                    config.shopware.customer_filters.clone(),
                )),
                Arc::new(LeadTransform),
                Arc::new(LeadDestination::new(mailbluster.clone())),
                gate.clone(),
                Arc::new(customer_cursor_store(&state_dir)),
                config.streams.customers.dispatcher_config(),
            );
            Some(Arc::new(dispatcher))
        } else {
            info!("Stream 'customers' is disabled");
            None
        };

        Ok(Self {
            orders,
            customers,
            gate,
            state_dir,
        })
    }

    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    /// Run every enabled stream until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let limits = self.gate.config();
        info!(
            "Starting shopsync (state in {}, {} requests per {:?}, spacing {:?})",
            self.state_dir.display(),
            limits.limit_for_period,
            limits.refresh_period,
            limits.spacing()
        );

        let mut tasks = Vec::new();
        if let Some(orders) = &self.orders {
            tasks.push(spawn_stream(orders.clone(), cancel.clone()));
        }
        if let Some(customers) = &self.customers {
            tasks.push(spawn_stream(customers.clone(), cancel.clone()));
        }

        if tasks.is_empty() {
            warn!("No enabled streams found in configuration");
            return Ok(());
        }
        info!("Running {} stream(s)", tasks.len());

        let mut failed = None;
        for result in futures::future::join_all(tasks).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failed = Some(e),
                Err(e) => failed = Some(SyncError::stream("task", e.to_string())),
            }
        }

        info!("Rate limiter: {}", self.gate.stats());
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn spawn_stream<S, O>(
    dispatcher: Arc<Dispatcher<S, O>>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<Result<()>>
where
    S: crate::traits::PageSource,
    O: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let result = dispatcher.run(cancel).await;
        if let Err(e) = &result {
            error!("Stream '{}' failed: {}", dispatcher.name(), e);
        }
        result
    })
}

/// Persisted cursor of each stream as text, `None` when nothing is stored yet
pub async fn stored_cursors(state_dir: &Path) -> Vec<(&'static str, PathBuf, Option<String>)> {
    let orders = order_cursor_store(state_dir);
    let customers = customer_cursor_store(state_dir);
    vec![
        (
            "orders",
            orders.path().to_path_buf(),
            describe(&orders, orders.path()).await,
        ),
        (
            "customers",
            customers.path().to_path_buf(),
            describe(&customers, customers.path()).await,
        ),
    ]
}

async fn describe<C: Cursor>(store: &dyn CheckpointStore<C>, path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    Some(store.load().await.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(state_dir: &Path, extra: &str) -> SyncConfig {
        let yaml = format!(
            r#"
shopware:
  base_url: https://shop.example.com
  username: api
  password: secret
mailbluster:
  api_key: mb-key
  requests_per_minute: 60
settings:
  state_dir: {}
{}"#,
            state_dir.display(),
            extra
        );
        SyncConfig::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn test_builds_both_streams() {
        let dir = tempdir().unwrap();
        let service = SyncService::from_config(&config(dir.path(), "")).unwrap();

        assert!(service.orders.is_some());
        assert!(service.customers.is_some());
        assert_eq!(service.gate().config().limit_for_period, 60);
        assert_eq!(
            service.gate().config().spacing(),
            std::time::Duration::from_millis(65_000 / 60)
        );
    }

    #[tokio::test]
    async fn test_no_streams_enabled() {
        let dir = tempdir().unwrap();
        let extra = "streams:\n  orders:\n    enabled: false\n  customers:\n    enabled: false\n";
        let service = SyncService::from_config(&config(dir.path(), extra)).unwrap();

        assert!(service.orders.is_none());
        service.run(CancellationToken::new()).await.unwrap();
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_stored_cursors() {
        let dir = tempdir().unwrap();
        customer_cursor_store(dir.path())
            .save(&RecordId(42))
            .await
            .unwrap();

        let cursors = stored_cursors(dir.path()).await;
        assert_eq!(cursors[0].0, "orders");
        assert_eq!(cursors[0].2, None);
        assert_eq!(cursors[1].0, "customers");
        assert_eq!(cursors[1].2.as_deref(), Some("42"));
    }
}
