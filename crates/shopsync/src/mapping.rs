//! Shopware -> MailBluster record mapping
//!
//! [`OrderTransform`] loads the full order behind a list entry and builds the
//! MailBluster order from it. [`LeadTransform`] turns a customer entry into a
//! lead. Both reject records without a valid e-mail address.

use crate::connectors::mailbluster::{
    Lead, MailBlusterOrder, OrderCustomer, PartnerCampaignMapper, Product,
};
use crate::connectors::shopware::types::{Address, Article};
use crate::connectors::shopware::{CustomerSummary, Order, OrderSummary, ShopwareClient};
use crate::traits::{Transform, TransformError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};
use validator::ValidateEmail;

/// List entry -> full order -> MailBluster order
pub struct OrderTransform {
    client: Arc<ShopwareClient>,
    campaigns: PartnerCampaignMapper,
}

impl OrderTransform {
    pub fn new(client: Arc<ShopwareClient>, campaigns: PartnerCampaignMapper) -> Self {
        Self { client, campaigns }
    }

    /// Build the MailBluster order for an already loaded shop order
    pub fn map_order(&self, order: &Order) -> Result<MailBlusterOrder, TransformError> {
        let email = valid_email(order.customer.email.as_deref()).ok_or_else(|| {
            TransformError::rejected(format!(
                "order {} has no valid customer e-mail",
                order.id
            ))
        })?;
        let number = order
            .number
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TransformError::mapping(format!("order {} has no number", order.id)))?;

        let mut items: Vec<Product> = order
            .details
            .iter()
            .filter(|a| a.has_positive_price())
            .map(map_article)
            .collect();
        if order.has_invoice_shipping() {
            items.push(Product::shipping(order.invoice_shipping));
        }

        Ok(MailBlusterOrder {
            id: number,
            customer: OrderCustomer {
                first_name: order.customer.firstname.as_deref().map(capitalize_fully),
                last_name: order.customer.lastname.as_deref().map(capitalize_fully),
                email,
                ip_address: order
                    .remote_address
                    .as_deref()
                    .and_then(sanitize_remote_address),
                meta: customer_meta(order),
                ..Default::default()
            },
            campaign_id: self.campaigns.campaign_id(order.partner_id.as_deref()),
            currency: order.currency.clone(),
            total_price: order.invoice_amount,
            items,
        })
    }
}

#[async_trait]
impl Transform for OrderTransform {
    type Input = OrderSummary;
    type Output = MailBlusterOrder;

    async fn transform(&self, record: &OrderSummary) -> Result<MailBlusterOrder, TransformError> {
        let order = self.client.fetch_order(record.id).await?;
        debug!(
            "Loaded order {} ({} lines)",
            record.id,
            order.details.len()
        );
        self.map_order(&order)
    }
}

/// Customer entry -> subscribed lead
#[derive(Debug, Default, Clone, Copy)]
pub struct LeadTransform;

#[async_trait]
impl Transform for LeadTransform {
    type Input = CustomerSummary;
    type Output = Lead;

    async fn transform(&self, record: &CustomerSummary) -> Result<Lead, TransformError> {
        let email = valid_email(record.email.as_deref()).ok_or_else(|| {
            TransformError::rejected(format!("customer {} has no valid e-mail", record.id))
        })?;

        Ok(Lead {
            first_name: record.firstname.clone(),
            last_name: record.lastname.clone(),
            email,
            subscribed: true,
        })
    }
}

/// Lower-cased address, if it is a valid one
fn valid_email(email: Option<&str>) -> Option<String> {
    let email = email?.trim();
    if email.validate_email() {
        Some(email.to_lowercase())
    } else {
        None
    }
}

fn map_article(article: &Article) -> Product {
    Product::new(
        article.article_number.clone().unwrap_or_default(),
        article.article_name.clone().unwrap_or_default(),
        article.price,
        article.quantity,
    )
}

/// `zip`, `city` and `country` from billing, falling back to shipping
fn customer_meta(order: &Order) -> BTreeMap<String, String> {
    let addresses = [order.billing.as_ref(), order.shipping.as_ref()];
    let fields: [(&str, fn(&Address) -> Option<&str>); 3] = [
        ("zip", |a| a.zip_code.as_deref()),
        ("city", |a| a.city.as_deref()),
        ("country", |a| a.country.as_ref().and_then(|c| c.iso.as_deref())),
    ];

    let mut meta = BTreeMap::new();
    for (key, field) in fields {
        let value = addresses
            .iter()
            .flatten()
            .filter_map(|a| field(a))
            .find(|v| !v.is_empty());
        if let Some(value) = value {
            meta.insert(key.to_string(), value.to_string());
        }
    }
    if let Some(referer) = order.referer.as_deref().filter(|r| !r.is_empty()) {
        meta.insert("referer".to_string(), referer.to_string());
    }
    meta
}

/// Lower-case everything, then upper-case the first letter of each word
pub fn capitalize_fully(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut word_start = true;
    for c in value.chars() {
        if c.is_whitespace() {
            word_start = true;
            out.push(c);
        } else if word_start {
            word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Canonical form of the remote address, `None` when it is not an IP address.
///
/// Shopware sometimes stores IPv6 addresses with a stray colon after `::`.
pub fn sanitize_remote_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let trimmed = if raw.ends_with(":::") {
        &raw[..raw.len() - 1]
    } else {
        raw
    };

    match trimmed.parse::<IpAddr>() {
        Ok(ip) => Some(ip.to_string()),
        Err(_) => {
            info!("Failed to sanitize remote address: {}", raw);
            None
        }
    }
}
