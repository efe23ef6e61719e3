//! MailBluster REST payloads

use serde::Serialize;
use std::collections::BTreeMap;

/// `POST /api/orders` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailBlusterOrder {
    /// Shop order number
    pub id: String,
    pub customer: OrderCustomer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub total_price: f64,
    pub items: Vec<Product>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCustomer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<bool>,
    pub meta: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Order line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

impl Product {
    /// Quantities below one are sent as one
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64, quantity: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            quantity: quantity.clamp(1, u32::MAX as i64) as u32,
        }
    }

    pub fn shipping(price: f64) -> Self {
        Self::new("shipping", "Versand", price, 1)
    }
}

/// `POST /api/leads` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub email: String,
    pub subscribed: bool,
}
