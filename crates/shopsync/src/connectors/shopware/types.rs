//! Shopware REST payloads

use crate::cursor::parse_timestamp;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer};

/// `{"data": ...}` envelope used by every endpoint
#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Entry of `GET /api/orders`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: u64,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub order_time: DateTime<FixedOffset>,
    /// When this entry was listed
    #[serde(skip)]
    pub fetched_at: Option<DateTime<FixedOffset>>,
}

/// Entry of `GET /api/customers`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomerSummary {
    pub id: u64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub newsletter: bool,
    #[serde(skip)]
    pub fetched_at: Option<DateTime<FixedOffset>>,
}

/// Full order from `GET /api/orders/{id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    #[serde(default)]
    pub number: Option<String>,
    pub customer: OrderCustomer,
    #[serde(default, rename = "partnerId")]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub remote_address: Option<String>,
    #[serde(default)]
    pub invoice_amount: f64,
    #[serde(default)]
    pub invoice_shipping: f64,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub order_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub details: Vec<Article>,
    #[serde(default)]
    pub billing: Option<Address>,
    #[serde(default)]
    pub shipping: Option<Address>,
    #[serde(skip)]
    pub fetched_at: Option<DateTime<FixedOffset>>,
}

impl Order {
    pub fn has_invoice_shipping(&self) -> bool {
        self.invoice_shipping > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderCustomer {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

/// Order line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default)]
    pub article_number: Option<String>,
    #[serde(default)]
    pub article_name: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: i64,
}

impl Article {
    pub fn has_positive_price(&self) -> bool {
        self.price > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<Country>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Country {
    #[serde(default)]
    pub iso: Option<String>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_list_envelope() {
        let json = r#"{
            "data": [
                {"id": 57, "number": "20001", "orderTime": "2023-05-01T10:00:00+0200"},
                {"id": 58, "number": "20002", "orderTime": "2023-05-01T10:05:00+02:00"}
            ],
            "total": 2,
            "success": true
        }"#;
        let list: DataEnvelope<Vec<OrderSummary>> = serde_json::from_str(json).unwrap();

        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[0].id, 57);
        assert_eq!(
            list.data[0].order_time,
            parse_timestamp("2023-05-01T10:00:00+02:00").unwrap()
        );
        assert!(list.data[0].fetched_at.is_none());
    }

    #[test]
    fn test_order_summary_rejects_bad_time() {
        let json = r#"{"id": 1, "orderTime": "soon"}"#;
        assert!(serde_json::from_str::<OrderSummary>(json).is_err());
    }

    #[test]
    fn test_order_detail() {
        let json = r#"{
            "id": 57,
            "number": "20001",
            "partnerId": "mb-42",
            "referer": "https://google.com",
            "currency": "EUR",
            "remoteAddress": "217.86.205.141",
            "invoiceAmount": 998.56,
            "invoiceShipping": 3.9,
            "orderTime": "2023-05-01T10:00:00+02:00",
            "customer": {"id": 2, "number": "20003", "email": "Max@Example.com",
                         "firstname": "max", "lastname": "mustermann"},
            "details": [
                {"articleNumber": "SW10178", "articleName": "Strandtuch", "price": 19.95, "quantity": 2},
                {"articleNumber": "SW10001", "articleName": "Gutschein", "price": -5, "quantity": 1}
            ],
            "billing": {"zipCode": "48624", "city": "Schöppingen", "country": {"iso": "DE"}},
            "shipping": null
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();

        assert_eq!(order.partner_id.as_deref(), Some("mb-42"));
        assert_eq!(order.customer.email.as_deref(), Some("Max@Example.com"));
        assert!(order.has_invoice_shipping());
        assert!(order.details[0].has_positive_price());
        assert!(!order.details[1].has_positive_price());
        assert_eq!(
            order.billing.unwrap().country.unwrap().iso.as_deref(),
            Some("DE")
        );
        assert!(order.shipping.is_none());
    }

    #[test]
    fn test_customer_summary() {
        let json = r#"{"id": 12, "firstname": "Erika", "lastname": "Musterfrau",
                       "email": "erika@example.com", "newsletter": true}"#;
        let customer: CustomerSummary = serde_json::from_str(json).unwrap();
        assert_eq!(customer.id, 12);
        assert!(customer.newsletter);
    }
}
