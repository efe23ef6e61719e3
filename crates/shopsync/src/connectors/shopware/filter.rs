//! Shopware list filters and their query-string encoding
//!
//! The REST API takes filters as indexed bracket parameters:
//!
//! ```text
//! filter[0][property]=orderTime
//! filter[0][value]=2023-05-01T10:00:00+02:00
//! filter[0][expression]=>
//! filter[1][property]=attribute.mbExported
//! filter[1][expression]=LIKE
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single list filter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Filter {
    /// Field to filter on, e.g. `orderTime` or `attribute.mbExported`
    pub property: String,

    /// Value to compare against; `None` matches NULL
    #[serde(default)]
    pub value: Option<String>,

    /// Comparison (`LIKE`, `>`, `=`, ...)
    #[serde(default = "default_expression")]
    pub expression: String,

    /// Combine with the previous filter using OR instead of AND
    #[serde(default)]
    pub operator: bool,
}

fn default_expression() -> String {
    "LIKE".to_string()
}

impl Filter {
    /// `property LIKE value`
    pub fn new(property: impl Into<String>, value: Option<String>) -> Self {
        Self {
            property: property.into(),
            value,
            expression: default_expression(),
            operator: false,
        }
    }

    /// `property IS NULL`
    pub fn is_null(property: impl Into<String>) -> Self {
        Self::new(property, None)
    }

    /// `property > value`
    pub fn greater_than(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(property, Some(value.into())).with_expression(">")
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    pub fn or(mut self) -> Self {
        self.operator = true;
        self
    }
}

/// Encode filters as ordered query parameters
pub fn to_query_params(filters: &[Filter]) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(filters.len() * 3);
    for (i, filter) in filters.iter().enumerate() {
        params.push((key(i, "property"), filter.property.clone()));
        if let Some(value) = &filter.value {
            params.push((key(i, "value"), value.clone()));
        }
        params.push((key(i, "expression"), filter.expression.clone()));
        if filter.operator {
            params.push((key(i, "operator"), "1".to_string()));
        }
    }
    params
}

fn key(index: usize, field: &str) -> String {
    format!("filter[{}][{}]", index, field)
}
