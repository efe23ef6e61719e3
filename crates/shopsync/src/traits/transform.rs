//! Record transform trait

use crate::error::ConnectorError;
use async_trait::async_trait;
use thiserror::Error;

/// Why a record could not be transformed
#[derive(Debug, Error)]
pub enum TransformError {
    /// The record is deliberately filtered out (e.g. no usable e-mail address)
    #[error("record rejected: {0}")]
    Rejected(String),

    /// The record could not be mapped to the destination schema
    #[error("mapping failed: {0}")]
    Mapping(String),

    /// Fetching additional data for the record failed
    #[error("lookup failed: {0}")]
    Lookup(#[from] ConnectorError),
}

impl TransformError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn mapping(reason: impl Into<String>) -> Self {
        Self::Mapping(reason.into())
    }

    /// True when the record was filtered out rather than broken
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Converts a source record into a destination record.
///
/// May perform I/O (the order transform fetches the full order first).
#[async_trait]
pub trait Transform: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    async fn transform(&self, record: &Self::Input) -> Result<Self::Output, TransformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_check() {
        assert!(TransformError::rejected("invalid email").is_rejection());
        assert!(!TransformError::mapping("no order number").is_rejection());
        assert!(!TransformError::from(ConnectorError::http(500, "boom")).is_rejection());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransformError::rejected("invalid email 'x'").to_string(),
            "record rejected: invalid email 'x'"
        );
        assert_eq!(
            TransformError::from(ConnectorError::http(404, "gone")).to_string(),
            "lookup failed: http status 404: gone"
        );
    }
}
