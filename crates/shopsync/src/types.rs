//! Common types for shopsync
//!
//! Shared between the configuration model and the remote API clients.

use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A wrapper around `SecretString` for credentials read from the config file.
///
/// This type:
/// - Redacts the value in `Debug` and `Display` output so API keys never reach the logs
/// - Serializes as `"***REDACTED***"` so a dumped config does not leak credentials
/// - Provides `expose_secret()` for the HTTP clients that need the actual value
///
/// # Example
///
/// ```rust
/// use shopsync::SensitiveString;
///
/// let key = SensitiveString::new("mb-api-key");
///
/// // Safe to log - shows "[REDACTED]"
/// println!("{:?}", key);
///
/// assert_eq!(key.expose_secret(), "mb-api-key");
/// ```
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string from any string-like value
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    ///
    /// Only the HTTP clients call this, when building the auth header.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// True if the wrapped value is empty (e.g. an unset `${VAR}`)
    pub fn is_empty(&self) -> bool {
        self.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

impl JsonSchema for SensitiveString {
    fn schema_name() -> String {
        "SensitiveString".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = gen.subschema_for::<String>();
        if let schemars::schema::Schema::Object(obj) = &mut schema {
            obj.format = Some("password".to_string());
            obj.metadata().description =
                Some("Credential; redacted in logs and config dumps.".to_string());
        }
        schema
    }
}
