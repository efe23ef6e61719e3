//! Boundary traits between the streaming engine and the remote systems
//!
//! - `PageSource` - Fetch "everything after this cursor" from a paginated list endpoint
//! - `Transform` - Turn a source record into a destination record
//! - `Destination` - Push a destination record
//! - `Acknowledger` - Tell the source a record was delivered
//! - `testing` - Scriptable mocks of all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use shopsync::traits::*;
//!
//! pub struct UppercaseTransform;
//!
//! #[async_trait]
//! impl Transform for UppercaseTransform {
//!     type Input = String;
//!     type Output = String;
//!
//!     async fn transform(&self, record: &String) -> Result<String, TransformError> {
//!         Ok(record.to_uppercase())
//!     }
//! }
//! ```

pub mod sink;
pub mod source;
pub mod testing;
pub mod transform;

pub use sink::{Acknowledger, Destination, PushOutcome};
pub use source::PageSource;
pub use transform::{Transform, TransformError};

pub use async_trait::async_trait;
