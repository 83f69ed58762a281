//! service-core: Shared infrastructure for payflow services.
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use serde;
pub use tracing;
pub use validator;
