//! Shared configuration, error types, IDs, and observability primitives for QX crates.
//!
//! Architecture role:
//! - defines the engine configuration snapshot passed across layers
//! - provides the common [`QxError`] / [`Result`] contracts
//! - hosts the process-wide read-backend switch and metrics utilities
//!
//! Key modules:
//! - [`backend`]
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod backend;
pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use backend::{read_backend, switch_on_allowed_fault, StorageBackend};
pub use config::{EngineConfig, RewriteFlags};
pub use error::{QxError, Result};
pub use ids::QueryId;
pub use metrics::MetricsRegistry;
