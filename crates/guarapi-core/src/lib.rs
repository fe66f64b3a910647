//! Core configuration and error types for Guarapi.
//!
//! This crate holds the pieces shared by the pipeline engine, the bundled
//! plugins and the server binary: the application configuration (transport
//! selection, payload limits, timeouts) and the error taxonomy that flows
//! through handler pipelines.

mod config;
mod error;

pub use config::{DEFAULT_MAX_PAYLOAD_SIZE, GuarapiConfig, ServerOptions};
pub use error::{BoxError, GuarapiError, GuarapiResult};
