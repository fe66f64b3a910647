//! Request pipeline engine and hyper transport for Guarapi.
//!
//! An application ([`Guarapi`]) owns three ordered phase pipelines filled by
//! plugins: *pre* handlers run for every request, *post* handlers run once the
//! response has ended, and *error* handlers run when a pre or post handler
//! fails. Handlers are plain async closures tagged as [`Handler::Normal`] or
//! [`Handler::Error`] and continue the pipeline through a [`Next`] value.
//!
//! The transport (HTTP/1.1, HTTP/2, optionally TLS) is started with
//! [`Guarapi::listen`]; applications can also be embedded in an existing
//! hyper server through [`Guarapi::service`].

pub mod app;
pub mod body;
pub mod handler;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod service;
pub mod shim;
pub mod tls;

pub use app::{Guarapi, LogCapability, UseCapability};
pub use body::{GuarapiBody, RequestBody};
pub use handler::{BoxFuture, ErrorMiddleware, Handler, HandlerKind, HandlerResult, Middleware};
pub use pipeline::{Next, OnDone, Pipeline, advance, pipeline};
pub use registry::{Phase, Phases, Plugin, PluginHooks, PluginRegistry, plugin_fn};
pub use request::{PseudoHeaders, Request, RequestHead};
pub use response::{PendingResponse, Response};
pub use service::GuarapiService;
pub use shim::{TransportMode, normalize};

use guarapi_core::{BoxError, GuarapiError};
use http::StatusCode;

/// Map an in-flight error to the status an error handler should answer with.
///
/// Framework errors caused by the request map to 4xx; everything else is a
/// `500 Internal Server Error`.
#[must_use]
pub fn error_status(err: &BoxError) -> StatusCode {
    match err.downcast_ref::<GuarapiError>() {
        Some(GuarapiError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        Some(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_framework_errors_to_status() {
        let too_large: BoxError = GuarapiError::PayloadTooLarge { limit: 1 }.into();
        assert_eq!(error_status(&too_large), StatusCode::PAYLOAD_TOO_LARGE);

        let invalid: BoxError = GuarapiError::Body("reset".into()).into();
        assert_eq!(error_status(&invalid), StatusCode::BAD_REQUEST);

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let malformed: BoxError = GuarapiError::from(json).into();
        assert_eq!(error_status(&malformed), StatusCode::BAD_REQUEST);

        let config: BoxError = GuarapiError::Config("bad".into()).into();
        assert_eq!(error_status(&config), StatusCode::INTERNAL_SERVER_ERROR);

        let other: BoxError = "anything".into();
        assert_eq!(error_status(&other), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
