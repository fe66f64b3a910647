//! Standard plugins for Guarapi.
//!
//! - [`BodyParser`] decodes JSON and form-encoded request bodies.
//! - [`MiddlewarePlugin`] enables [`Guarapi::use_handler`](guarapi_http::Guarapi::use_handler).
//! - [`LoggerPlugin`] enables [`Guarapi::logger`](guarapi_http::Guarapi::logger)
//!   and logs every request.

pub mod body_parser;
pub mod form;
pub mod logger;
pub mod middleware;

pub use body_parser::BodyParser;
pub use logger::{LoggerPlugin, REQUEST_ID_HEADER, RequestId};
pub use middleware::{MiddlewarePlugin, route};
