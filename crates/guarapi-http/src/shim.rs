//! HTTP/2 compatibility shim.
//!
//! HTTP/2 carries the request target in the `:method` and `:path`
//! pseudo-headers, and hyper surfaces an absolute URI for it. Handlers expect
//! an origin-form URL, so in HTTP/2 mode the dispatcher hands them a view
//! whose method and URL come from the pseudo-headers.

use guarapi_core::ServerOptions;

use crate::request::Request;

/// Which protocol the transport serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// HTTP/1.1 (plain or TLS).
    #[default]
    Http1,
    /// HTTP/2 (h2c or TLS with ALPN `h2`).
    Http2,
}

impl From<&ServerOptions> for TransportMode {
    fn from(options: &ServerOptions) -> Self {
        if options.is_http2 {
            Self::Http2
        } else {
            Self::Http1
        }
    }
}

/// Produce the request view handlers should see.
///
/// In HTTP/2 mode, with pseudo-headers present, returns a new view over the
/// same request state whose URL is `:path` and whose method is `:method`.
/// The given request is left untouched. Otherwise returns the same request.
#[must_use]
pub fn normalize(req: &Request, mode: TransportMode) -> Request {
    match (mode, req.pseudo_headers()) {
        (TransportMode::Http2, Some(pseudo)) => {
            req.with_target(pseudo.method.clone(), pseudo.path.clone())
        }
        _ => req.clone(),
    }
}
