//! Request handle shared by every handler in a pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use guarapi_core::BoxError;
use http::{Extensions, HeaderMap, Method, Version};
use http_body_util::BodyExt;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::body::RequestBody;

/// HTTP/2 pseudo-headers recorded by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoHeaders {
    /// `:method`
    pub method: Method,
    /// `:path`, including the query string.
    pub path: String,
    /// `:scheme`
    pub scheme: Option<String>,
    /// `:authority`
    pub authority: Option<String>,
}

/// Immutable request metadata.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Request method.
    pub method: Method,
    /// Request target as received. HTTP/2 requests carry an absolute URI here.
    pub url: String,
    /// Protocol version.
    pub version: Version,
    /// Header fields (pseudo-headers excluded).
    pub headers: HeaderMap,
    /// Pseudo-header set, present only for HTTP/2 requests.
    pub pseudo: Option<PseudoHeaders>,
    /// Peer address, when known.
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    /// Build a head from `http` request parts.
    #[must_use]
    pub fn from_parts(parts: &http::request::Parts, remote_addr: Option<SocketAddr>) -> Self {
        let pseudo = (parts.version == Version::HTTP_2).then(|| PseudoHeaders {
            method: parts.method.clone(),
            path: parts
                .uri
                .path_and_query()
                .map_or_else(|| "/".to_owned(), ToString::to_string),
            scheme: parts.uri.scheme_str().map(ToOwned::to_owned),
            authority: parts.uri.authority().map(ToString::to_string),
        });

        Self {
            method: parts.method.clone(),
            url: parts.uri.to_string(),
            version: parts.version,
            headers: parts.headers.clone(),
            pseudo,
            remote_addr,
        }
    }
}

/// Mutable per-request state shared between every view of a request.
struct RequestState {
    raw_body: Mutex<Option<RequestBody>>,
    body: RwLock<Option<Value>>,
    extensions: Mutex<Extensions>,
}

/// A cheap, cloneable handle to an inbound request.
///
/// Clones share the body stream, the parsed body and the extensions. The
/// head is immutable; the HTTP/2 shim produces a new view with a rewritten
/// head over the same state.
#[derive(Clone)]
pub struct Request {
    head: Arc<RequestHead>,
    state: Arc<RequestState>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.head.method)
            .field("url", &self.head.url)
            .field("version", &self.head.version)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Create a request from a head and an unread body.
    #[must_use]
    pub fn new(head: RequestHead, body: RequestBody) -> Self {
        Self {
            head: Arc::new(head),
            state: Arc::new(RequestState {
                raw_body: Mutex::new(Some(body)),
                body: RwLock::new(None),
                extensions: Mutex::new(Extensions::new()),
            }),
        }
    }

    /// Convert an `http::Request` with any compatible body.
    pub fn from_http<B>(req: http::Request<B>, remote_addr: Option<SocketAddr>) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let head = RequestHead::from_parts(&parts, remote_addr);
        let request = Self::new(head, body.map_err(Into::into).boxed_unsync());
        *request.state.extensions.lock() = parts.extensions;
        request
    }

    /// Build a view with a different method and URL over the same state.
    pub(crate) fn with_target(&self, method: Method, url: String) -> Self {
        let mut head = RequestHead::clone(&self.head);
        head.method = method;
        head.url = url;
        Self {
            head: Arc::new(head),
            state: Arc::clone(&self.state),
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Request URL as seen by handlers.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.head.url
    }

    /// Path component of the URL, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        let url = self.url();
        let path = url.split_once('?').map_or(url, |(path, _)| path);
        // Absolute-form targets keep their scheme and authority.
        match path.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("/", |idx| &rest[idx..]),
            None => path,
        }
    }

    /// Query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.url().split_once('?').map(|(_, query)| query)
    }

    /// Protocol version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// Header fields.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// A header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// HTTP/2 pseudo-headers, if the request arrived over HTTP/2.
    #[must_use]
    pub fn pseudo_headers(&self) -> Option<&PseudoHeaders> {
        self.head.pseudo.as_ref()
    }

    /// Peer address, when known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.head.remote_addr
    }

    /// Whether two handles refer to the same underlying request state.
    #[must_use]
    pub fn shares_state_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Take the unread body stream. Returns `None` once it has been taken.
    #[must_use]
    pub fn take_body(&self) -> Option<RequestBody> {
        self.state.raw_body.lock().take()
    }

    /// The decoded body, if a body parser attached one.
    #[must_use]
    pub fn body(&self) -> Option<Value> {
        self.state.body.read().clone()
    }

    /// Attach a decoded body.
    pub fn set_body(&self, value: Value) {
        *self.state.body.write() = Some(value);
    }

    /// Deserialize the decoded body into a typed value.
    ///
    /// Returns `Ok(None)` when no body was attached.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.body().map(serde_json::from_value).transpose()
    }

    /// Store a typed value in the request extensions, returning the previous one.
    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.state.extensions.lock().insert(value)
    }

    /// Read a typed value from the request extensions.
    #[must_use]
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.state.extensions.lock().get::<T>().cloned()
    }
}
