//! Body parser plugin.
//!
//! Decodes `application/json` and `application/x-www-form-urlencoded` request
//! bodies into a [`serde_json::Value`] attached to the request. Other content
//! types pass through untouched with no body attached. Bodies larger than the
//! configured limit and malformed JSON are sent to the error pipeline.

use bytes::Bytes;
use guarapi_core::{BoxError, GuarapiConfig, GuarapiError, GuarapiResult};
use guarapi_http::{
    BoxFuture, Guarapi, Handler, HandlerResult, Middleware, Next, Plugin, PluginHooks, Request,
    RequestBody, Response,
};
use http::HeaderMap;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http_body_util::{BodyExt, Collected, LengthLimitError, Limited};
use serde_json::{Map, Value};
use tracing::debug;

use crate::form;

/// Recognized body encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded`
    Form,
}

impl BodyKind {
    /// Detect the encoding from the `Content-Type` header.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let parsed: mime::Mime = content_type.parse().ok()?;
        let essence = parsed.essence_str();
        if essence == mime::APPLICATION_JSON.essence_str() {
            Some(Self::Json)
        } else if essence == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            Some(Self::Form)
        } else {
            None
        }
    }

    /// Decode a fully buffered body. An empty body yields an empty mapping.
    pub fn decode(self, bytes: &[u8]) -> GuarapiResult<Value> {
        if bytes.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        match self {
            Self::Json => Ok(serde_json::from_slice(bytes)?),
            Self::Form => Ok(Value::Object(form::decode(bytes))),
        }
    }
}

/// Plugin decoding request bodies before user handlers run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyParser {
    max_payload_size: Option<usize>,
}

impl BodyParser {
    /// A body parser using the application's `max_payload_size`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A body parser with its own size limit.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            max_payload_size: Some(limit),
        }
    }
}

impl Plugin for BodyParser {
    fn name(&self) -> &'static str {
        "body-parser"
    }

    fn setup(&self, _app: &Guarapi, config: &GuarapiConfig) -> PluginHooks {
        let limit = self.max_payload_size.unwrap_or(config.max_payload_size);
        PluginHooks::named("body-parser").with_pre(Handler::from_middleware(ParseBody { limit }))
    }
}

struct ParseBody {
    limit: usize,
}

impl Middleware for ParseBody {
    fn call(&self, req: Request, _res: Response, next: Next) -> BoxFuture<HandlerResult> {
        let limit = self.limit;
        Box::pin(async move {
            match parse_body(&req, limit).await {
                Ok(Some(value)) => {
                    req.set_body(value);
                    next.run().await
                }
                Ok(None) => next.run().await,
                Err(err) => {
                    debug!(url = %req.url(), error = %err, "failed to decode request body");
                    next.fail(err).await
                }
            }
        })
    }
}

/// Decode the request body if its content type is recognized.
///
/// Returns `Ok(None)` for unrecognized content types and when the body has
/// already been taken by an earlier handler.
pub async fn parse_body(req: &Request, limit: usize) -> GuarapiResult<Option<Value>> {
    let Some(kind) = BodyKind::from_headers(req.headers()) else {
        return Ok(None);
    };

    if let Some(declared) = content_length(req.headers()) {
        if declared > limit {
            return Err(GuarapiError::PayloadTooLarge { limit });
        }
    }

    let Some(body) = req.take_body() else {
        return Ok(None);
    };
    let bytes = read_limited(body, limit).await?;
    kind.decode(&bytes).map(Some)
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

/// Buffer the body, failing as soon as it exceeds `limit` bytes.
fn read_limited(body: RequestBody, limit: usize) -> BoxFuture<GuarapiResult<Bytes>> {
    let collect: BoxFuture<Result<Collected<Bytes>, BoxError>> =
        Box::pin(Limited::new(body, limit).collect());
    Box::pin(async move {
        match collect.await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(err) if err.is::<LengthLimitError>() => {
                Err(GuarapiError::PayloadTooLarge { limit })
            }
            Err(err) => Err(GuarapiError::Body(err.to_string())),
        }
    })
}
