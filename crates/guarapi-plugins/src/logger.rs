//! Logger plugin: enables `logger` and records every request.

use std::sync::Arc;
use std::time::Instant;

use guarapi_core::GuarapiConfig;
use guarapi_http::{
    BoxFuture, Guarapi, Handler, HandlerResult, LogCapability, Next, Plugin, PluginHooks, Request,
    Response,
};
use http::HeaderValue;
use tracing::{Level, debug, error, info, trace, warn};

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id assigned by the logger plugin, stored in the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

#[derive(Debug, Clone, Copy)]
struct StartedAt(Instant);

/// Plugin providing the `logger` capability and per-request logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerPlugin;

impl Plugin for LoggerPlugin {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn setup(&self, app: &Guarapi, _config: &GuarapiConfig) -> PluginHooks {
        app.provide_logger(Arc::new(TracingLogger));
        PluginHooks::named("logger")
            .with_pre(Handler::normal(stamp_request))
            .with_post(Handler::normal(log_completion))
            .with_error(Handler::error(|err, req: Request, _res, next: Next| {
                warn!(
                    method = %req.method(),
                    url = %req.url(),
                    request_id = request_id(&req).as_deref().unwrap_or("-"),
                    error = %err,
                    "request failed",
                );
                next.fail(err)
            }))
    }
}

/// Emits capability messages as `tracing` events.
#[derive(Debug)]
struct TracingLogger;

impl LogCapability for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => error!(target: "guarapi", "{message}"),
            Level::WARN => warn!(target: "guarapi", "{message}"),
            Level::INFO => info!(target: "guarapi", "{message}"),
            Level::DEBUG => debug!(target: "guarapi", "{message}"),
            _ => trace!(target: "guarapi", "{message}"),
        }
    }
}

fn stamp_request(req: Request, res: Response, next: Next) -> BoxFuture<HandlerResult> {
    let id = uuid::Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.set_header(REQUEST_ID_HEADER, value);
    }
    req.insert_extension(StartedAt(Instant::now()));
    req.insert_extension(RequestId(id.clone()));
    debug!(method = %req.method(), url = %req.url(), request_id = %id, "request received");
    next.run()
}

fn log_completion(req: Request, res: Response, next: Next) -> BoxFuture<HandlerResult> {
    let elapsed_ms = req
        .extension::<StartedAt>()
        .map(|started| u64::try_from(started.0.elapsed().as_millis()).unwrap_or(u64::MAX));
    info!(
        method = %req.method(),
        url = %req.url(),
        status = res.status_code().as_u16(),
        elapsed_ms,
        request_id = request_id(&req).as_deref().unwrap_or("-"),
        "request completed",
    );
    next.run()
}

fn request_id(req: &Request) -> Option<String> {
    req.extension::<RequestId>().map(|id| id.0)
}
