//! Middleware plugin: enables `use`.
//!
//! Normal handlers registered through [`Guarapi::use_handler`] join the pre
//! phase; error handlers join the error phase. Both keep registration order
//! relative to handlers contributed by other plugins.

use std::sync::Arc;

use guarapi_core::{BoxError, GuarapiConfig};
use guarapi_http::{
    Guarapi, Handler, HandlerKind, Middleware, Next, Phase, Plugin, PluginHooks, PluginRegistry,
    Request, Response, UseCapability,
};
use http::Method;

/// Plugin providing the `use` capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiddlewarePlugin;

impl Plugin for MiddlewarePlugin {
    fn name(&self) -> &'static str {
        "middleware"
    }

    fn setup(&self, app: &Guarapi, _config: &GuarapiConfig) -> PluginHooks {
        app.provide_middleware(Arc::new(PhaseMirror {
            registry: app.registry(),
        }));
        PluginHooks::named("middleware")
    }
}

struct PhaseMirror {
    registry: Arc<PluginRegistry>,
}

impl UseCapability for PhaseMirror {
    fn register(&self, handler: Handler) {
        let phase = match handler.kind() {
            HandlerKind::Normal => Phase::Pre,
            HandlerKind::Error => Phase::Error,
        };
        self.registry.push(phase, handler);
    }
}

/// Run `handler` only for requests matching `method` and `path`.
///
/// Other requests continue down the pipeline untouched; for an error handler
/// the in-flight error is passed on to the next error handler. The path is
/// compared without the query string.
#[must_use]
pub fn route(method: Method, path: &str, handler: Handler) -> Handler {
    let path = path.to_owned();
    let matches = move |req: &Request| req.method() == method && req.path() == path;
    match handler {
        Handler::Normal(inner) => Handler::normal(move |req: Request, res: Response, next: Next| {
            if matches(&req) {
                inner.call(req, res, next)
            } else {
                next.run()
            }
        }),
        Handler::Error(inner) => Handler::error(
            move |err: BoxError, req: Request, res: Response, next: Next| {
                if matches(&req) {
                    inner.call(err, req, res, next)
                } else {
                    next.fail(err)
                }
            },
        ),
    }
}
