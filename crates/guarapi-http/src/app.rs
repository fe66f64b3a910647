//! The application handle and per-request dispatcher.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use guarapi_core::{BoxError, GuarapiConfig, GuarapiError, GuarapiResult};
use parking_lot::RwLock;
use tracing::{Level, debug, error};

use crate::body::GuarapiBody;
use crate::handler::Handler;
use crate::pipeline::{OnDone, Pipeline, advance};
use crate::registry::{Phase, Phases, Plugin, PluginRegistry};
use crate::request::Request;
use crate::response::Response;
use crate::server::Server;
use crate::service::{GuarapiService, respond};
use crate::shim::{TransportMode, normalize};

/// The `use` capability, provided by the middleware plugin.
pub trait UseCapability: Send + Sync {
    /// Register a handler.
    fn register(&self, handler: Handler);
}

/// The `logger` capability, provided by the logger plugin.
pub trait LogCapability: Send + Sync {
    /// Emit a message at `level`.
    fn log(&self, level: Level, message: &str);
}

#[derive(Default, Clone)]
struct Capabilities {
    middleware: Option<Arc<dyn UseCapability>>,
    logger: Option<Arc<dyn LogCapability>>,
}

struct AppInner {
    config: GuarapiConfig,
    mode: TransportMode,
    registry: Arc<PluginRegistry>,
    capabilities: RwLock<Capabilities>,
    server: tokio::sync::Mutex<Option<Server>>,
}

/// A Guarapi application.
///
/// The handle is cheap to clone; clones share the plugin registry, the
/// installed capabilities and the running server.
///
/// ```no_run
/// # async fn demo() -> Result<(), guarapi_core::GuarapiError> {
/// use guarapi_http::{Guarapi, Handler, PluginHooks, plugin_fn};
///
/// let app = Guarapi::default();
/// app.plugin(plugin_fn(|_app: &Guarapi, _config: &guarapi_core::GuarapiConfig| {
///     PluginHooks::named("hello").with_pre(Handler::terminal(|_req, res| async move {
///         res.send("hello");
///         Ok(())
///     }))
/// }));
/// let addr = app.listen("127.0.0.1", 3000).await?;
/// println!("listening on {addr}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Guarapi {
    inner: Arc<AppInner>,
}

impl std::fmt::Debug for Guarapi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let capabilities = self.inner.capabilities.read();
        f.debug_struct("Guarapi")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("middleware", &capabilities.middleware.is_some())
            .field("logger", &capabilities.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Guarapi {
    fn default() -> Self {
        Self::new(GuarapiConfig::default())
    }
}

impl Guarapi {
    /// Create an application with no plugins.
    #[must_use]
    pub fn new(config: GuarapiConfig) -> Self {
        let mode = TransportMode::from(&config.server_options);
        Self {
            inner: Arc::new(AppInner {
                config,
                mode,
                registry: Arc::new(PluginRegistry::new()),
                capabilities: RwLock::new(Capabilities::default()),
                server: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// The application configuration.
    #[must_use]
    pub fn config(&self) -> &GuarapiConfig {
        &self.inner.config
    }

    /// The transport mode derived from the configuration.
    #[must_use]
    pub fn transport_mode(&self) -> TransportMode {
        self.inner.mode
    }

    /// The plugin registry.
    #[must_use]
    pub fn registry(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Register a plugin. Its setup runs once, immediately.
    pub fn plugin<P: Plugin>(&self, plugin: P) -> &Self {
        self.inner
            .registry
            .register(&plugin, self, &self.inner.config);
        self
    }

    /// Install the `use` capability.
    pub fn provide_middleware(&self, capability: Arc<dyn UseCapability>) {
        self.inner.capabilities.write().middleware = Some(capability);
    }

    /// Install the `logger` capability.
    pub fn provide_logger(&self, capability: Arc<dyn LogCapability>) {
        self.inner.capabilities.write().logger = Some(capability);
    }

    /// Register a handler through the middleware plugin.
    ///
    /// Fails with [`GuarapiError::Unimplemented`] until that plugin is active.
    pub fn use_handler(&self, handler: Handler) -> GuarapiResult<&Self> {
        let middleware = self.inner.capabilities.read().middleware.clone();
        let middleware = middleware.ok_or_else(GuarapiError::middleware_unavailable)?;
        middleware.register(handler);
        Ok(self)
    }

    /// Emit a log message through the logger plugin.
    ///
    /// Fails with [`GuarapiError::Unimplemented`] until that plugin is active.
    pub fn logger(&self, level: Level, message: &str) -> GuarapiResult<()> {
        let logger = self.inner.capabilities.read().logger.clone();
        let logger = logger.ok_or_else(GuarapiError::logger_unavailable)?;
        logger.log(level, message);
        Ok(())
    }

    /// Process one request/response pair.
    ///
    /// Runs the pre phase; once the response has ended, runs the post phase.
    /// A failure in either phase is handed to the error pipeline. If the
    /// response never ends, the post phase never runs and this future stays
    /// pending until the transport drops it.
    pub async fn dispatch(&self, req: Request, res: Response) {
        let phases = self.inner.registry.snapshot();
        let mode = self.inner.mode;

        run_phase(Phase::Pre, &phases, normalize(&req, mode), res.clone()).await;

        res.finished().await;
        debug!(status = %res.status_code(), "response finished, running post phase");

        run_phase(Phase::Post, &phases, normalize(&req, mode), res).await;
    }

    /// A hyper service for this application.
    #[must_use]
    pub fn service(&self) -> GuarapiService {
        GuarapiService::new(self.clone())
    }

    /// Run a single request in-process and return the response.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<GuarapiBody>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        respond(self.clone(), Request::from_http(req, None), self.request_timeout()).await
    }

    /// Start serving on `host:port` and return the bound address.
    ///
    /// Resolves once the listener is accepting connections. Port `0` binds
    /// an ephemeral port.
    pub async fn listen(&self, host: &str, port: u16) -> GuarapiResult<SocketAddr> {
        let mut slot = self.inner.server.lock().await;
        if let Some(server) = slot.as_ref() {
            return Err(GuarapiError::Config(format!(
                "already listening on {}",
                server.local_addr()
            )));
        }
        let server = Server::bind(self.clone(), host, port).await?;
        let addr = server.local_addr();
        *slot = Some(server);
        Ok(addr)
    }

    /// Stop accepting connections, drain in-flight ones and forget the server.
    ///
    /// Does nothing if the application is not listening.
    pub async fn close(&self) {
        let server = self.inner.server.lock().await.take();
        if let Some(server) = server {
            server.shutdown().await;
        }
    }

    /// The address the server is bound to, if listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .server
            .lock()
            .await
            .as_ref()
            .map(Server::local_addr)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.config.request_timeout_ms)
    }
}

/// Run one phase inside the failure boundary.
///
/// Errors signaled with `next.fail` that survive the phase, as well as
/// handler `Err` returns and panics, are handed to the error pipeline.
async fn run_phase(phase: Phase, phases: &Phases, req: Request, res: Response) {
    let pipeline = Arc::clone(phases.get(phase));
    let errors = Arc::clone(&phases.error);

    let on_done = {
        let (errors, req, res) = (Arc::clone(&errors), req.clone(), res.clone());
        OnDone::new(move |error| {
            Box::pin(async move {
                if let Some(err) = error {
                    run_error_pipeline(errors, req, res, err).await;
                }
                Ok(())
            })
        })
    };

    let outcome = AssertUnwindSafe(advance(pipeline, req.clone(), res.clone(), None, Some(on_done)))
        .catch_unwind()
        .await;

    let err = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(panic) => GuarapiError::Panic(panic_message(panic.as_ref())).into(),
    };
    error!(%phase, error = %err, "unhandled sync rejection detected");
    run_error_pipeline(errors, req, res, err).await;
}

/// Run the error pipeline. A failure inside it is fatal for the request.
///
/// Running off the end of the list fails the response whether or not the
/// error was cleared along the way.
async fn run_error_pipeline(errors: Pipeline, req: Request, res: Response, err: BoxError) {
    let fallback = {
        let res = res.clone();
        OnDone::new(move |error| {
            Box::pin(async move {
                match error {
                    Some(err) => error!(error = %err, "error reached the end of the error pipeline"),
                    None => debug!("error pipeline ended without a response"),
                }
                res.fail();
                Ok(())
            })
        })
    };
    let outcome = AssertUnwindSafe(advance(errors, req, res.clone(), Some(err), Some(fallback)))
        .catch_unwind()
        .await;

    let fatal = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(panic) => GuarapiError::Panic(panic_message(panic.as_ref())).into(),
    };
    error!(error = %fatal, "error pipeline failed, terminating response");
    res.fail();
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
