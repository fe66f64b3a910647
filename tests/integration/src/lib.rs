//! End-to-end tests for Guarapi.
//!
//! Every test starts its own application on an ephemeral `127.0.0.1` port
//! and talks to it with `reqwest`, so no external server is needed.
//!
//! ```text
//! cargo test -p guarapi-integration
//! ```

use std::net::SocketAddr;
use std::sync::Once;

use guarapi_core::GuarapiConfig;
use guarapi_http::{Guarapi, Handler, Response, error_status};
use guarapi_plugins::{BodyParser, LoggerPlugin, MiddlewarePlugin};
use serde_json::json;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Start an application with the standard plugins and the echo handlers.
///
/// The returned address is already accepting connections.
pub async fn spawn_echo_app(config: GuarapiConfig) -> (Guarapi, SocketAddr) {
    init_tracing();

    let app = Guarapi::new(config);
    app.plugin(LoggerPlugin)
        .plugin(BodyParser::new())
        .plugin(MiddlewarePlugin);
    install_echo(&app);

    let addr = app
        .listen("127.0.0.1", 0)
        .await
        .expect("server should bind an ephemeral port");
    (app, addr)
}

/// Reply with the decoded body (or `null`) and the request's transport
/// details. Errors are answered with [`error_status`] and their message.
fn install_echo(app: &Guarapi) {
    app.use_handler(Handler::terminal(|req, res: Response| async move {
        res.json(&json!({
            "method": req.method().as_str(),
            "url": req.url(),
            "path": req.path(),
            "version": format!("{:?}", req.version()),
            "body": req.body(),
        }))?;
        Ok(())
    }))
    .expect("middleware plugin is installed");

    app.use_handler(Handler::terminal_error(|err, _req, res: Response| async move {
        res.status(error_status(&err))
            .send(err.to_string());
        Ok(())
    }))
    .expect("middleware plugin is installed");
}

/// Base URL for a server bound at `addr`.
#[must_use]
pub fn base_url(addr: SocketAddr, tls: bool) -> String {
    let scheme = if tls { "https" } else { "http" };
    format!("{scheme}://{addr}")
}

mod test_body;
mod test_pipeline;
mod test_transport;
