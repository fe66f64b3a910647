//! Demo routes installed through the middleware plugin.

use guarapi_core::GuarapiResult;
use guarapi_http::{Guarapi, Handler, HandlerResult, Request, Response, error_status};
use guarapi_plugins::route;
use http::{Method, StatusCode};
use serde_json::json;

/// Server version reported by the health endpoint.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Register the demo routes and the fallback/error handlers on `app`.
pub fn install(app: &Guarapi) -> GuarapiResult<()> {
    app.use_handler(route(Method::GET, "/health", Handler::terminal(health)))?;
    app.use_handler(route(Method::POST, "/echo", Handler::terminal(echo)))?;
    app.use_handler(Handler::terminal(not_found))?;
    app.use_handler(Handler::terminal_error(|err, _req, res: Response| async move {
        let status = error_status(&err);
        let message = if status.is_client_error() {
            err.to_string()
        } else {
            "Internal Server Error".to_owned()
        };
        res.status(status);
        res.json(&json!({ "error": message }))?;
        Ok(())
    }))?;
    Ok(())
}

async fn health(_req: Request, res: Response) -> HandlerResult {
    res.json(&json!({ "status": "running", "version": VERSION }))?;
    Ok(())
}

async fn echo(req: Request, res: Response) -> HandlerResult {
    let Some(body) = req.body() else {
        res.status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        res.json(&json!({ "error": "expected a JSON or form-encoded body" }))?;
        return Ok(());
    };
    res.json(&json!({ "body": body }))?;
    Ok(())
}

async fn not_found(req: Request, res: Response) -> HandlerResult {
    let message = format!("no route for {} {}", req.method(), req.path());
    res.status(StatusCode::NOT_FOUND);
    res.json(&json!({ "error": message }))?;
    Ok(())
}
