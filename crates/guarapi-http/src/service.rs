//! Hyper `Service` implementation bridging the transport and the dispatcher.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use http::{HeaderValue, StatusCode};
use hyper::body::Incoming;
use tokio::task::AbortHandle;
use tracing::{error, warn};

use crate::app::Guarapi;
use crate::body::GuarapiBody;
use crate::request::Request;
use crate::response::{INTERNAL_SERVER_ERROR_BODY, Response};

/// Hyper `Service` implementation for a Guarapi application.
///
/// Each call spawns the application's dispatcher for the request and waits
/// for the response to end, bounded by the configured request timeout.
#[derive(Debug, Clone)]
pub struct GuarapiService {
    app: Guarapi,
    remote_addr: Option<SocketAddr>,
}

impl GuarapiService {
    /// Create a service for `app`.
    #[must_use]
    pub fn new(app: Guarapi) -> Self {
        Self {
            app,
            remote_addr: None,
        }
    }

    /// A copy of this service that tags requests with the peer address.
    #[must_use]
    pub fn for_peer(&self, remote_addr: SocketAddr) -> Self {
        Self {
            app: self.app.clone(),
            remote_addr: Some(remote_addr),
        }
    }
}

impl hyper::service::Service<http::Request<Incoming>> for GuarapiService {
    type Response = http::Response<GuarapiBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let app = self.app.clone();
        let request = Request::from_http(req, self.remote_addr);

        Box::pin(async move {
            let timeout = app.request_timeout();
            Ok(respond(app, request, timeout).await)
        })
    }
}

/// Dispatch `request` and wait for its response.
///
/// If the response does not end within `timeout`, the dispatch task is
/// aborted and `503 Service Unavailable` is returned. If the caller stops
/// waiting (for example because the client disconnected), the dispatch task
/// is aborted as well.
pub(crate) async fn respond(
    app: Guarapi,
    request: Request,
    timeout: Duration,
) -> http::Response<GuarapiBody> {
    let (response, pending) = Response::channel();
    let method = request.method().clone();
    let url = request.url().to_owned();

    let task = tokio::spawn(async move { app.dispatch(request, response).await });
    let guard = AbortOnDrop(Some(task.abort_handle()));

    let response = match tokio::time::timeout(timeout, pending).await {
        Ok(Ok(response)) => {
            guard.disarm();
            response
        }
        Ok(Err(_)) => {
            error!(%method, %url, "request dropped without a response");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR_BODY)
        }
        Err(_) => {
            warn!(%method, %url, ?timeout, "request timed out before a response was sent");
            plain_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
        }
    };

    add_common_headers(response)
}

/// Aborts the dispatch task unless disarmed.
struct AbortOnDrop(Option<AbortHandle>);

impl AbortOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> http::Response<GuarapiBody> {
    let mut response = http::Response::new(GuarapiBody::from_static(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain"),
    );
    response
}

/// Add common response headers to every response.
fn add_common_headers(mut response: http::Response<GuarapiBody>) -> http::Response<GuarapiBody> {
    response
        .headers_mut()
        .entry(http::header::SERVER)
        .or_insert(HeaderValue::from_static("Guarapi"));
    response
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use guarapi_core::GuarapiConfig;
    use http_body_util::{BodyExt, Full};

    use super::*;
    use crate::handler::Handler;
    use crate::pipeline::Next;
    use crate::registry::{PluginHooks, plugin_fn};

    fn app_with(handler: Handler, timeout_ms: u64) -> Guarapi {
        let app = Guarapi::new(GuarapiConfig {
            request_timeout_ms: timeout_ms,
            ..GuarapiConfig::default()
        });
        app.plugin(plugin_fn(move |_app: &Guarapi, _config: &GuarapiConfig| {
            PluginHooks::default().with_pre(handler.clone())
        }));
        app
    }

    fn get() -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .uri("/")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_should_add_server_header() {
        let app = app_with(
            Handler::terminal(|_req, res: Response| async move {
                res.send("ok");
                Ok(())
            }),
            1_000,
        );

        let response = app.handle(get()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[http::header::SERVER], "Guarapi");
    }

    #[tokio::test]
    async fn test_should_time_out_abandoned_requests() {
        let app = app_with(Handler::normal(|_req, _res, _next: Next| async { Ok(()) }), 50);

        let response = app.handle(get()).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Service Unavailable");
    }

    #[tokio::test]
    async fn test_should_keep_handler_headers() {
        let app = app_with(
            Handler::terminal(|_req, res: Response| async move {
                res.set_header(http::header::SERVER, HeaderValue::from_static("custom"));
                res.end();
                Ok(())
            }),
            1_000,
        );

        let response = app.handle(get()).await;

        assert_eq!(response.headers()[http::header::SERVER], "custom");
    }
}
