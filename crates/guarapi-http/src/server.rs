//! Transport: accept loop, protocol selection and graceful shutdown.

use std::net::SocketAddr;

use guarapi_core::GuarapiResult;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::app::Guarapi;
use crate::service::GuarapiService;
use crate::tls;

/// A running server. Dropping it without [`shutdown`](Self::shutdown) stops
/// the accept loop without waiting for in-flight connections.
#[derive(Debug)]
pub struct Server {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Server {
    /// Bind `host:port` and start accepting connections for `app`.
    pub async fn bind(app: Guarapi, host: &str, port: u16) -> GuarapiResult<Self> {
        let options = app.config().server_options.clone();
        let acceptor = tls::build_acceptor(&options)?;

        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;

        info!(
            %local_addr,
            http2 = options.is_http2,
            tls = acceptor.is_some(),
            "server listening",
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let service = app.service();
        let task = tokio::spawn(serve(
            listener,
            service,
            acceptor,
            options.is_http2,
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// The bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for in-flight connections to drain.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "server task failed");
        }
    }
}

fn connection_builder(http2: bool) -> HttpConnBuilder<TokioExecutor> {
    let builder = HttpConnBuilder::new(TokioExecutor::new());
    if http2 {
        builder.http2_only()
    } else {
        builder.http1_only()
    }
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(
    listener: TcpListener,
    service: GuarapiService,
    acceptor: Option<TlsAcceptor>,
    http2: bool,
    mut shutdown: oneshot::Receiver<()>,
) {
    let graceful = GracefulShutdown::new();
    let http = connection_builder(http2);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.for_peer(peer_addr);
                let http = http.clone();
                let watcher = graceful.watcher();
                let acceptor = acceptor.clone();

                tokio::spawn(async move {
                    match acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, peer_addr, svc, &http, watcher).await,
                            Err(e) => warn!(%peer_addr, error = %e, "TLS handshake failed"),
                        },
                        None => serve_connection(stream, peer_addr, svc, &http, watcher).await,
                    }
                });
            }

            _ = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    drop(listener);
    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained");
}

async fn serve_connection<I>(
    io: I,
    peer_addr: SocketAddr,
    svc: GuarapiService,
    http: &HttpConnBuilder<TokioExecutor>,
    watcher: hyper_util::server::graceful::Watcher,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn = http.serve_connection(TokioIo::new(io), svc);
    if let Err(e) = watcher.watch(conn.into_owned()).await {
        debug!(%peer_addr, error = %e, "connection closed with error");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use guarapi_core::GuarapiConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::handler::Handler;
    use crate::registry::{PluginHooks, plugin_fn};
    use crate::response::Response;

    fn hello_app() -> Guarapi {
        let app = Guarapi::new(GuarapiConfig::default());
        app.plugin(plugin_fn(|_app: &Guarapi, _config: &GuarapiConfig| {
            PluginHooks::default().with_pre(Handler::terminal(|req, res: Response| async move {
                res.send(format!("hello {}", req.path()));
                Ok(())
            }))
        }));
        app
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> std::io::Result<String> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok(response)
    }

    #[tokio::test]
    async fn test_should_serve_http1_requests() {
        let app = hello_app();
        let addr = app.listen("127.0.0.1", 0).await.unwrap();

        let response = raw_get(addr, "/world").await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("hello /world"));
        app.close().await;
    }

    #[tokio::test]
    async fn test_should_refuse_second_listen() {
        let app = hello_app();
        app.listen("127.0.0.1", 0).await.unwrap();

        assert!(app.listen("127.0.0.1", 0).await.is_err());
        app.close().await;
    }

    #[tokio::test]
    async fn test_should_stop_accepting_after_close() {
        let app = hello_app();
        let addr = app.listen("127.0.0.1", 0).await.unwrap();
        assert_eq!(app.local_addr().await, Some(addr));

        app.close().await;

        assert_eq!(app.local_addr().await, None);
        let connect = tokio::time::timeout(Duration::from_secs(1), TcpStream::connect(addr)).await;
        assert!(!matches!(connect, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn test_should_allow_close_when_not_listening() {
        let app = hello_app();
        app.close().await;
        assert_eq!(app.local_addr().await, None);
    }
}
