//! Guarapi Server - demo application built on the Guarapi pipeline engine.
//!
//! Installs the logger, body parser and middleware plugins, registers a few
//! demo routes and serves until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! GUARAPI_PORT=3000 guarapi-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GUARAPI_HOST` | `0.0.0.0` | Bind host |
//! | `GUARAPI_PORT` | `3000` | Bind port |
//! | `GUARAPI_HTTP2` | `false` | Serve HTTP/2 instead of HTTP/1.1 |
//! | `GUARAPI_SSL` | `false` | Enable TLS |
//! | `GUARAPI_TLS_CERT` | *(unset)* | PEM certificate chain file |
//! | `GUARAPI_TLS_KEY` | *(unset)* | PEM private key file |
//! | `MAX_PAYLOAD_SIZE` | `1048576` | Request body limit in bytes |
//! | `REQUEST_TIMEOUT_MS` | `30000` | Time allowed for a response |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod routes;

use anyhow::{Context, Result};
use guarapi_core::GuarapiConfig;
use guarapi_http::Guarapi;
use guarapi_plugins::{BodyParser, LoggerPlugin, MiddlewarePlugin};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Perform a health check against a running server over plain HTTP/1.1.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

/// Build the application with the standard plugins and demo routes.
fn build_app(config: GuarapiConfig) -> Result<Guarapi> {
    let app = Guarapi::new(config);
    app.plugin(LoggerPlugin)
        .plugin(BodyParser::new())
        .plugin(MiddlewarePlugin);
    routes::install(&app).context("failed to install routes")?;
    Ok(app)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GuarapiConfig::from_env().context("invalid configuration")?;

    // Handle --health-check flag for container health probes.
    if std::env::args().any(|a| a == "--health-check") {
        let host = if config.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            config.host.as_str()
        };
        let healthy = run_health_check(&format!("{host}:{}", config.port))
            .await
            .is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level)?;

    info!(
        http2 = config.server_options.is_http2,
        tls = config.server_options.is_ssl,
        max_payload_size = config.max_payload_size,
        "starting Guarapi Server",
    );

    let app = build_app(config.clone())?;
    let addr = app
        .listen(&config.host, config.port)
        .await
        .with_context(|| format!("failed to listen on {}:{}", config.host, config.port))?;
    app.logger(Level::INFO, &format!("listening on {addr}"))?;

    tokio::signal::ctrl_c().await.ok();
    info!("received shutdown signal, draining connections");
    app.close().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_build_app_with_standard_plugins() {
        let app = build_app(GuarapiConfig::default()).unwrap();
        assert!(app.logger(Level::DEBUG, "ready").is_ok());
        assert_eq!(app.registry().len(guarapi_http::Phase::Post), 1);
    }

    #[tokio::test]
    async fn test_should_pass_health_check_against_running_server() {
        let app = build_app(GuarapiConfig::default()).unwrap();
        let addr = app.listen("127.0.0.1", 0).await.unwrap();

        run_health_check(&addr.to_string()).await.unwrap();

        app.close().await;
    }

    #[test]
    fn test_should_reject_invalid_log_filter() {
        assert!(EnvFilter::try_new("info,[=").is_err());
    }
}
