//! Configuration management for Guarapi.
//!
//! Configuration can be built in code, deserialized (camelCase keys), or loaded
//! from environment variables with [`GuarapiConfig::from_env`].

use crate::error::{GuarapiError, GuarapiResult};

/// Default request body limit: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Transport selection for the server.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerOptions {
    /// Serve HTTP/2 instead of HTTP/1.1.
    #[serde(rename = "isHTTP2", alias = "isHttp2")]
    pub is_http2: bool,
    /// Wrap the transport in TLS.
    #[serde(rename = "isSSL", alias = "isSsl")]
    pub is_ssl: bool,
    /// PEM-encoded certificate chain, required when `is_ssl` is set.
    pub cert: Option<String>,
    /// PEM-encoded private key, required when `is_ssl` is set.
    pub key: Option<String>,
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("is_http2", &self.is_http2)
            .field("is_ssl", &self.is_ssl)
            .field("cert", &self.cert.as_ref().map(|_| "..."))
            .field("key", &self.key.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Global configuration for a Guarapi application.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuarapiConfig {
    /// Transport options.
    pub server_options: ServerOptions,
    /// Maximum accepted request body size in bytes.
    pub max_payload_size: usize,
    /// How long the transport waits for a response before giving up.
    pub request_timeout_ms: u64,
    /// Bind host used by the server binary.
    pub host: String,
    /// Bind port used by the server binary.
    pub port: u16,
    /// Log level.
    pub log_level: String,
}

impl Default for GuarapiConfig {
    fn default() -> Self {
        Self {
            server_options: ServerOptions::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            request_timeout_ms: 30_000,
            host: "0.0.0.0".to_owned(),
            port: 3000,
            log_level: "info".to_owned(),
        }
    }
}

impl GuarapiConfig {
    /// Load configuration from environment variables.
    ///
    /// `GUARAPI_TLS_CERT` and `GUARAPI_TLS_KEY` name PEM files that are read
    /// eagerly so a missing file fails at startup.
    pub fn from_env() -> GuarapiResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GuarapiResult<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("GUARAPI_HOST") {
            config.host = v;
        }
        if let Some(v) = lookup("GUARAPI_PORT") {
            config.port = parse_number("GUARAPI_PORT", &v)?;
        }
        if let Some(v) = lookup("GUARAPI_HTTP2") {
            config.server_options.is_http2 = parse_flag(&v);
        }
        if let Some(v) = lookup("GUARAPI_SSL") {
            config.server_options.is_ssl = parse_flag(&v);
        }
        if let Some(path) = lookup("GUARAPI_TLS_CERT") {
            config.server_options.cert = Some(read_pem("GUARAPI_TLS_CERT", &path)?);
        }
        if let Some(path) = lookup("GUARAPI_TLS_KEY") {
            config.server_options.key = Some(read_pem("GUARAPI_TLS_KEY", &path)?);
        }
        if let Some(v) = lookup("MAX_PAYLOAD_SIZE") {
            config.max_payload_size = parse_number("MAX_PAYLOAD_SIZE", &v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_number("REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> GuarapiResult<()> {
        if self.max_payload_size == 0 {
            return Err(GuarapiError::Config(
                "maxPayloadSize must be greater than zero".to_owned(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(GuarapiError::Config(
                "requestTimeoutMs must be greater than zero".to_owned(),
            ));
        }
        let options = &self.server_options;
        if options.is_ssl && (options.cert.is_none() || options.key.is_none()) {
            return Err(GuarapiError::Config(
                "isSSL requires both cert and key".to_owned(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> GuarapiResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GuarapiError::Config(format!("{name} must be a number, got {value:?}")))
}

fn read_pem(name: &str, path: &str) -> GuarapiResult<String> {
    tracing::debug!(variable = name, %path, "loading PEM file");
    std::fs::read_to_string(path)
        .map_err(|e| GuarapiError::Config(format!("cannot read {name} from {path}: {e}")))
}
