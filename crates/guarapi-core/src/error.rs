//! Error types for Guarapi.

/// Type-erased error carried through handler pipelines.
///
/// Handlers may fail with any error type; the pipeline boxes it so error
/// handlers can inspect it (for example by downcasting to [`GuarapiError`]).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the framework itself.
#[derive(Debug, thiserror::Error)]
pub enum GuarapiError {
    /// The request body exceeded the configured payload limit.
    #[error("Payload too large: request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// The request body declared JSON but could not be decoded.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The request body stream failed while being read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// A capability was invoked before the plugin providing it was registered.
    #[error("Not Implemented. Please activate {plugin} plugin.")]
    Unimplemented {
        /// The missing capability (e.g. `use`).
        capability: &'static str,
        /// The plugin that provides it.
        plugin: &'static str,
    },

    /// A handler panicked while processing a request.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error from the transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GuarapiError {
    /// Error returned by `use` until the middleware plugin is registered.
    #[must_use]
    pub fn middleware_unavailable() -> Self {
        Self::Unimplemented {
            capability: "use",
            plugin: "middleware",
        }
    }

    /// Error returned by `logger` until the logger plugin is registered.
    #[must_use]
    pub fn logger_unavailable() -> Self {
        Self::Unimplemented {
            capability: "logger",
            plugin: "logger",
        }
    }

    /// Whether the error was caused by the client's request rather than the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooLarge { .. } | Self::InvalidJson(_) | Self::Body(_)
        )
    }
}

/// Convenience result type for Guarapi operations.
pub type GuarapiResult<T> = Result<T, GuarapiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_format_unimplemented_capabilities() {
        assert_eq!(
            GuarapiError::middleware_unavailable().to_string(),
            "Not Implemented. Please activate middleware plugin."
        );
        assert_eq!(
            GuarapiError::logger_unavailable().to_string(),
            "Not Implemented. Please activate logger plugin."
        );
    }

    #[test]
    fn test_should_classify_client_errors() {
        assert!(GuarapiError::PayloadTooLarge { limit: 10 }.is_client_error());
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(GuarapiError::from(json).is_client_error());
        assert!(!GuarapiError::Panic("boom".into()).is_client_error());
    }

    #[test]
    fn test_should_downcast_from_box_error() {
        let err: BoxError = GuarapiError::PayloadTooLarge { limit: 1000 }.into();
        let inner = err.downcast_ref::<GuarapiError>();
        assert!(matches!(
            inner,
            Some(GuarapiError::PayloadTooLarge { limit: 1000 })
        ));
    }
}
