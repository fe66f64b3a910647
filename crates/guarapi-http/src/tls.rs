//! TLS acceptor construction from PEM material.

use std::sync::Arc;

use guarapi_core::{GuarapiError, GuarapiResult, ServerOptions};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::aws_lc_rs;

/// Build a TLS acceptor when `is_ssl` is set.
///
/// ALPN advertises `h2` in HTTP/2 mode and `http/1.1` otherwise.
pub fn build_acceptor(options: &ServerOptions) -> GuarapiResult<Option<TlsAcceptor>> {
    if !options.is_ssl {
        return Ok(None);
    }

    let cert_pem = options
        .cert
        .as_deref()
        .ok_or_else(|| GuarapiError::Config("isSSL requires a certificate".to_owned()))?;
    let key_pem = options
        .key
        .as_deref()
        .ok_or_else(|| GuarapiError::Config("isSSL requires a private key".to_owned()))?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GuarapiError::Tls(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(GuarapiError::Tls("no certificate found in PEM".to_owned()));
    }
    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .map_err(|e| GuarapiError::Tls(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| GuarapiError::Tls("no private key found in PEM".to_owned()))?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| GuarapiError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| GuarapiError::Tls(e.to_string()))?;

    config.alpn_protocols = if options.is_http2 {
        vec![b"h2".to_vec()]
    } else {
        vec![b"http/1.1".to_vec()]
    };

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip_tls_when_disabled() {
        assert!(build_acceptor(&ServerOptions::default()).unwrap().is_none());
    }

    #[test]
    fn test_should_require_certificate_and_key() {
        let options = ServerOptions {
            is_ssl: true,
            ..ServerOptions::default()
        };
        assert!(matches!(
            build_acceptor(&options),
            Err(GuarapiError::Config(_))
        ));
    }

    #[test]
    fn test_should_reject_pem_without_certificates() {
        let options = ServerOptions {
            is_ssl: true,
            cert: Some("not a certificate".to_owned()),
            key: Some("not a key".to_owned()),
            ..ServerOptions::default()
        };
        assert!(matches!(build_acceptor(&options), Err(GuarapiError::Tls(_))));
    }
}
