//! Transport integration tests: HTTP/2 cleartext, TLS and shutdown.

#[cfg(test)]
mod tests {
    use guarapi_core::{GuarapiConfig, ServerOptions};
    use http::{StatusCode, Version};
    use serde_json::{Value, json};

    use crate::{base_url, spawn_echo_app};

    fn self_signed() -> (String, String) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        (certified.cert.pem(), certified.key_pair.serialize_pem())
    }

    fn config(is_http2: bool, is_ssl: bool) -> GuarapiConfig {
        let (cert, key) = if is_ssl {
            let (cert, key) = self_signed();
            (Some(cert), Some(key))
        } else {
            (None, None)
        };
        GuarapiConfig {
            server_options: ServerOptions {
                is_http2,
                is_ssl,
                cert,
                key,
            },
            ..GuarapiConfig::default()
        }
    }

    fn tls_client() -> reqwest::Client {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_should_serve_http2_prior_knowledge() {
        let (app, addr) = spawn_echo_app(config(true, false)).await;
        let client = reqwest::Client::builder()
            .http2_prior_knowledge()
            .build()
            .unwrap();

        let response = client
            .post(format!("{}/h2?mode=prior-knowledge", base_url(addr, false)))
            .json(&json!({"hello": "h2"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.version(), Version::HTTP_2);
        let value: Value = response.json().await.unwrap();
        assert_eq!(value["version"], "HTTP/2.0");
        assert_eq!(value["url"], "/h2?mode=prior-knowledge");
        assert_eq!(value["path"], "/h2");
        assert_eq!(value["body"], json!({"hello": "h2"}));

        app.close().await;
    }

    #[tokio::test]
    async fn test_should_serve_https() {
        let (app, addr) = spawn_echo_app(config(false, true)).await;

        let response = tls_client()
            .post(format!("{}/secure", base_url(addr, true)))
            .form(&[("user[name]", "ana")])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.version(), Version::HTTP_11);
        let value: Value = response.json().await.unwrap();
        assert_eq!(value["body"], json!({"user": {"name": "ana"}}));

        app.close().await;
    }

    #[tokio::test]
    async fn test_should_serve_http2_over_tls() {
        let (app, addr) = spawn_echo_app(config(true, true)).await;

        let response = tls_client()
            .get(format!("{}/secure", base_url(addr, true)))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.version(), Version::HTTP_2);
        let value: Value = response.json().await.unwrap();
        assert_eq!(value["url"], "/secure");

        app.close().await;
    }

    #[tokio::test]
    async fn test_should_stop_accepting_after_close() {
        let (app, addr) = spawn_echo_app(GuarapiConfig::default()).await;
        assert_eq!(app.local_addr().await, Some(addr));

        app.close().await;

        assert_eq!(app.local_addr().await, None);
        let result = reqwest::Client::new().get(base_url(addr, false)).send().await;
        assert!(result.is_err(), "closed server must refuse connections");

        // Closing twice is harmless.
        app.close().await;
    }

    #[tokio::test]
    async fn test_should_refuse_second_listen() {
        let (app, _addr) = spawn_echo_app(GuarapiConfig::default()).await;

        assert!(app.listen("127.0.0.1", 0).await.is_err());

        app.close().await;
    }
}
