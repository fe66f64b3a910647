//! Pipeline integration tests over HTTP/1.1.

#[cfg(test)]
mod tests {
    use guarapi_core::GuarapiConfig;
    use guarapi_plugins::REQUEST_ID_HEADER;
    use http::StatusCode;
    use serde_json::Value;

    use crate::{base_url, spawn_echo_app};

    #[tokio::test]
    async fn test_should_serve_request_through_pipeline() {
        let (app, addr) = spawn_echo_app(GuarapiConfig::default()).await;

        let response = reqwest::get(format!("{}/items?page=2", base_url(addr, false)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["server"], "Guarapi");
        assert_eq!(response.headers()[REQUEST_ID_HEADER].len(), 36);

        let value: Value = response.json().await.unwrap();
        assert_eq!(value["method"], "GET");
        assert_eq!(value["url"], "/items?page=2");
        assert_eq!(value["path"], "/items");
        assert_eq!(value["version"], "HTTP/1.1");
        assert_eq!(value["body"], Value::Null);

        app.close().await;
    }

    #[tokio::test]
    async fn test_should_assign_distinct_request_ids() {
        let (app, addr) = spawn_echo_app(GuarapiConfig::default()).await;
        let client = reqwest::Client::new();

        let first = client.get(base_url(addr, false)).send().await.unwrap();
        let second = client.get(base_url(addr, false)).send().await.unwrap();

        assert_ne!(
            first.headers()[REQUEST_ID_HEADER],
            second.headers()[REQUEST_ID_HEADER]
        );

        app.close().await;
    }
}
