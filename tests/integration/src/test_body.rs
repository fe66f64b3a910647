//! Body parser integration tests.

#[cfg(test)]
mod tests {
    use guarapi_core::GuarapiConfig;
    use http::StatusCode;
    use serde_json::{Value, json};

    use crate::{base_url, spawn_echo_app};

    async fn post(content_type: &str, body: impl Into<reqwest::Body>) -> (StatusCode, String) {
        let (app, addr) = spawn_echo_app(GuarapiConfig::default()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/submit", base_url(addr, false)))
            .header("content-type", content_type)
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        let text = response.text().await.unwrap();
        app.close().await;
        (status, text)
    }

    fn echoed_body(text: &str) -> Value {
        let value: Value = serde_json::from_str(text).unwrap();
        value["body"].clone()
    }

    #[tokio::test]
    async fn test_should_parse_json_body() {
        let (status, text) = post(
            "application/json",
            r#"{"a":{"b":["c","d",null,true,1]}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(echoed_body(&text), json!({"a": {"b": ["c", "d", null, true, 1]}}));
    }

    #[tokio::test]
    async fn test_should_parse_nested_form_body() {
        let (status, text) = post(
            "application/x-www-form-urlencoded",
            "a.b=c&a[d]=e&list[]=x&list[]=y&n=1&n=2",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            echoed_body(&text),
            json!({
                "a": {"b": "c", "d": "e"},
                "list": {"0": "x", "1": "y"},
                "n": ["1", "2"],
            })
        );
    }

    #[tokio::test]
    async fn test_should_leave_multipart_body_unparsed() {
        let (status, text) = post(
            "multipart/form-data; boundary=XyZ",
            "--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nb\r\n--XyZ--\r\n",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(echoed_body(&text), Value::Null);
    }

    #[tokio::test]
    async fn test_should_reject_malformed_json() {
        let (status, text) = post("application/json", "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(text.starts_with("invalid JSON body"), "got: {text}");
    }

    #[tokio::test]
    async fn test_should_reject_payload_over_limit() {
        let config = GuarapiConfig {
            max_payload_size: 1000,
            ..GuarapiConfig::default()
        };
        let (app, addr) = spawn_echo_app(config).await;

        let response = reqwest::Client::new()
            .post(base_url(addr, false))
            .header("content-type", "application/json")
            .body(format!(r#"{{"data":"{}"}}"#, "x".repeat(5000)))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.text().await.unwrap().starts_with("Payload too large"));

        app.close().await;
    }
}
