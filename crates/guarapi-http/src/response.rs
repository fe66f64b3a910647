//! Response handle and its completion signal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::header::{AsHeaderName, CONTENT_TYPE, IntoHeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use crate::body::GuarapiBody;

/// Body written by the default failure response.
pub const INTERNAL_SERVER_ERROR_BODY: &str = "Internal Server Error";

struct ResponseState {
    status: StatusCode,
    status_set: bool,
    headers: HeaderMap,
    body: BytesMut,
    finished: bool,
}

struct ResponseInner {
    state: Mutex<ResponseState>,
    sink: Mutex<Option<oneshot::Sender<http::Response<GuarapiBody>>>>,
    finished: watch::Sender<bool>,
}

/// A cheap, cloneable handle to the outbound response.
///
/// Handlers set the status and headers, write body chunks and finally call
/// [`end`](Self::end). Ending is idempotent: the first call assembles the
/// `http::Response`, hands it to the transport and fires the completion
/// signal observed by [`finished`](Self::finished); later calls are ignored.
#[derive(Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Response")
            .field("status", &state.status)
            .field("finished", &state.finished)
            .finish_non_exhaustive()
    }
}

/// The transport side of a [`Response`]: resolves once the response is ended.
///
/// Resolves to an error if every handle is dropped without ending the response.
#[derive(Debug)]
pub struct PendingResponse(oneshot::Receiver<http::Response<GuarapiBody>>);

impl Future for PendingResponse {
    type Output = Result<http::Response<GuarapiBody>, oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Response {
    /// Create a response handle paired with the transport receiver.
    #[must_use]
    pub fn channel() -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        let (finished, _) = watch::channel(false);
        let response = Self {
            inner: Arc::new(ResponseInner {
                state: Mutex::new(ResponseState {
                    status: StatusCode::OK,
                    status_set: false,
                    headers: HeaderMap::new(),
                    body: BytesMut::new(),
                    finished: false,
                }),
                sink: Mutex::new(Some(tx)),
                finished,
            }),
        };
        (response, PendingResponse(rx))
    }

    /// Set the status code.
    pub fn status(&self, status: StatusCode) -> &Self {
        let mut state = self.inner.state.lock();
        if !state.finished {
            state.status = status;
            state.status_set = true;
        }
        self
    }

    /// Current status code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.inner.state.lock().status
    }

    /// Whether a handler set the status explicitly.
    #[must_use]
    pub fn has_explicit_status(&self) -> bool {
        self.inner.state.lock().status_set
    }

    /// Set a header, replacing any previous value.
    pub fn set_header<K: IntoHeaderName>(&self, name: K, value: HeaderValue) -> &Self {
        let mut state = self.inner.state.lock();
        if !state.finished {
            state.headers.insert(name, value);
        }
        self
    }

    /// Read a header that has been set.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<HeaderValue> {
        self.inner.state.lock().headers.get(name).cloned()
    }

    /// Append a chunk to the body. Returns `false` if the response already ended.
    pub fn write(&self, chunk: impl AsRef<[u8]>) -> bool {
        let mut state = self.inner.state.lock();
        if state.finished {
            return false;
        }
        state.body.extend_from_slice(chunk.as_ref());
        true
    }

    /// Number of body bytes written so far.
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.inner.state.lock().body.len()
    }

    /// Finish the response. Returns `true` only for the call that ended it.
    pub fn end(&self) -> bool {
        let response = {
            let mut state = self.inner.state.lock();
            if state.finished {
                return false;
            }
            state.finished = true;

            let mut response =
                http::Response::new(GuarapiBody::from_bytes(state.body.split().freeze()));
            *response.status_mut() = state.status;
            *response.headers_mut() = std::mem::take(&mut state.headers);
            response
        };

        if let Some(sink) = self.inner.sink.lock().take() {
            if sink.send(response).is_err() {
                tracing::debug!("response ended after the transport stopped waiting");
            }
        }
        self.inner.finished.send_replace(true);
        true
    }

    /// Write a body and finish the response.
    pub fn send(&self, body: impl Into<Bytes>) -> bool {
        let body = body.into();
        self.write(&body) && self.end()
    }

    /// Serialize `value` as JSON, set the content type and finish the response.
    pub fn json<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<bool, serde_json::Error> {
        let payload = serde_json::to_vec(value)?;
        self.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self.send(payload))
    }

    /// Whether the response has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.inner.finished.borrow()
    }

    /// Wait until the response has ended.
    pub async fn finished(&self) {
        let mut rx = self.inner.finished.subscribe();
        // The sender lives as long as `self`, so this only returns once ended.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// End the response with the default failure if nothing else ended it.
    ///
    /// An error status chosen by a handler is kept; anything else becomes
    /// `500`. Bytes already written are kept; otherwise a generic message is
    /// sent.
    pub fn fail(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        let status = self.status_code();
        let keep = self.has_explicit_status()
            && (status.is_client_error() || status.is_server_error());
        if !keep {
            self.status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        if self.body_len() == 0 {
            if self.header(CONTENT_TYPE).is_none() {
                self.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            }
            self.write(INTERNAL_SERVER_ERROR_BODY);
        }
        self.end()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    async fn body_text(response: http::Response<GuarapiBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_should_deliver_response_on_end() {
        let (res, pending) = Response::channel();
        res.status(StatusCode::UNAUTHORIZED);
        res.write("Unauth");
        res.write("orized");
        assert!(res.end());

        let response = pending.await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "Unauthorized");
    }

    #[tokio::test]
    async fn test_should_end_only_once() {
        let (res, pending) = Response::channel();
        assert!(res.send("first"));
        assert!(!res.end());
        assert!(!res.write("second"));
        assert!(!res.send("third"));

        let response = pending.await.unwrap();
        assert_eq!(body_text(response).await, "first");
    }

    #[tokio::test]
    async fn test_should_serialize_json() {
        let (res, pending) = Response::channel();
        res.json(&serde_json::json!({"ok": true})).unwrap();

        let response = pending.await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, r#"{"ok":true}"#);
    }

    #[test]
    fn test_should_signal_completion() {
        let (res, _pending) = Response::channel();
        let mut finished = task::spawn(res.finished());
        assert_pending!(finished.poll());

        res.end();
        assert!(finished.is_woken());
        assert_ready!(finished.poll());
        assert!(res.is_finished());
    }

    #[tokio::test]
    async fn test_should_fail_with_default_status_and_body() {
        let (res, pending) = Response::channel();
        assert!(res.fail());
        assert!(!res.fail());

        let response = pending.await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, INTERNAL_SERVER_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_should_keep_explicit_status_on_failure() {
        let (res, pending) = Response::channel();
        res.status(StatusCode::BAD_REQUEST);
        res.fail();

        let response = pending.await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_should_replace_success_status_on_failure() {
        let (res, pending) = Response::channel();
        res.status(StatusCode::CREATED);
        res.fail();

        let response = pending.await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, INTERNAL_SERVER_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_should_report_dropped_response() {
        let (res, pending) = Response::channel();
        drop(res);
        assert!(pending.await.is_err());
    }
}
