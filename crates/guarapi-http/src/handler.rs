//! Handler variants stored in phase pipelines.
//!
//! A handler is either *normal* (runs while no error is in flight) or an
//! *error* handler (runs only while an error is in flight). The kind is an
//! explicit tag on [`Handler`], never inferred from the closure signature.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use guarapi_core::BoxError;

use crate::pipeline::Next;
use crate::request::Request;
use crate::response::Response;

/// Boxed, sendable future used at the handler seams.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Result returned by every handler.
///
/// Returning `Err` "throws": the error unwinds through the continuation chain
/// to the dispatcher boundary, which hands it to the error pipeline. Use
/// [`Next::fail`] to signal an error without unwinding.
pub type HandlerResult = Result<(), BoxError>;

/// A handler that runs while no error is in flight.
pub trait Middleware: Send + Sync + 'static {
    /// Process the request, optionally continuing with `next`.
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<HandlerResult>;
}

/// A handler that runs only while an error is in flight.
pub trait ErrorMiddleware: Send + Sync + 'static {
    /// Process the in-flight error, optionally continuing with `next`.
    fn call(
        &self,
        err: BoxError,
        req: Request,
        res: Response,
        next: Next,
    ) -> BoxFuture<HandlerResult>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<HandlerResult> {
        Box::pin(self(req, res, next))
    }
}

impl<F, Fut> ErrorMiddleware for F
where
    F: Fn(BoxError, Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        err: BoxError,
        req: Request,
        res: Response,
        next: Next,
    ) -> BoxFuture<HandlerResult> {
        Box::pin(self(err, req, res, next))
    }
}

/// The two kinds of handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Runs while no error is in flight.
    Normal,
    /// Runs only while an error is in flight.
    Error,
}

/// A pipeline entry.
#[derive(Clone)]
pub enum Handler {
    /// A normal handler.
    Normal(Arc<dyn Middleware>),
    /// An error handler.
    Error(Arc<dyn ErrorMiddleware>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal(_) => f.write_str("Handler::Normal"),
            Self::Error(_) => f.write_str("Handler::Error"),
        }
    }
}

impl Handler {
    /// A normal handler from a closure taking `(req, res, next)`.
    pub fn normal<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Normal(Arc::new(f))
    }

    /// An error handler from a closure taking `(err, req, res, next)`.
    pub fn error<F, Fut>(f: F) -> Self
    where
        F: Fn(BoxError, Request, Response, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Error(Arc::new(f))
    }

    /// A normal handler that never continues the pipeline.
    pub fn terminal<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::normal(move |req, res, _next| f(req, res))
    }

    /// An error handler that never continues the pipeline.
    pub fn terminal_error<F, Fut>(f: F) -> Self
    where
        F: Fn(BoxError, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::error(move |err, req, res, _next| f(err, req, res))
    }

    /// Wrap a [`Middleware`] implementation.
    pub fn from_middleware<M: Middleware>(middleware: M) -> Self {
        Self::Normal(Arc::new(middleware))
    }

    /// The handler's kind.
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Normal(_) => HandlerKind::Normal,
            Self::Error(_) => HandlerKind::Error,
        }
    }

    /// Whether the handler runs while an error is in flight.
    #[must_use]
    pub fn accepts_error(&self) -> bool {
        self.kind() == HandlerKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_tag_handler_kinds() {
        let normal = Handler::normal(|_req, _res, next: Next| next.run());
        let terminal = Handler::terminal(|_req, res: Response| async move {
            res.end();
            Ok(())
        });
        let error = Handler::error(|err, _req, _res, next: Next| next.fail(err));
        let terminal_error = Handler::terminal_error(|_err, _req, _res| async { Ok(()) });

        assert_eq!(normal.kind(), HandlerKind::Normal);
        assert_eq!(terminal.kind(), HandlerKind::Normal);
        assert!(error.accepts_error());
        assert!(terminal_error.accepts_error());
        assert_eq!(format!("{error:?}"), "Handler::Error");
    }
}
