//! Pipeline executor.
//!
//! [`advance`] walks an ordered list of [`Handler`]s. While no error is in
//! flight only normal handlers run; once an error is in flight only error
//! handlers run. Handlers of the wrong kind are skipped without being called.
//!
//! Control passes through a [`Next`] continuation owned by the running
//! handler. A handler that never resumes `next` ends the phase at that point.
//! When the scan runs off the end of the list, the optional [`OnDone`]
//! continuation receives the in-flight error (if any). Without one, an
//! in-flight error terminates the response with the default failure.
//!
//! The executor does not catch failures returned by handlers: an `Err` (or a
//! panic) unwinds through the chain of awaiting handlers to the caller.

use std::sync::Arc;

use guarapi_core::BoxError;
use tracing::{error, trace};

use crate::handler::{BoxFuture, ErrorMiddleware, Handler, HandlerResult, Middleware};
use crate::request::Request;
use crate::response::Response;

/// An ordered, immutable list of handlers.
pub type Pipeline = Arc<[Handler]>;

/// Build a pipeline from handlers.
#[must_use]
pub fn pipeline(handlers: impl IntoIterator<Item = Handler>) -> Pipeline {
    handlers.into_iter().collect()
}

/// One-shot continuation run when a pipeline is exhausted.
pub struct OnDone(Box<dyn FnOnce(Option<BoxError>) -> BoxFuture<HandlerResult> + Send>);

impl OnDone {
    /// Wrap a closure receiving the in-flight error, if any.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Option<BoxError>) -> BoxFuture<HandlerResult> + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn call(self, error: Option<BoxError>) -> BoxFuture<HandlerResult> {
        (self.0)(error)
    }
}

impl std::fmt::Debug for OnDone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OnDone")
    }
}

/// Continue an outer pipeline once a nested pipeline is exhausted.
impl From<Next> for OnDone {
    fn from(next: Next) -> Self {
        Self::new(move |error| next.forward(error))
    }
}

/// Continuation handed to each handler.
pub struct Next {
    pipeline: Pipeline,
    cursor: usize,
    req: Request,
    res: Response,
    on_done: Option<OnDone>,
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("cursor", &self.cursor)
            .field("len", &self.pipeline.len())
            .field("on_done", &self.on_done.is_some())
            .finish_non_exhaustive()
    }
}

impl Next {
    /// Continue with the next normal handler.
    pub fn run(self) -> BoxFuture<HandlerResult> {
        self.forward(None)
    }

    /// Put `err` in flight and continue with the next error handler.
    pub fn fail(self, err: impl Into<BoxError>) -> BoxFuture<HandlerResult> {
        self.forward(Some(err.into()))
    }

    /// Continue with or without an error in flight.
    pub fn forward(self, error: Option<BoxError>) -> BoxFuture<HandlerResult> {
        step(
            self.pipeline,
            self.cursor,
            self.req,
            self.res,
            error,
            self.on_done,
        )
    }
}

/// Run `pipeline` from its first handler.
pub fn advance(
    pipeline: Pipeline,
    req: Request,
    res: Response,
    error: Option<BoxError>,
    on_done: Option<OnDone>,
) -> BoxFuture<HandlerResult> {
    step(pipeline, 0, req, res, error, on_done)
}

fn step(
    pipeline: Pipeline,
    cursor: usize,
    req: Request,
    res: Response,
    error: Option<BoxError>,
    on_done: Option<OnDone>,
) -> BoxFuture<HandlerResult> {
    Box::pin(async move {
        match error {
            None => {
                let Some((index, handler)) = find_normal(&pipeline, cursor) else {
                    return exhaust(None, &res, on_done).await;
                };
                trace!(index, "running handler");
                let next = Next {
                    pipeline,
                    cursor: index + 1,
                    req: req.clone(),
                    res: res.clone(),
                    on_done,
                };
                handler.call(req, res, next).await
            }
            Some(err) => {
                let Some((index, handler)) = find_error(&pipeline, cursor) else {
                    return exhaust(Some(err), &res, on_done).await;
                };
                trace!(index, error = %err, "running error handler");
                let next = Next {
                    pipeline,
                    cursor: index + 1,
                    req: req.clone(),
                    res: res.clone(),
                    on_done,
                };
                handler.call(err, req, res, next).await
            }
        }
    })
}

fn find_normal(pipeline: &Pipeline, cursor: usize) -> Option<(usize, Arc<dyn Middleware>)> {
    pipeline
        .iter()
        .enumerate()
        .skip(cursor)
        .find_map(|(index, handler)| match handler {
            Handler::Normal(m) => Some((index, Arc::clone(m))),
            Handler::Error(_) => None,
        })
}

fn find_error(pipeline: &Pipeline, cursor: usize) -> Option<(usize, Arc<dyn ErrorMiddleware>)> {
    pipeline
        .iter()
        .enumerate()
        .skip(cursor)
        .find_map(|(index, handler)| match handler {
            Handler::Error(m) => Some((index, Arc::clone(m))),
            Handler::Normal(_) => None,
        })
}

async fn exhaust(
    error: Option<BoxError>,
    res: &Response,
    on_done: Option<OnDone>,
) -> HandlerResult {
    match (on_done, error) {
        (Some(on_done), error) => on_done.call(error).await,
        (None, Some(err)) => {
            error!(error = %err, "error reached the end of the pipeline unhandled");
            res.fail();
            Ok(())
        }
        (None, None) => Ok(()),
    }
}
