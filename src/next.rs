//! The one-shot continuation handed to every middleware.

use std::fmt;
use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::error::Error;
use crate::middleware::{BoxFuture, Middleware};
use crate::pipeline::{Chain, dispatch};

/// Continuation for the rest of the chain, bound to one position.
///
/// Calling [`run`](Next::run) dispatches the next position with the given
/// state and returns a future that resolves once everything downstream has
/// finished, yielding the downstream result.
///
/// A `Next` may be run **at most once**. A second call does not panic; the
/// returned future resolves to [`Error::NextCalledMultipleTimes`]. Clones share
/// the same guard, so handing a clone to a spawned task does not grant a
/// second call.
pub struct Next<S, R = S, E = Error> {
    chain: Arc<Chain<S, R, E>>,
    // Position of the middleware that owns this continuation.
    origin: usize,
    called: Arc<AtomicBool>,
}

impl<S, R, E> Next<S, R, E> {
    pub(crate) fn new(chain: Arc<Chain<S, R, E>>, origin: usize) -> Self {
        Self { chain, origin, called: Arc::new(AtomicBool::new(false)) }
    }

    /// Position of the middleware this continuation was handed to.
    /// The terminal sits at `pipeline.len()`.
    pub fn position(&self) -> usize {
        self.origin
    }

    /// Whether [`run`](Next::run) has been called on this continuation or any
    /// of its clones.
    pub fn is_called(&self) -> bool {
        self.called.load(Ordering::Acquire)
    }
}

impl<S, R, E> Next<S, R, E>
where
    S: Into<R> + Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
{
    /// Run the rest of the chain with `state`.
    pub fn run(&self, state: S) -> BoxFuture<Result<R, E>> {
        if self.called.swap(true, Ordering::AcqRel) {
            warn!(
                pipeline = %self.chain.name(),
                position = self.origin,
                "next() called multiple times"
            );
            let err = Error::NextCalledMultipleTimes { position: self.origin };
            return Box::pin(future::ready(Err(E::from(err))));
        }
        dispatch(&self.chain, self.origin + 1, state)
    }
}

/// A continuation is itself a middleware that ignores its own `next`. This is
/// what lets an outer pipeline's continuation serve as a nested pipeline's
/// terminal.
impl<S, R, E> Middleware<S, R, E> for Next<S, R, E>
where
    S: Into<R> + Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
{
    fn call(&self, state: S, _next: Next<S, R, E>) -> BoxFuture<Result<R, E>> {
        self.run(state)
    }
}

impl<S, R, E> Clone for Next<S, R, E> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            origin: self.origin,
            called: Arc::clone(&self.called),
        }
    }
}

impl<S, R, E> fmt::Debug for Next<S, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("pipeline", &self.chain.name())
            .field("position", &self.origin)
            .field("called", &self.is_called())
            .finish()
    }
}
