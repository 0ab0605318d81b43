//! Composition and dispatch.
//!
//! A [`Pipeline`] is built once from an ordered middleware list and run any
//! number of times. Every run gets its own cursor and its own per-position
//! `next()` guards; the pipeline itself holds no mutable state, so one
//! pipeline can serve concurrent runs across tasks.
//!
//! Dispatch at position `i` of a pipeline of length `N`:
//!
//! ```text
//! i <  N   → middleware[i](state, next@i)
//! i == N   → terminal(state, next@N)      (if one was supplied)
//! otherwise → resolve with the current state
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{Instrument, debug, error, trace, trace_span};

use crate::error::Error;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware};
use crate::next::Next;

const DEFAULT_NAME: &str = "pipeline";

// ── Composition ───────────────────────────────────────────────────────────────

/// Compose `middleware` into a reusable [`Pipeline`].
///
/// The slice is only read: the pipeline keeps its own copy of the list, so the
/// caller's vector stays untouched and later changes to it do not affect the
/// pipeline.
///
/// ```rust
/// use onion::{BoxedMiddleware, Middleware, Next, compose};
///
/// let double: BoxedMiddleware<u32> = (|n: u32, next: Next<u32>| next.run(n * 2)).boxed();
/// let stack = vec![double.clone(), double];
/// let pipeline = compose(&stack);
///
/// assert_eq!(pipeline.len(), stack.len());
/// ```
pub fn compose<S, R, E>(middleware: &[BoxedMiddleware<S, R, E>]) -> Pipeline<S, R, E> {
    Pipeline::from_parts(Cow::Borrowed(DEFAULT_NAME), middleware.iter().cloned().collect(), false)
}

/// Compose a stack assembled at runtime, where a slot may be empty.
///
/// Fails with [`Error::InvalidMiddleware`] naming the first empty slot. The
/// check happens here, before any run.
pub fn try_compose<S, R, E>(
    slots: &[Option<BoxedMiddleware<S, R, E>>],
) -> Result<Pipeline<S, R, E>, Error> {
    let middleware = slots
        .iter()
        .enumerate()
        .map(|(index, slot)| slot.clone().ok_or(Error::InvalidMiddleware { index }))
        .collect::<Result<Arc<[_]>, _>>()?;
    Ok(Pipeline::from_parts(Cow::Borrowed(DEFAULT_NAME), middleware, false))
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// A composed, immutable, reusable middleware chain.
///
/// Cloning is one `Arc` increment. Run it with [`run`](Pipeline::run), or
/// with a per-run terminal via [`run_with`](Pipeline::run_with). A pipeline is
/// also a [`Middleware`], so it can be nested inside another pipeline: the
/// outer continuation becomes the inner pipeline's terminal.
pub struct Pipeline<S, R = S, E = Error> {
    layers: Arc<Layers<S, R, E>>,
}

struct Layers<S, R, E> {
    name: Cow<'static, str>,
    middleware: Arc<[BoxedMiddleware<S, R, E>]>,
    catch_panics: bool,
}

impl<S, R, E> Pipeline<S, R, E> {
    /// Start configuring a pipeline. See [`Builder`].
    pub fn builder() -> Builder<S, R, E> {
        Builder::new()
    }

    fn from_parts(
        name: Cow<'static, str>,
        middleware: Arc<[BoxedMiddleware<S, R, E>]>,
        catch_panics: bool,
    ) -> Self {
        debug!(pipeline = %name, len = middleware.len(), catch_panics, "pipeline composed");
        Self { layers: Arc::new(Layers { name, middleware, catch_panics }) }
    }

    /// Label given by [`Builder::name`], `"pipeline"` if none was set.
    pub fn name(&self) -> &str {
        &self.layers.name
    }

    /// Number of middleware, not counting a terminal.
    pub fn len(&self) -> usize {
        self.layers.middleware.len()
    }

    /// Whether the pipeline has no middleware of its own.
    pub fn is_empty(&self) -> bool {
        self.layers.middleware.is_empty()
    }
}

impl<S, R, E> Pipeline<S, R, E>
where
    S: Into<R> + Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
{
    /// Run the chain with `state`. When the last middleware calls `next`, the
    /// run resolves with the state it passed.
    ///
    /// Never panics or fails synchronously: every failure, including a second
    /// `next()` call, surfaces as `Err` from the returned future.
    pub fn run(&self, state: S) -> BoxFuture<Result<R, E>> {
        self.start(state, None)
    }

    /// Run the chain with `state`, then `terminal` as if it were appended to
    /// the end for this run only.
    pub fn run_with(&self, state: S, terminal: impl Middleware<S, R, E>) -> BoxFuture<Result<R, E>> {
        self.start(state, Some(terminal.boxed()))
    }

    fn start(&self, state: S, terminal: Option<BoxedMiddleware<S, R, E>>) -> BoxFuture<Result<R, E>> {
        let chain = Arc::new(Chain { layers: Arc::clone(&self.layers), terminal });
        let span = trace_span!(
            "pipeline",
            pipeline = %self.layers.name,
            len = self.len(),
            terminal = chain.terminal.is_some()
        );
        Box::pin(async move { dispatch(&chain, 0, state).await }.instrument(span))
    }
}

impl<S, R, E> Middleware<S, R, E> for Pipeline<S, R, E>
where
    S: Into<R> + Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
{
    fn call(&self, state: S, next: Next<S, R, E>) -> BoxFuture<Result<R, E>> {
        self.start(state, Some(next.boxed()))
    }
}

impl<S, R, E> Clone for Pipeline<S, R, E> {
    fn clone(&self) -> Self {
        Self { layers: Arc::clone(&self.layers) }
    }
}

impl<S, R, E> fmt::Debug for Pipeline<S, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.layers.name)
            .field("len", &self.len())
            .field("catch_panics", &self.layers.catch_panics)
            .finish()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`Pipeline`].
///
/// Each call returns `self`, so registrations chain in execution order:
///
/// ```rust
/// use onion::{Next, Pipeline};
///
/// let pipeline: Pipeline<String> = Pipeline::builder()
///     .name("greeting")
///     .with(|s: String, next: Next<String>| next.run(s + "hello"))
///     .with(|s: String, next: Next<String>| next.run(s + ", world"))
///     .build();
///
/// assert_eq!(pipeline.len(), 2);
/// assert_eq!(pipeline.name(), "greeting");
/// ```
pub struct Builder<S, R = S, E = Error> {
    name: Cow<'static, str>,
    middleware: Vec<BoxedMiddleware<S, R, E>>,
    catch_panics: bool,
}

impl<S, R, E> Builder<S, R, E> {
    /// An unnamed builder with no middleware and panic capture off.
    pub fn new() -> Self {
        Self { name: Cow::Borrowed(DEFAULT_NAME), middleware: Vec::new(), catch_panics: false }
    }

    /// Label used on the pipeline's tracing span. Defaults to `"pipeline"`.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a middleware. Returns `self` for chaining.
    pub fn with(mut self, middleware: impl Middleware<S, R, E>) -> Self {
        self.middleware.push(middleware.boxed());
        self
    }

    /// Append an already type-erased middleware, e.g. one shared between
    /// several pipelines.
    pub fn with_boxed(mut self, middleware: BoxedMiddleware<S, R, E>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Turn middleware panics into [`Error::Panicked`].
    ///
    /// Covers panics raised while a middleware builds its future as well as
    /// panics raised while that future is polled. Off by default, in which
    /// case a panic unwinds through the caller like any other Rust panic.
    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Freeze the registered middleware into a [`Pipeline`].
    pub fn build(self) -> Pipeline<S, R, E> {
        Pipeline::from_parts(self.name, self.middleware.into(), self.catch_panics)
    }
}

impl<S, R, E> Default for Builder<S, R, E> {
    fn default() -> Self { Self::new() }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Per-run view of a pipeline: the shared layers plus this run's terminal.
pub(crate) struct Chain<S, R, E> {
    layers: Arc<Layers<S, R, E>>,
    terminal: Option<BoxedMiddleware<S, R, E>>,
}

impl<S, R, E> Chain<S, R, E> {
    pub(crate) fn name(&self) -> &str {
        &self.layers.name
    }

    fn at(&self, position: usize) -> Option<&BoxedMiddleware<S, R, E>> {
        let len = self.layers.middleware.len();
        if position < len {
            Some(&self.layers.middleware[position])
        } else if position == len {
            self.terminal.as_ref()
        } else {
            None
        }
    }
}

/// Invoke position `position` of `chain` with `state`.
pub(crate) fn dispatch<S, R, E>(
    chain: &Arc<Chain<S, R, E>>,
    position: usize,
    state: S,
) -> BoxFuture<Result<R, E>>
where
    S: Into<R> + Send + 'static,
    R: Send + 'static,
    E: From<Error> + Send + 'static,
{
    use futures::FutureExt;

    let Some(middleware) = chain.at(position) else {
        trace!(position, "end of chain");
        return Box::pin(future::ready(Ok(state.into())));
    };

    trace!(position, "dispatch");
    let middleware = Arc::clone(middleware);
    let next = Next::new(Arc::clone(chain), position);

    // The middleware is only called once the returned future is polled, so a
    // handler that returns `next.run(..)` directly does not recurse into the
    // next position on the caller's stack.
    if !chain.layers.catch_panics {
        return Box::pin(async move { middleware.call(state, next).await });
    }

    Box::pin(async move {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(move || middleware.call(state, next))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(payload) => Err(payload),
        };
        outcome.unwrap_or_else(|payload| Err(E::from(panicked(position, payload))))
    })
}

fn panicked(position: usize, payload: Box<dyn Any + Send>) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    error!(position, panic = %message, "middleware panicked");
    Error::Panicked { position, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> BoxedMiddleware<u8> {
        (|n: u8, next: Next<u8>| next.run(n)).boxed()
    }

    #[test]
    fn positions_map_to_middleware_then_terminal_then_nothing() {
        let pipeline = compose(&[noop(), noop()]);
        let terminal = noop();
        let chain = Chain { layers: Arc::clone(&pipeline.layers), terminal: Some(terminal.clone()) };

        assert!(Arc::ptr_eq(chain.at(0).unwrap(), &pipeline.layers.middleware[0]));
        assert!(Arc::ptr_eq(chain.at(1).unwrap(), &pipeline.layers.middleware[1]));
        assert!(Arc::ptr_eq(chain.at(2).unwrap(), &terminal));
        assert!(chain.at(3).is_none());
    }

    #[test]
    fn without_terminal_the_end_is_empty() {
        let pipeline = compose(&[noop()]);
        let chain = Chain { layers: Arc::clone(&pipeline.layers), terminal: None };

        assert!(chain.at(0).is_some());
        assert!(chain.at(1).is_none());
    }

    #[test]
    fn try_compose_names_the_first_empty_slot() {
        let err = try_compose(&[Some(noop()), None, None]).unwrap_err();
        assert!(matches!(err, Error::InvalidMiddleware { index: 1 }));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = panicked(3, Box::new("boom"));
        assert!(matches!(err, Error::Panicked { position: 3, ref message } if message == "boom"));

        let err = panicked(0, Box::new(String::from("owned boom")));
        assert!(matches!(err, Error::Panicked { ref message, .. } if message == "owned boom"));

        let err = panicked(0, Box::new(42_u32));
        assert!(matches!(err, Error::Panicked { ref message, .. } if message == "non-string panic payload"));
    }
}
