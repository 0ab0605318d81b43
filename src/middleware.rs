//! Middleware trait and type erasure.
//!
//! # How middleware is stored
//!
//! A pipeline holds middleware of *different* concrete types (async closures,
//! `async fn` items, other pipelines) in one ordered list. Rust collections
//! hold a single type, so every middleware is erased behind
//! `Arc<dyn Middleware>` at composition time:
//!
//! ```text
//! |state, next| async move { … }          ← user writes this
//!        ↓ Pipeline::builder().with(f)
//! Arc::new(f) as BoxedMiddleware          ← blanket impl for Fn
//!        ↓ stored in Arc<[BoxedMiddleware]>
//! middleware.call(state, next)            ← one vtable dispatch per position
//!        ↓
//! Box::pin(f(state, next))                ← BoxFuture
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::next::Next;

// ── Shared types ──────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` so a pipeline invocation can be spawned onto a
/// multi-threaded runtime or driven from any task.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A type-erased middleware, shared between every invocation of a pipeline.
pub type BoxedMiddleware<S, R = S, E = Error> = Arc<dyn Middleware<S, R, E>>;

// ── Middleware trait ──────────────────────────────────────────────────────────

/// One layer of the onion.
///
/// A middleware receives the current state and the continuation for the rest
/// of the chain. It may:
///
/// - call [`Next::run`] (at most once) to hand a state downstream, await the
///   result, and post-process it before returning;
/// - return without calling `next`, short-circuiting everything downstream;
/// - return `Err(e)`, which propagates upstream unless a caller handles it.
///
/// Implemented automatically for any
///
/// ```text
/// Fn(S, Next<S, R, E>) -> impl Future<Output = Result<R, E>>
/// ```
///
/// and by [`Pipeline`](crate::Pipeline), so composed pipelines nest inside
/// other pipelines without special casing.
pub trait Middleware<S, R = S, E = Error>: Send + Sync + 'static {
    fn call(&self, state: S, next: Next<S, R, E>) -> BoxFuture<Result<R, E>>;

    /// Erase the concrete type, ready for [`compose`](crate::compose).
    fn boxed(self) -> BoxedMiddleware<S, R, E>
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

// ── Blanket implementation ────────────────────────────────────────────────────

/// Any function with the right shape is a middleware:
///   - `async fn name(state: S, next: Next<S>) -> Result<S, Error>`
///   - closures returning an `async move` block
///   - plain functions returning any `Send` future, e.g. `std::future::ready`
impl<S, R, E, F, Fut> Middleware<S, R, E> for F
where
    F: Fn(S, Next<S, R, E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    fn call(&self, state: S, next: Next<S, R, E>) -> BoxFuture<Result<R, E>> {
        Box::pin((self)(state, next))
    }
}
