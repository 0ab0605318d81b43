//! # onion
//!
//! Onion-style composition of async middleware. Nothing more.
//!
//! ## The contract
//!
//! You hand onion an ordered list of middleware. onion hands back one
//! [`Pipeline`] you can run as often as you like. Each middleware gets the
//! current state and a one-shot [`Next`]; awaiting `next.run(state)` runs the
//! rest of the chain and gives back its result, so code after the await runs
//! on the way *out*:
//!
//! ```text
//! run(state) ─▶ a: before ─▶ b: before ─▶ c: before ─▶ (terminal)
//!                                                          │
//! result     ◀─ a: after  ◀─ b: after  ◀─ c: after  ◀──────┘
//! ```
//!
//! What onion deliberately leaves to you:
//!
//! - **What a middleware does**: onion only sequences calls
//! - **Routing**: pick a pipeline before you run it
//! - **I/O and timeouts**: wrap them inside a middleware if you need them
//! - **The shape of the state**: any `Send + 'static` value, moved through
//!
//! What onion guarantees:
//!
//! - Middleware `i` always starts before `i + 1`, and its post-`next` code
//!   runs only after everything downstream has finished (strict LIFO unwind)
//! - `next` runs at most once; a second call fails with
//!   [`Error::NextCalledMultipleTimes`]
//! - The outermost middleware's return value is the pipeline's result
//! - Every failure reaches the caller as `Err` from the run future, unchanged
//!
//! ## Quick start
//!
//! ```rust
//! use onion::{Error, Next, Pipeline};
//!
//! async fn timing(mut log: Vec<String>, next: Next<Vec<String>>) -> Result<Vec<String>, Error> {
//!     log.push("timing: start".into());
//!     let mut log = next.run(log).await?;
//!     log.push("timing: done".into());
//!     Ok(log)
//! }
//!
//! async fn auth(mut log: Vec<String>, next: Next<Vec<String>>) -> Result<Vec<String>, Error> {
//!     log.push("auth: ok".into());
//!     next.run(log).await
//! }
//!
//! # futures::executor::block_on(async {
//! let app: Pipeline<Vec<String>> = Pipeline::builder()
//!     .name("app")
//!     .with(timing)
//!     .with(auth)
//!     .build();
//!
//! let log = app.run(Vec::new()).await.unwrap();
//! assert_eq!(log, ["timing: start", "auth: ok", "timing: done"]);
//! # });
//! ```
//!
//! ## Observability
//!
//! onion emits [`tracing`] events: a `pipeline` span per run, labelled by
//! [`Builder::name`], plus `trace` events per dispatched position. A second
//! `next` call logs a `warn`; a captured panic logs an `error`. Install any
//! subscriber to see them.

mod error;
mod middleware;
mod next;
mod pipeline;

pub use error::{BoxError, Error};
pub use middleware::{BoxFuture, BoxedMiddleware, Middleware};
pub use next::Next;
pub use pipeline::{Builder, Pipeline, compose, try_compose};
