//! Unified error type.

/// A boxed application error, carried by [`Error::Handler`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type produced by onion itself.
///
/// Pipelines are generic over their error type `E` and only require
/// `E: From<Error>`, so an application can keep its own error enum and still
/// receive composition failures. Whatever a middleware returns as `Err(e)`
/// reaches the caller as that same `e`; onion never re-wraps handler errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A runtime-assembled stack had an empty slot. Reported by
    /// [`try_compose`](crate::try_compose) before anything runs.
    #[error("middleware slot {index} is empty")]
    InvalidMiddleware { index: usize },

    /// The middleware at `position` called its [`Next`](crate::Next) twice.
    #[error("next() called multiple times by middleware at position {position}")]
    NextCalledMultipleTimes { position: usize },

    /// The middleware at `position` panicked while panic capture was enabled.
    #[error("middleware at position {position} panicked: {message}")]
    Panicked { position: usize, message: String },

    /// An application failure raised inside a middleware.
    #[error(transparent)]
    Handler(BoxError),
}

impl Error {
    /// Wrap an application error so it can travel through a pipeline that
    /// uses the default error type.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }
}
