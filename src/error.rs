use std::{any::Any, io, sync::Arc};
use thiserror::Error;

/// Why a promise ended up rejected.
///
/// `E` is the payload handed to [`Rejecter::reject`](crate::Rejecter::reject).
/// The other variants are produced by the promise machinery itself, so they
/// flow through `then` chains and reach `catch` handlers the same way a user
/// rejection does.
#[derive(Debug, Clone, Error)]
pub enum Error<E> {
    /// The executor or a continuation called `reject`.
    #[error("promise rejected: {0}")]
    Rejected(E),

    /// The executor, a `then` callback or a `catch` callback panicked.
    #[error("promise callback panicked: {0}")]
    Panicked(String),

    /// Every settle handle was dropped while the promise was still pending.
    #[error("promise abandoned before it was settled")]
    Abandoned,

    /// The executor thread could not be spawned.
    #[error("failed to spawn executor thread: {0}")]
    Spawn(#[source] Arc<io::Error>),
}

impl<E> Error<E> {
    /// Returns `true` for a rejection raised through `reject`.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Rejected(_))
    }

    /// Borrow the user payload, if this is a user rejection.
    pub fn rejection(&self) -> Option<&E> {
        match self {
            Error::Rejected(err) => Some(err),
            _ => None,
        }
    }

    /// Take the user payload, if this is a user rejection.
    pub fn into_rejected(self) -> Option<E> {
        match self {
            Error::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// Render a panic payload the way the default hook does.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}
