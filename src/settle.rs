//! Settle handles. The executor receives a [`Resolver`] and a [`Rejecter`];
//! both may be cloned and moved to other threads. Only the first settlement
//! through any of them takes effect.
//!
use std::{fmt, sync::Arc};
use tracing::{trace, warn};

use crate::{dispatch::Job, promise::Shared, Error};

/// Owns the right to settle one promise. When the last handle goes away
/// while the promise is still pending, the promise is rejected with
/// [`Error::Abandoned`].
pub(crate) struct Settler<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Settler<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn new(shared: Arc<Shared<T, E>>) -> Self {
        Settler { shared }
    }

    pub(crate) fn settle(&self, outcome: Result<T, Error<E>>) -> bool {
        self.shared.settle(outcome)
    }

    /// Settle from inside a continuation; see [`Shared::settle_later`].
    pub(crate) fn settle_later(&self, outcome: Result<T, Error<E>>) -> Option<Job> {
        self.shared.settle_later(outcome)
    }
}

impl<T, E> Drop for Settler<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if self.shared.settle(Err(Error::Abandoned)) {
            warn!(promise = self.shared.id(), "promise abandoned while pending");
        }
    }
}

/// Fulfills a promise.
///
/// # Examples
///
/// ```
/// use asyncify::Promise;
/// use std::thread;
///
/// let promise = Promise::<String, ()>::new(|resolve, _reject| {
///     thread::spawn(move || resolve.resolve("🍓".to_owned()));
/// });
/// assert_eq!(promise.wait().unwrap(), "🍓");
/// ```
pub struct Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    settler: Arc<Settler<T, E>>,
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn new(settler: Arc<Settler<T, E>>) -> Self {
        Resolver { settler }
    }

    /// Fulfill the promise with `value`.
    ///
    /// Returns `true` if this call settled the promise and `false` if it was
    /// already settled, in which case `value` is dropped.
    pub fn resolve(&self, value: T) -> bool {
        let settled = self.settler.settle(Ok(value));
        if !settled {
            trace!(promise = self.settler.shared.id(), "resolve ignored, already settled");
        }
        settled
    }
}

impl<T, E> Clone for Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Resolver {
            settler: self.settler.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.settler.shared.id())
            .finish()
    }
}

/// Rejects a promise.
///
/// # Examples
///
/// ```
/// use asyncify::Promise;
///
/// let promise = Promise::<(), String>::new(|_resolve, reject| {
///     reject.reject("💥".to_owned());
/// });
/// assert_eq!(promise.wait().unwrap_err().into_rejected().as_deref(), Some("💥"));
/// ```
pub struct Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    settler: Arc<Settler<T, E>>,
}

impl<T, E> Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn new(settler: Arc<Settler<T, E>>) -> Self {
        Rejecter { settler }
    }

    /// Reject the promise with `err`, surfaced as [`Error::Rejected`].
    ///
    /// Returns `true` if this call settled the promise.
    pub fn reject(&self, err: E) -> bool {
        let settled = self.settler.settle(Err(Error::Rejected(err)));
        if !settled {
            trace!(promise = self.settler.shared.id(), "reject ignored, already settled");
        }
        settled
    }
}

impl<T, E> Clone for Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Rejecter {
            settler: self.settler.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejecter")
            .field("promise", &self.settler.shared.id())
            .finish()
    }
}
