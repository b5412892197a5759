use std::{
    fmt,
    future::Future,
    mem,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    task::{Context, Poll, Waker},
};
use tracing::{debug, error, trace, warn};

use crate::{
    dispatch::{self, Job},
    error::panic_message,
    settle::{Rejecter, Resolver, Settler},
    Error, Options,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

// Returns the dispatch of the derived promise it settled, if any.
type Reaction<T, E> = Box<dyn FnOnce(Result<T, Error<E>>) -> Option<Job> + Send>;
type Callback = Box<dyn FnOnce() + Send>;

enum Settlement<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(Error<E>),
}

impl<T: Clone, E: Clone> Settlement<T, E> {
    fn outcome(&self) -> Option<Result<T, Error<E>>> {
        match self {
            Settlement::Pending => None,
            Settlement::Fulfilled(value) => Some(Ok(value.clone())),
            Settlement::Rejected(err) => Some(Err(err.clone())),
        }
    }
}

impl<T, E> Settlement<T, E> {
    fn state(&self) -> State {
        match self {
            Settlement::Pending => State::Pending,
            Settlement::Fulfilled(_) => State::Fulfilled,
            Settlement::Rejected(_) => State::Rejected,
        }
    }
}

impl<T, E> From<Result<T, Error<E>>> for Settlement<T, E> {
    fn from(outcome: Result<T, Error<E>>) -> Self {
        match outcome {
            Ok(value) => Settlement::Fulfilled(value),
            Err(err) => Settlement::Rejected(err),
        }
    }
}

/// What a settlement took out of the record, waiting to be dispatched.
struct Settled<T, E> {
    outcome: Result<T, Error<E>>,
    on_fulfilled: Option<Reaction<T, E>>,
    on_rejected: Option<Reaction<T, E>>,
    on_settled: Option<Callback>,
}

enum Slot {
    Fulfilled,
    Rejected,
}

struct Inner<T, E> {
    state: Settlement<T, E>,
    // One slot per kind. Registering again replaces the previous continuation.
    on_fulfilled: Option<Reaction<T, E>>,
    on_rejected: Option<Reaction<T, E>>,
    on_settled: Option<Callback>,
    // Set once every continuation of the settlement has run.
    notified: bool,
    wakers: Vec<Waker>,
}

/// The record shared by every handle to one promise.
pub(crate) struct Shared<T, E> {
    id: u64,
    inner: Mutex<Inner<T, E>>,
    condvar: Condvar,
}

impl<T, E> Shared<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn with_state(state: Settlement<T, E>, notified: bool) -> Arc<Self> {
        Arc::new(Shared {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(Inner {
                state,
                on_fulfilled: None,
                on_rejected: None,
                on_settled: None,
                notified,
                wakers: Vec::new(),
            }),
            condvar: Condvar::new(),
        })
    }

    pub(crate) fn pending() -> Arc<Self> {
        Self::with_state(Settlement::Pending, false)
    }

    fn settled(outcome: Result<T, Error<E>>) -> Arc<Self> {
        Self::with_state(Settlement::from(outcome), true)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> State {
        self.lock().state.state()
    }

    /// Move from `Pending` to the terminal state of `outcome`, run the
    /// registered continuations and release waiters. Returns `false`, and
    /// does nothing else, if the promise was already settled.
    ///
    /// Continuations of derived promises settled along the way run after
    /// this one, from the same loop, before the outermost call returns.
    pub(crate) fn settle(self: &Arc<Self>, outcome: Result<T, Error<E>>) -> bool {
        dispatch::run(|| match self.transition(outcome) {
            Some(settled) => {
                self.dispatch(settled);
                true
            }
            None => false,
        })
    }

    /// Settle now but hand back the dispatch of the continuations instead of
    /// running it. Continuations use this so a chain is walked by the
    /// dispatch loop rather than by recursion.
    pub(crate) fn settle_later(self: &Arc<Self>, outcome: Result<T, Error<E>>) -> Option<Job> {
        let settled = self.transition(outcome)?;
        let shared = self.clone();
        Some(Box::new(move || shared.dispatch(settled)))
    }

    fn transition(&self, outcome: Result<T, Error<E>>) -> Option<Settled<T, E>> {
        let mut inner = self.lock();
        if !matches!(inner.state, Settlement::Pending) {
            return None;
        }
        inner.state = Settlement::from(outcome.clone());
        let settled = Settled {
            outcome,
            on_fulfilled: inner.on_fulfilled.take(),
            on_rejected: inner.on_rejected.take(),
            on_settled: inner.on_settled.take(),
        };
        drop(inner);
        debug!(
            promise = self.id,
            fulfilled = settled.outcome.is_ok(),
            "promise settled"
        );
        Some(settled)
    }

    fn dispatch(&self, settled: Settled<T, E>) {
        let Settled {
            outcome,
            on_fulfilled,
            on_rejected,
            on_settled,
        } = settled;
        if let Some(job) = on_fulfilled.and_then(|reaction| reaction(outcome.clone())) {
            dispatch::defer(job);
        }
        if let Some(job) = on_rejected.and_then(|reaction| reaction(outcome)) {
            dispatch::defer(job);
        }
        if let Some(callback) = on_settled {
            self.run_settled(callback);
        }

        let wakers = {
            let mut inner = self.lock();
            inner.notified = true;
            mem::take(&mut inner.wakers)
        };
        self.condvar.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Store `reaction` in `slot`, or run it right away if already settled.
    fn react(&self, slot: Slot, reaction: Reaction<T, E>) {
        let mut inner = self.lock();
        let settled = inner.state.outcome();
        match settled {
            Some(outcome) => {
                drop(inner);
                trace!(promise = self.id, "continuation runs immediately");
                if let Some(job) = reaction(outcome) {
                    dispatch::run(job);
                }
            }
            None => {
                let displaced = match slot {
                    Slot::Fulfilled => inner.on_fulfilled.replace(reaction),
                    Slot::Rejected => inner.on_rejected.replace(reaction),
                };
                drop(inner);
                if displaced.is_some() {
                    // Dropping the old continuation abandons its derived promise.
                    warn!(promise = self.id, "continuation slot overwritten");
                }
            }
        }
    }

    fn finally(&self, callback: Callback) {
        let mut inner = self.lock();
        if matches!(inner.state, Settlement::Pending) {
            let displaced = inner.on_settled.replace(callback);
            drop(inner);
            if displaced.is_some() {
                warn!(promise = self.id, "finally callback overwritten");
            }
            return;
        }
        drop(inner);
        self.run_settled(callback);
    }

    fn run_settled(&self, callback: Callback) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            error!(
                promise = self.id,
                message = %panic_message(&*payload),
                "finally callback panicked"
            );
        }
    }

    pub(crate) fn wait(&self) -> Result<T, Error<E>> {
        let mut inner = self.lock();
        loop {
            if let (true, Some(outcome)) = (inner.notified, inner.state.outcome()) {
                return outcome;
            }
            inner = self
                .condvar
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn poll_outcome(&self, waker: &Waker) -> Poll<Result<T, Error<E>>> {
        let mut inner = self.lock();
        if let (true, Some(outcome)) = (inner.notified, inner.state.outcome()) {
            return Poll::Ready(outcome);
        }
        if !inner.wakers.iter().any(|w| w.will_wake(waker)) {
            inner.wakers.push(waker.clone());
        }
        Poll::Pending
    }
}

/// Run a user continuation, turning a panic into a rejection.
fn run_continuation<U, E>(id: u64, f: impl FnOnce() -> U) -> Result<U, Error<E>> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(&*payload);
        error!(promise = id, %message, "continuation panicked");
        Error::Panicked(message)
    })
}

/// A single-assignment container for the eventual outcome of a computation.
///
/// Handles are cheap to clone; every clone refers to the same promise.
///
/// # Examples
///
/// ```
/// use asyncify::Promise;
///
/// let promise = Promise::<_, ()>::new(|resolve, _reject| {
///     resolve.resolve(20);
/// });
/// let doubled = promise.then(|v| v * 2).finally(|| println!("done"));
/// assert_eq!(doubled.wait().unwrap(), 40);
/// assert_eq!(promise.wait().unwrap(), 20);
/// ```
///
/// # Single-slot continuations
///
/// A promise keeps one `then` continuation, one `catch` continuation and one
/// `finally` callback. Registering a second one of the same kind while the
/// promise is pending replaces the first; the derived promise of the replaced
/// continuation is rejected with [`Error::Abandoned`]. Chain from the derived
/// promise instead of registering twice on the same one.
pub struct Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Run `executor` on a new thread and return the pending promise at once.
    ///
    /// The executor receives the two settle handles. Only the first
    /// settlement counts. A panicking executor rejects the promise with
    /// [`Error::Panicked`]; dropping both handles without settling rejects it
    /// with [`Error::Abandoned`].
    pub fn new<F>(executor: F) -> Promise<T, E>
    where
        F: FnOnce(Resolver<T, E>, Rejecter<T, E>) + Send + 'static,
    {
        Promise::with_options(Options::default(), executor)
    }

    /// Like [`Promise::new`], with the executor thread configured by `options`.
    ///
    /// If the thread cannot be spawned the promise is rejected with
    /// [`Error::Spawn`].
    pub fn with_options<F>(options: Options, executor: F) -> Promise<T, E>
    where
        F: FnOnce(Resolver<T, E>, Rejecter<T, E>) + Send + 'static,
    {
        let shared = Shared::pending();
        let settler = Arc::new(Settler::new(shared.clone()));
        let resolve = Resolver::new(settler.clone());
        let reject = Rejecter::new(settler.clone());
        let guard = settler.clone();
        let id = shared.id();

        let spawned = options.builder().spawn(move || {
            if let Err(payload) =
                panic::catch_unwind(AssertUnwindSafe(move || executor(resolve, reject)))
            {
                let message = panic_message(&*payload);
                error!(promise = id, %message, "executor panicked");
                guard.settle(Err(Error::Panicked(message)));
            }
        });

        match spawned {
            Ok(_) => debug!(promise = id, thread = options.thread_name(), "executor spawned"),
            Err(err) => {
                error!(promise = id, error = %err, "failed to spawn executor thread");
                settler.settle(Err(Error::Spawn(Arc::new(err))));
            }
        }
        Promise { shared }
    }

    /// An already fulfilled promise.
    pub fn resolved(value: T) -> Promise<T, E> {
        Promise {
            shared: Shared::settled(Ok(value)),
        }
    }

    /// An already rejected promise, failing with [`Error::Rejected`].
    pub fn rejected(err: E) -> Promise<T, E> {
        Promise {
            shared: Shared::settled(Err(Error::Rejected(err))),
        }
    }

    fn pending() -> (Promise<T, E>, Settler<T, E>) {
        let shared = Shared::pending();
        let settler = Settler::new(shared.clone());
        (Promise { shared }, settler)
    }

    pub fn state(&self) -> State {
        self.shared.state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// Derive a promise fulfilled with `on_fulfilled(value)`.
    ///
    /// A rejection skips the callback and passes through to the derived
    /// promise unchanged. If this promise is already settled the derived one
    /// is settled before `then` returns.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (derived, settler) = Promise::pending();
        let id = derived.shared.id();
        self.shared.react(
            Slot::Fulfilled,
            Box::new(move |outcome: Result<T, Error<E>>| {
                let next = match outcome {
                    Ok(value) => run_continuation(id, move || on_fulfilled(value)),
                    Err(err) => Err(err),
                };
                settler.settle_later(next)
            }),
        );
        derived
    }

    /// Derive a promise that absorbs a rejection: it is fulfilled with
    /// `on_rejected(reason)`, or with this promise's value if there was no
    /// rejection.
    pub fn catch<F>(&self, on_rejected: F) -> Promise<T, E>
    where
        F: FnOnce(Error<E>) -> T + Send + 'static,
    {
        let (derived, settler) = Promise::pending();
        let id = derived.shared.id();
        self.shared.react(
            Slot::Rejected,
            Box::new(move |outcome: Result<T, Error<E>>| {
                let next = match outcome {
                    Ok(value) => Ok(value),
                    Err(err) => run_continuation(id, move || on_rejected(err)),
                };
                settler.settle_later(next)
            }),
        );
        derived
    }

    /// Run `on_settled` once this promise settles, whatever the outcome.
    ///
    /// Returns the same promise, so further chaining observes the original
    /// outcome. A panic in `on_settled` is logged and otherwise ignored.
    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.finally(Box::new(on_settled));
        self.clone()
    }

    /// Block the calling thread until the promise settles.
    ///
    /// Returns immediately if it already has. Async code should `.await` the
    /// promise instead.
    pub fn wait(&self) -> Result<T, Error<E>> {
        self.shared.wait()
    }
}

impl<T, E> Clone for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Promise {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.shared.id())
            .field("state", &self.state())
            .finish()
    }
}

impl<T, E> Future for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, Error<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.shared.poll_outcome(cx.waker())
    }
}
