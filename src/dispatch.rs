//! Per-thread run queue for settlement work.
//!
//! Settling a derived promise from inside a continuation would otherwise
//! recurse once per link of a `then` chain. Instead the nested dispatch is
//! queued here and the outermost settlement on the thread drains the queue,
//! so the stack depth stays constant however long the chain is.

use std::{cell::RefCell, collections::VecDeque};

pub(crate) type Job = Box<dyn FnOnce()>;

thread_local! {
    // `Some` while a drain is active on this thread.
    static QUEUE: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

/// Clears the queue when the outermost `run` ends, even by unwinding.
struct Drain;

impl Drop for Drain {
    fn drop(&mut self) {
        // Jobs left behind only exist if a drain unwound; drop them outside the borrow.
        let leftover = QUEUE.with(|queue| queue.borrow_mut().take());
        drop(leftover);
    }
}

/// Run `f`. If no drain is active on this thread, `f` becomes the outermost
/// one and every job queued while it runs is executed before returning.
pub(crate) fn run<R>(f: impl FnOnce() -> R) -> R {
    let outermost = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.is_some() {
            return false;
        }
        *queue = Some(VecDeque::new());
        true
    });
    if !outermost {
        return f();
    }

    let _drain = Drain;
    let result = f();
    while let Some(job) = QUEUE.with(|queue| queue.borrow_mut().as_mut().and_then(VecDeque::pop_front)) {
        job();
    }
    result
}

/// Queue `job` behind the active drain, or run it now if there is none.
pub(crate) fn defer(job: Job) {
    let job = QUEUE.with(|queue| match queue.borrow_mut().as_mut() {
        Some(queue) => {
            queue.push_back(job);
            None
        }
        None => Some(job),
    });
    if let Some(job) = job {
        run(job);
    }
}
