//! Single-assignment promises for threaded code.
//!
//! A [`Promise`] holds the eventual outcome of a computation that runs on its
//! own thread. The computation, the *executor*, receives a [`Resolver`] and a
//! [`Rejecter`] and settles the promise through one of them; only the first
//! settlement counts. Meanwhile other code can chain continuations with
//! [`Promise::then`], [`Promise::catch`] and [`Promise::finally`] without
//! blocking, and later synchronize with [`Promise::wait`] or by `.await`ing
//! the promise.
//!
//! # Examples
//!
//! ```
//! use asyncify::{Error, Promise};
//! use std::{thread, time::Duration};
//!
//! let greeting = Promise::<String, String>::new(|resolve, _reject| {
//!     thread::sleep(Duration::from_millis(10));
//!     resolve.resolve("hello".to_owned());
//! });
//!
//! let shout = greeting.then(|v| v + "!");
//! assert_eq!(shout.wait().unwrap(), "hello!");
//!
//! let recovered = Promise::<String, String>::rejected("offline".to_owned())
//!     .then(|v| v + "!")
//!     .catch(|err| match err {
//!         Error::Rejected(reason) => format!("fallback ({})", reason),
//!         other => other.to_string(),
//!     });
//! assert_eq!(recovered.wait().unwrap(), "fallback (offline)");
//! ```
//!
//! # Single-slot continuations
//!
//! Each promise has exactly one `then` slot, one `catch` slot and one
//! `finally` slot. A second registration of the same kind on a pending
//! promise replaces the first, see [`Promise`].

mod dispatch;
pub mod error;
pub mod options;
pub mod promise;
pub mod settle;

pub use error::Error;
pub use options::Options;
pub use promise::{Promise, State};
pub use settle::{Rejecter, Resolver};
