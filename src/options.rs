//! Executor thread options

use std::thread;

/// Configuration for the thread a promise executor runs on.
///
/// ```
/// use asyncify::{Options, Promise};
///
/// let promise = Promise::<_, ()>::with_options(Options::new().name("loader"), |resolve, _| {
///     resolve.resolve(std::thread::current().name().map(str::to_owned));
/// });
/// assert_eq!(promise.wait().unwrap().as_deref(), Some("loader"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    /// Name the executor thread. Shows up in panic messages and debuggers.
    pub fn name<N: Into<String>>(self, name: N) -> Options {
        Options {
            name: Some(name.into()),
            ..self
        }
    }

    /// Stack size in bytes. Defaults to the platform default for spawned threads.
    pub fn stack_size(self, size: usize) -> Options {
        Options {
            stack_size: Some(size),
            ..self
        }
    }

    pub(crate) fn thread_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn builder(&self) -> thread::Builder {
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder
    }
}
