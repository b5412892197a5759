#[cfg(test)]
mod tests {
    use asyncify::{Error, Options, Promise, Rejecter, Resolver, State};
    use futures::executor::block_on;
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            mpsc, Arc,
        },
        thread,
        time::{Duration, Instant},
    };

    /// A pending promise plus its settle handles, pulled out of the executor.
    fn deferred<T, E>() -> (Promise<T, E>, Resolver<T, E>, Rejecter<T, E>)
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let promise = Promise::new(move |resolve, reject| {
            tx.send((resolve, reject)).unwrap();
        });
        let (resolve, reject) = rx.recv().expect("executor never ran");
        (promise, resolve, reject)
    }

    #[test]
    fn test_promise_await() {
        let promise = Promise::<_, ()>::new(|resolve, _| {
            thread::sleep(Duration::from_millis(100));
            resolve.resolve("Hello, world!");
        });
        assert_eq!(promise.wait().unwrap(), "Hello, world!");
    }

    #[test]
    fn test_single_settlement() {
        let (promise, resolve, reject) = deferred::<&str, &str>();
        assert!(resolve.resolve("first"));
        assert!(!reject.reject("second"));
        assert!(!resolve.resolve("third"));
        assert_eq!(promise.state(), State::Fulfilled);
        assert_eq!(promise.wait().unwrap(), "first");

        let (promise, resolve, reject) = deferred::<&str, &str>();
        assert!(reject.reject("first"));
        assert!(!resolve.resolve("second"));
        assert_eq!(promise.state(), State::Rejected);
        assert_eq!(promise.wait().unwrap_err().into_rejected(), Some("first"));
    }

    #[test]
    fn test_immediate_registration() {
        let promise = Promise::<i32, ()>::resolved(7);

        let seen = Arc::new(AtomicUsize::new(0));
        let then_seen = seen.clone();
        let derived = promise.then(move |v| {
            then_seen.store(v as usize, Ordering::SeqCst);
            v
        });
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(derived.state(), State::Fulfilled);

        let ran = Arc::new(AtomicBool::new(false));
        let finally_ran = ran.clone();
        promise.finally(move || finally_ran.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));

        let caught = Promise::<i32, &str>::rejected("nope").catch(|_| -1);
        assert_eq!(caught.state(), State::Fulfilled);
        assert_eq!(caught.wait().unwrap(), -1);
    }

    #[test]
    fn test_deferred_registration() {
        let (promise, resolve, _reject) = deferred::<i32, ()>();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let derived = promise.then(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v * 2
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(derived.state(), State::Pending);

        resolve.resolve(21);
        assert_eq!(derived.wait().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chain_propagation() {
        let promise = Promise::<String, ()>::resolved("hello".to_owned()).then(|v| v + "!");
        assert_eq!(promise.wait().unwrap(), "hello!");

        let promise = Promise::<_, ()>::new(|resolve, _| {
            thread::spawn(move || resolve.resolve("hello"));
        });
        let chained = promise.then(|v| v.len()).then(|n| n * 10);
        assert_eq!(chained.wait().unwrap(), 50);
    }

    #[test]
    fn test_rejection_catch() {
        let then_calls = Arc::new(AtomicUsize::new(0));
        let catch_calls = Arc::new(AtomicUsize::new(0));
        let then_counter = then_calls.clone();
        let catch_counter = catch_calls.clone();

        let promise = Promise::<String, String>::new(|_, reject| {
            thread::sleep(Duration::from_millis(10));
            reject.reject("oops".to_owned());
        })
        .then(move |v| {
            then_counter.fetch_add(1, Ordering::SeqCst);
            v
        })
        .catch(move |err| {
            catch_counter.fetch_add(1, Ordering::SeqCst);
            format!("caught {}", err.into_rejected().unwrap_or_default())
        });

        assert_eq!(promise.wait().unwrap(), "caught oops");
        assert_eq!(then_calls.load(Ordering::SeqCst), 0);
        assert_eq!(catch_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejection_passes_through_then() {
        let promise = Promise::<i32, &str>::rejected("down").then(|v| v + 1).then(|v| v * 2);
        assert_eq!(promise.state(), State::Rejected);
        assert_eq!(promise.wait().unwrap_err().into_rejected(), Some("down"));
    }

    #[test]
    fn test_finally_always_runs() {
        for fulfil in [true, false] {
            let (promise, resolve, reject) = deferred::<i32, i32>();
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = calls.clone();
            let same = promise.finally(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            let observed = same.then(|v| v + 100).catch(|err| err.into_rejected().unwrap_or(0) - 100);

            if fulfil {
                resolve.resolve(1);
            } else {
                reject.reject(1);
            }

            assert_eq!(promise.wait().is_ok(), fulfil);
            assert_eq!(format!("{:?}", same), format!("{:?}", promise));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            let expected = if fulfil { 101 } else { -99 };
            assert_eq!(observed.wait().unwrap(), expected);
        }
    }

    #[test]
    fn test_concurrent_settlement_race() {
        const SETTLERS: usize = 16;
        let (promise, resolve, reject) = deferred::<usize, usize>();

        let settlements = Arc::new(AtomicUsize::new(0));
        let counter = settlements.clone();
        promise.finally(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let tasks: Vec<_> = (0..SETTLERS)
            .map(|i| {
                let resolve = resolve.clone();
                let reject = reject.clone();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        resolve.resolve(i)
                    } else {
                        reject.reject(i)
                    }
                })
            })
            .collect();

        let effective = tasks
            .into_iter()
            .map(|task| task.join().expect("A settler thread has panicked"))
            .filter(|settled| *settled)
            .count();

        assert_eq!(effective, 1);
        assert_eq!(settlements.load(Ordering::SeqCst), 1);
        assert_ne!(promise.state(), State::Pending);
    }

    #[test]
    fn test_registration_races_settlement() {
        for _ in 0..200 {
            let (promise, resolve, _reject) = deferred::<u8, ()>();
            let settler = thread::spawn(move || resolve.resolve(1));
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = calls.clone();
            let derived = promise.then(move |v| {
                counter.fetch_add(1, Ordering::SeqCst);
                v
            });
            settler.join().expect("The settler thread has panicked");
            assert_eq!(derived.wait().unwrap(), 1);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_wait_blocks_until_settlement() {
        let (promise, resolve, _reject) = deferred::<&str, ()>();
        let started = Instant::now();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            resolve.resolve("released");
        });

        assert_eq!(promise.wait().unwrap(), "released");
        assert!(started.elapsed() >= Duration::from_millis(100));
        releaser.join().expect("The releaser thread has panicked");

        let started = Instant::now();
        assert_eq!(promise.wait().unwrap(), "released");
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_many_waiters() {
        let (promise, resolve, _reject) = deferred::<i32, ()>();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let promise = promise.clone();
                thread::spawn(move || promise.wait())
            })
            .collect();
        resolve.resolve(3);
        for waiter in waiters {
            assert_eq!(waiter.join().expect("A waiter thread has panicked").unwrap(), 3);
        }
    }

    #[test]
    fn test_long_pending_chain_settles() {
        const LINKS: usize = 100_000;
        let (promise, resolve, _reject) = deferred::<usize, ()>();
        let mut tail = promise.clone();
        for _ in 0..LINKS {
            tail = tail.then(|v| v + 1);
        }
        assert!(tail.is_pending());
        let settler = thread::spawn(move || resolve.resolve(0));
        assert!(settler.join().expect("The settler thread has panicked"));
        assert_eq!(tail.wait().unwrap(), LINKS);
    }

    #[test]
    fn test_long_pending_chain_abandoned() {
        const LINKS: usize = 100_000;
        let (tx, rx) = mpsc::channel::<()>();
        let promise = Promise::<usize, ()>::new(move |_resolve, _reject| {
            rx.recv().unwrap();
        });
        let mut tail = promise.then(|v| v + 1);
        for _ in 1..LINKS {
            tail = tail.then(|v| v + 1);
        }
        let recovered = tail.catch(|err| match err {
            Error::Abandoned => 0,
            _ => 1,
        });
        drop(promise);
        tx.send(()).unwrap();
        assert!(matches!(tail.wait(), Err(Error::Abandoned)));
        assert_eq!(recovered.wait().unwrap(), 0);
    }

    #[test]
    fn test_long_rejected_chain_passes_through() {
        let (promise, _resolve, reject) = deferred::<u32, &str>();
        let mut tail = promise.clone();
        for _ in 0..100_000 {
            tail = tail.then(|v| v + 1);
        }
        reject.reject("down");
        assert_eq!(tail.wait().unwrap_err().into_rejected(), Some("down"));
    }

    #[test]
    fn test_executor_panic_rejects() {
        let promise = Promise::<i32, ()>::new(|_, _| panic!("executor exploded"));
        match promise.wait() {
            Err(Error::Panicked(message)) => assert_eq!(message, "executor exploded"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_continuation_panic_rejects_derived() {
        let derived = Promise::<i32, ()>::resolved(1)
            .then(|_| -> i32 { panic!("bad continuation") })
            .catch(|err| match err {
                Error::Panicked(_) => -1,
                _ => 0,
            });
        assert_eq!(derived.wait().unwrap(), -1);
    }

    #[test]
    fn test_executor_without_settlement_abandons() {
        let promise = Promise::<i32, ()>::new(|_resolve, _reject| {});
        assert!(matches!(promise.wait(), Err(Error::Abandoned)));
    }

    #[test]
    fn test_handles_outlive_executor() {
        let promise = Promise::<i32, ()>::new(|resolve, _reject| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                resolve.resolve(8);
            });
        });
        assert_eq!(promise.wait().unwrap(), 8);
    }

    #[test]
    fn test_with_options_names_thread() {
        let promise = Promise::<_, ()>::with_options(Options::new().name("asyncify-test"), |resolve, _| {
            resolve.resolve(thread::current().name().map(str::to_owned));
        });
        assert_eq!(promise.wait().unwrap().as_deref(), Some("asyncify-test"));
    }

    #[test]
    fn test_await_in_async_context() {
        let (promise, resolve, _reject) = deferred::<&str, ()>();
        let waiter = promise.clone();
        let task = thread::spawn(move || block_on(async move { waiter.await }));
        thread::sleep(Duration::from_millis(20));
        resolve.resolve("🍓");
        assert_eq!(task.join().expect("The task thread has panicked").unwrap(), "🍓");

        let derived = promise.then(|v| v.len());
        assert_eq!(block_on(derived).unwrap(), "🍓".len());
        assert!(matches!(
            block_on(Promise::<(), &str>::rejected("💥")),
            Err(Error::Rejected("💥"))
        ));
    }
}
