//! Keyed polling fallback for jobs whose push delivery is not
//! guaranteed.
//!
//! One spawned task per key calls the poll function, checks the stop
//! predicate, and sleeps with a monotonically non-decreasing, bounded
//! delay between attempts. Transient poll errors never terminate a
//! loop; they back off and retry, bounding retry storms. There is no total
//! duration bound: a job that never terminates keeps polling until the
//! scope changes or the user cancels.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atelier_core::{next_delay, PollConfig};
use tokio_util::sync::CancellationToken;

type Tasks = Arc<Mutex<HashMap<String, PollTask>>>;

/// Bookkeeping for one active poll loop.
struct PollTask {
    /// Distinguishes this loop from a replacement under the same key.
    id: u64,
    cancel: CancellationToken,
    #[allow(dead_code)]
    handle: tokio::task::JoinHandle<()>,
}

/// Owner of all poll loops. One instance per engine, shared via `Arc`.
pub struct PollLoop {
    tasks: Tasks,
    next_task_id: AtomicU64,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl PollLoop {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_task_id: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Start (or replace) the poll loop for `key`.
    ///
    /// The first poll runs immediately; subsequent polls are separated
    /// by `delay = min(max_delay, delay + step)`. The loop terminates
    /// when `stop_when` returns true, when [`stop`](PollLoop::stop) is
    /// called, or at shutdown. At most one loop is active per key: an
    /// existing loop for the same key is cancelled first.
    pub fn start<S, E, Fut, P, W>(&self, key: &str, config: PollConfig, mut poll_fn: P, stop_when: W)
    where
        S: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        Fut: Future<Output = Result<S, E>> + Send + 'static,
        P: FnMut() -> Fut + Send + 'static,
        W: Fn(&S) -> bool + Send + 'static,
    {
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst) + 1;
        let task_cancel = self.cancel.child_token();
        let loop_cancel = task_cancel.clone();
        let tasks = Arc::clone(&self.tasks);
        let key_owned = key.to_string();

        // Hold the map lock across spawn + insert so the task's own
        // cleanup (which locks the map) cannot run before registration.
        let mut map = lock(&self.tasks);
        let handle = tokio::spawn(async move {
            let mut delay = config.initial_delay;

            loop {
                if loop_cancel.is_cancelled() {
                    break;
                }

                match poll_fn().await {
                    Ok(status) => {
                        if stop_when(&status) {
                            tracing::debug!(key = %key_owned, "Poll loop reached stop condition");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(key = %key_owned, error = %e, "Poll attempt failed, backing off");
                    }
                }

                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                delay = next_delay(delay, &config);
            }

            // Remove our own entry unless a newer loop replaced it.
            let mut map = lock(&tasks);
            if map.get(&key_owned).map(|t| t.id) == Some(id) {
                map.remove(&key_owned);
            }
        });

        let task = PollTask {
            id,
            cancel: task_cancel,
            handle,
        };
        if let Some(previous) = map.insert(key.to_string(), task) {
            previous.cancel.cancel();
        }
    }

    /// Cancel the loop for `key`. Idempotent; safe to call from within a
    /// poll continuation.
    pub fn stop(&self, key: &str) {
        let removed = lock(&self.tasks).remove(key);
        if let Some(task) = removed {
            task.cancel.cancel();
            tracing::debug!(key, "Poll loop stopped");
        }
    }

    /// Cancel every active loop. Used on scope teardown.
    pub fn stop_all(&self) {
        let drained: Vec<PollTask> = {
            let mut map = lock(&self.tasks);
            map.drain().map(|(_, task)| task).collect()
        };
        for task in &drained {
            task.cancel.cancel();
        }
    }

    /// Whether a loop is currently registered for `key`.
    pub fn active(&self, key: &str) -> bool {
        lock(&self.tasks).contains_key(key)
    }

    /// Cancel the master token and every loop. Called once at engine
    /// shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.stop_all();
    }
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(tasks: &Tasks) -> MutexGuard<'_, HashMap<String, PollTask>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn quick_config() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            step: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn loop_stops_when_predicate_is_met() {
        let polls = PollLoop::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let attempts_clone = Arc::clone(&attempts);
        polls.start(
            "job",
            quick_config(),
            move || {
                let attempts = Arc::clone(&attempts_clone);
                async move { Ok::<usize, Infallible>(attempts.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |count| *count >= 3,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(!polls.active("job"));
    }

    #[tokio::test]
    async fn transient_errors_do_not_terminate_the_loop() {
        let polls = PollLoop::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let attempts_clone = Arc::clone(&attempts);
        polls.start(
            "flaky",
            quick_config(),
            move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    // The first two polls fail; the loop must keep going.
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= 2 {
                        Err("connection reset")
                    } else {
                        Ok(n)
                    }
                }
            },
            |count| *count >= 4,
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(!polls.active("flaky"));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let polls = PollLoop::new();
        polls.start(
            "endless",
            quick_config(),
            || async { Ok::<(), Infallible>(()) },
            |_| false,
        );
        assert!(polls.active("endless"));

        polls.stop("endless");
        polls.stop("endless"); // second stop is a no-op
        assert!(!polls.active("endless"));
    }

    #[tokio::test]
    async fn starting_the_same_key_replaces_the_previous_loop() {
        let polls = PollLoop::new();
        let first_attempts = Arc::new(AtomicUsize::new(0));
        let second_attempts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first_attempts);
        polls.start(
            "job",
            quick_config(),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), Infallible>(())
                }
            },
            |_| false,
        );

        let counter = Arc::clone(&second_attempts);
        polls.start(
            "job",
            quick_config(),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), Infallible>(())
                }
            },
            |_| false,
        );

        let stale = first_attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The replaced loop made no further attempts; the new one did.
        assert!(first_attempts.load(Ordering::SeqCst) <= stale + 1);
        assert!(second_attempts.load(Ordering::SeqCst) >= 2);
        polls.stop("job");
    }

    #[tokio::test]
    async fn stop_all_cancels_every_loop() {
        let polls = PollLoop::new();
        for key in ["a", "b", "c"] {
            polls.start(
                key,
                quick_config(),
                || async { Ok::<(), Infallible>(()) },
                |_| false,
            );
        }

        polls.stop_all();
        assert!(!polls.active("a"));
        assert!(!polls.active("b"));
        assert!(!polls.active("c"));
    }

    #[tokio::test]
    async fn delays_between_polls_are_monotonic_and_bounded() {
        let polls = PollLoop::new();
        let instants = Arc::new(Mutex::new(Vec::new()));

        let instants_clone = Arc::clone(&instants);
        polls.start(
            "timing",
            quick_config(),
            move || {
                let instants = Arc::clone(&instants_clone);
                async move {
                    instants.lock().unwrap().push(tokio::time::Instant::now());
                    Ok::<(), Infallible>(())
                }
            },
            |_| false,
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        polls.stop("timing");

        let instants = instants.lock().unwrap().clone();
        assert!(instants.len() >= 4);

        let config = quick_config();
        let mut previous_gap = Duration::ZERO;
        for pair in instants.windows(2) {
            let gap = pair[1] - pair[0];
            // Monotonically non-decreasing (with scheduling slack) and
            // never far beyond the cap.
            assert!(gap + Duration::from_millis(5) >= previous_gap);
            assert!(gap <= config.max_delay + Duration::from_millis(50));
            previous_gap = gap;
        }
    }
}
