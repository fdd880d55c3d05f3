//! Per-key delayed callbacks with reset-on-retouch.
//!
//! `add` schedules a callback to run after the delay; touching the same key
//! again before it fires resets the timer and replaces the callback, so a
//! burst of events collapses into one invocation of the newest callback.
//! The callback is taken out of the map and the lock released before it
//! runs, so a callback may call back into the debouncer freely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Pending {
    generation: u64,
    callback: Callback,
    timer: JoinHandle<()>,
}

struct Inner {
    next_generation: u64,
    pending: HashMap<String, Pending>,
}

#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: Arc::new(Mutex::new(Inner {
                next_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    /// Schedule `callback` for `key`, superseding any pending one.
    pub fn add(&self, key: impl Into<String>, callback: impl FnOnce() + Send + 'static) {
        let key = key.into();
        let mut inner = self.inner.lock().expect("debouncer lock poisoned");

        let generation = inner.next_generation;
        inner.next_generation += 1;

        if let Some(previous) = inner.pending.remove(&key) {
            previous.timer.abort();
            trace!(key, "debounce timer reset");
        }

        let timer = {
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let callback = {
                    let mut inner = inner.lock().expect("debouncer lock poisoned");
                    match inner.pending.get(&key) {
                        // A newer add superseded this timer after the sleep
                        // already completed; let the newer one fire.
                        Some(p) if p.generation != generation => return,
                        Some(_) => inner.pending.remove(&key).map(|p| p.callback),
                        None => None,
                    }
                };
                if let Some(callback) = callback {
                    callback();
                }
            })
        };

        inner.pending.insert(
            key,
            Pending {
                generation,
                callback: Box::new(callback),
                timer,
            },
        );
    }

    /// Drop any pending callback for `key`.
    pub fn cancel(&self, key: &str) {
        let mut inner = self.inner.lock().expect("debouncer lock poisoned");
        if let Some(pending) = inner.pending.remove(key) {
            pending.timer.abort();
        }
    }

    /// Cancel everything.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("debouncer lock poisoned");
        for (_, pending) in inner.pending.drain() {
            pending.timer.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().expect("debouncer lock poisoned").pending.len()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_millis(200);

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let debouncer = Debouncer::new(DELAY);
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        debouncer.add("a", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_retouches_collapse_to_last_callback() {
        let debouncer = Debouncer::new(DELAY);
        let winner = Arc::new(AtomicUsize::new(0));

        for i in 1..=5usize {
            let w = Arc::clone(&winner);
            debouncer.add("a", move || {
                w.store(i, Ordering::SeqCst);
            });
            tokio::time::sleep(DELAY / 4).await;
        }

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(winner.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_does_not_fire_before_delay_elapses() {
        let debouncer = Debouncer::new(DELAY);
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        debouncer.add("a", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(DELAY / 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(DELAY).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let debouncer = Debouncer::new(DELAY);
        let count = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "c"] {
            let c = Arc::clone(&count);
            debouncer.add(key, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_callback() {
        let debouncer = Debouncer::new(DELAY);
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        debouncer.add("a", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel("a");

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_everything() {
        let debouncer = Debouncer::new(DELAY);
        let count = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b"] {
            let c = Arc::clone(&count);
            debouncer.add(key, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        debouncer.stop();

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(debouncer.pending_count(), 0);
    }
}
