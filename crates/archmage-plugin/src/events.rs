//! Typed events and their emitters.
//!
//! An [`EventEmitter`] owns exactly one channel. Consumers receive an
//! [`Event`] handle from [`EventEmitter::event`] and subscribe through it;
//! every subscription returns a [`Disposable`] that removes that listener
//! and no other.
//!
//! Dispatch snapshots the listener list when `fire` starts. Listeners added
//! during a pass wait for the next `fire`; listeners removed during a pass
//! are skipped if they have not been reached yet. No lock is held while a
//! listener runs.
//!
//! Once disposed, an emitter is inert: `subscribe` returns an already
//! disposed handle and `fire` delivers to nobody.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::disposable::Disposable;
use crate::error::{panic_message, ApiError};

/// Listener count above which an emitter logs a possible leak.
pub const DEFAULT_LEAK_THRESHOLD: usize = 100;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Listener<T> {
    active: AtomicBool,
    callback: Callback<T>,
}

struct Subscription<T> {
    listener: Arc<Listener<T>>,
    handle: Disposable,
}

struct Channel<T> {
    name: String,
    leak_threshold: usize,
    disposed: AtomicBool,
    leak_warned: AtomicBool,
    subscriptions: Mutex<Vec<Subscription<T>>>,
}

impl<T: 'static> Channel<T> {
    fn lock(&self) -> MutexGuard<'_, Vec<Subscription<T>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn add(self: &Arc<Self>, callback: Callback<T>) -> Disposable {
        let listener = Arc::new(Listener {
            active: AtomicBool::new(true),
            callback,
        });

        let weak = Arc::downgrade(self);
        let registered = listener.clone();
        let handle = Disposable::new(move || {
            registered.active.store(false, Ordering::SeqCst);
            if let Some(channel) = weak.upgrade() {
                channel.remove(&registered);
            }
        });

        let count = {
            let mut subscriptions = self.lock();
            if self.disposed.load(Ordering::SeqCst) {
                drop(subscriptions);
                tracing::debug!(emitter = %self.name, "subscribe on disposed emitter ignored");
                return Disposable::none();
            }
            subscriptions.push(Subscription {
                listener,
                handle: handle.clone(),
            });
            subscriptions.len()
        };

        if count > self.leak_threshold && !self.leak_warned.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                emitter = %self.name,
                listeners = count,
                threshold = self.leak_threshold,
                "possible listener leak detected"
            );
        }

        handle
    }

    fn remove(&self, listener: &Arc<Listener<T>>) {
        let mut subscriptions = self.lock();
        subscriptions.retain(|s| !Arc::ptr_eq(&s.listener, listener));
        if subscriptions.len() <= self.leak_threshold {
            self.leak_warned.store(false, Ordering::SeqCst);
        }
    }
}

/// Result of one [`EventEmitter::fire`] call.
#[derive(Debug, Default)]
pub struct FireOutcome {
    /// Listeners that returned normally.
    pub delivered: usize,
    /// One [`ApiError::ListenerFailure`] per listener that panicked.
    pub failures: Vec<ApiError>,
}

impl FireOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Subscription side of an event channel.
pub struct Event<T> {
    channel: Weak<Channel<T>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("alive", &(self.channel.strong_count() > 0))
            .finish()
    }
}

impl<T: 'static> Event<T> {
    /// Subscribe `listener`. Disposing the returned handle removes it.
    pub fn subscribe<F>(&self, listener: F) -> Disposable
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        match self.channel.upgrade() {
            Some(channel) => channel.add(Box::new(listener)),
            None => {
                tracing::debug!("subscribe on dropped emitter ignored");
                Disposable::none()
            }
        }
    }

    /// Subscribe a listener that receives `context` as its receiver.
    pub fn subscribe_bound<C, F>(&self, context: Arc<C>, listener: F) -> Disposable
    where
        C: Send + Sync + 'static,
        F: Fn(&C, &T) + Send + Sync + 'static,
    {
        self.subscribe(move |data| listener(&context, data))
    }

    /// Subscribe and push the returned handle onto `collector`.
    pub fn subscribe_into<F>(&self, listener: F, collector: &mut Vec<Disposable>) -> Disposable
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handle = self.subscribe(listener);
        collector.push(handle.clone());
        handle
    }
}

/// Producer side of an event channel.
pub struct EventEmitter<T: 'static> {
    channel: Arc<Channel<T>>,
}

impl<T: 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventEmitter<T> {
    pub fn new() -> Self {
        Self::named("event")
    }

    /// An emitter whose name is attached to its log events.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_leak_threshold(name, DEFAULT_LEAK_THRESHOLD)
    }

    pub fn with_leak_threshold(name: impl Into<String>, leak_threshold: usize) -> Self {
        Self {
            channel: Arc::new(Channel {
                name: name.into(),
                leak_threshold,
                disposed: AtomicBool::new(false),
                leak_warned: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The event listeners subscribe to.
    pub fn event(&self) -> Event<T> {
        Event {
            channel: Arc::downgrade(&self.channel),
        }
    }

    /// Notify every current subscriber, in subscription order.
    ///
    /// A panicking listener is logged and recorded in the outcome; the
    /// remaining listeners still run.
    pub fn fire(&self, data: &T) -> FireOutcome {
        let mut outcome = FireOutcome::default();
        if self.channel.disposed.load(Ordering::SeqCst) {
            tracing::debug!(emitter = %self.channel.name, "fire on disposed emitter ignored");
            return outcome;
        }

        let snapshot: Vec<Arc<Listener<T>>> = self
            .channel
            .lock()
            .iter()
            .map(|s| s.listener.clone())
            .collect();

        for listener in snapshot {
            if !listener.active.load(Ordering::SeqCst) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (listener.callback)(data))) {
                Ok(()) => outcome.delivered += 1,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        emitter = %self.channel.name,
                        "event listener failed: {message}"
                    );
                    outcome.failures.push(ApiError::ListenerFailure {
                        emitter: self.channel.name.clone(),
                        message,
                    });
                }
            }
        }

        outcome
    }

    pub fn listener_count(&self) -> usize {
        self.channel.lock().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.channel.disposed.load(Ordering::SeqCst)
    }

    /// Release every subscription and make the event inert.
    pub fn dispose(&self) {
        if self.channel.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained = std::mem::take(&mut *self.channel.lock());
        tracing::debug!(
            emitter = %self.channel.name,
            subscriptions = drained.len(),
            "disposing emitter"
        );
        for subscription in drained {
            subscription.handle.dispose();
        }
    }
}

impl<T: 'static> Drop for EventEmitter<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: 'static> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("name", &self.channel.name)
            .field("listeners", &self.listener_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_fire_invokes_in_subscription_order() {
        let emitter = EventEmitter::<u32>::new();
        let seen = recorder();
        for name in ["l1", "l2", "l3"] {
            let seen = seen.clone();
            emitter
                .event()
                .subscribe(move |v| seen.lock().unwrap().push(format!("{name}:{v}")));
        }

        let outcome = emitter.fire(&7);
        assert_eq!(outcome.delivered, 3);
        assert!(outcome.is_clean());
        assert_eq!(*seen.lock().unwrap(), vec!["l1:7", "l2:7", "l3:7"]);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let emitter = EventEmitter::<String>::named("isolation");
        let seen = recorder();
        emitter.event().subscribe(|_| panic!("listener one broke"));
        for name in ["l2", "l3"] {
            let seen = seen.clone();
            emitter
                .event()
                .subscribe(move |v: &String| seen.lock().unwrap().push(format!("{name}:{v}")));
        }

        let outcome = emitter.fire(&"x".to_string());
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            ApiError::ListenerFailure { emitter, message }
                if emitter == "isolation" && message == "listener one broke"
        ));
        assert_eq!(*seen.lock().unwrap(), vec!["l2:x", "l3:x"]);
    }

    #[test]
    fn test_dispose_removes_only_that_listener() {
        let emitter = EventEmitter::<u32>::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let (ca, cb) = (a.clone(), b.clone());
        let sub_a = emitter.event().subscribe(move |_| {
            ca.fetch_add(1, Ordering::SeqCst);
        });
        let _sub_b = emitter.event().subscribe(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
        });

        emitter.fire(&1);
        sub_a.dispose();
        sub_a.dispose();
        emitter.fire(&2);

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.listener_count(), 1);
    }

    #[test]
    fn test_subscribe_during_fire_waits_for_next_pass() {
        let emitter = EventEmitter::<u32>::new();
        let event = emitter.event();
        let late_calls = Arc::new(AtomicUsize::new(0));
        let added = Arc::new(AtomicBool::new(false));

        let (ev, late, flag) = (event.clone(), late_calls.clone(), added.clone());
        event.subscribe(move |_| {
            if !flag.swap(true, Ordering::SeqCst) {
                let late = late.clone();
                ev.subscribe(move |_| {
                    late.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        emitter.fire(&1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count(), 2);

        emitter.fire(&2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_during_fire_skips_unreached_listener() {
        let emitter = EventEmitter::<u32>::new();
        let later: Arc<Mutex<Option<Disposable>>> = Arc::new(Mutex::new(None));
        let third_calls = Arc::new(AtomicUsize::new(0));

        let slot = later.clone();
        emitter.event().subscribe(move |_| {
            if let Some(handle) = slot.lock().unwrap().as_ref() {
                handle.dispose();
            }
        });
        let calls = third_calls.clone();
        let handle = emitter.event().subscribe(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        *later.lock().unwrap() = Some(handle);

        let outcome = emitter.fire(&1);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count(), 1);
    }

    #[test]
    fn test_dispose_emitter_releases_subscriptions() {
        let emitter = EventEmitter::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let sub = emitter.event().subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        emitter.dispose();
        assert!(emitter.is_disposed());
        assert!(sub.is_disposed());
        assert_eq!(emitter.listener_count(), 0);

        let outcome = emitter.fire(&1);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let late = emitter.event().subscribe(|_| {});
        assert!(late.is_disposed());
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_event_outliving_emitter_is_inert() {
        let event = {
            let emitter = EventEmitter::<u32>::new();
            emitter.event()
        };
        let sub = event.subscribe(|_| {});
        assert!(sub.is_disposed());
    }

    #[test]
    fn test_subscribe_bound_passes_context() {
        struct Totals {
            sum: AtomicUsize,
        }
        let emitter = EventEmitter::<usize>::new();
        let totals = Arc::new(Totals {
            sum: AtomicUsize::new(0),
        });
        emitter
            .event()
            .subscribe_bound(totals.clone(), |this: &Totals, v: &usize| {
                this.sum.fetch_add(*v, Ordering::SeqCst);
            });

        emitter.fire(&4);
        emitter.fire(&5);
        assert_eq!(totals.sum.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_subscribe_into_collector() {
        let emitter = EventEmitter::<u32>::new();
        let mut collector = Vec::new();
        let handle = emitter.event().subscribe_into(|_| {}, &mut collector);
        emitter.event().subscribe_into(|_| {}, &mut collector);
        assert_eq!(collector.len(), 2);
        assert_eq!(emitter.listener_count(), 2);

        Disposable::from_all(collector).dispose();
        assert!(handle.is_disposed());
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_leak_threshold_does_not_block_subscriptions() {
        let emitter = EventEmitter::<u32>::with_leak_threshold("leaky", 2);
        let handles: Vec<Disposable> = (0..4).map(|_| emitter.event().subscribe(|_| {})).collect();
        assert_eq!(emitter.listener_count(), 4);
        assert!(emitter.channel.leak_warned.load(Ordering::SeqCst));

        for handle in &handles[..2] {
            handle.dispose();
        }
        assert!(!emitter.channel.leak_warned.load(Ordering::SeqCst));
        assert_eq!(emitter.fire(&0).delivered, 2);
    }
}
