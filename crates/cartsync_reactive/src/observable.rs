//! Publish/subscribe cell with a current value.
//!
//! An [`Observable<T>`] holds a value that can be read synchronously at any
//! time and broadcasts every update to its subscribers.
//!
//! # Delivery Rules
//!
//! - A new subscriber immediately receives the current value
//! - Handlers run in subscription order
//! - `publish` snapshots the handler list before invoking anyone; handlers that
//!   subscribe or unsubscribe during delivery affect the *next* publish only
//! - Handlers never run while the internal lock is held, so they may freely
//!   re-enter the observable
//! - Deliveries are serialized in the order values were stored. A value
//!   stored while another delivery is in progress (from a handler, or from
//!   another thread) is queued and handed out by the delivering thread once
//!   the current delivery finishes, so the last value a subscriber sees is
//!   always the current one
//! - A panicking handler is logged and skipped; later handlers still run
//!
//! # Example
//!
//! ```
//! use cartsync_reactive::Observable;
//! use std::sync::{Arc, Mutex};
//!
//! let cart_size = Observable::new(0_u32);
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = Arc::clone(&seen);
//! let sub = cart_size
//!     .subscribe(move |n: &u32| sink.lock().unwrap().push(*n))
//!     .expect("observable is live");
//!
//! cart_size.publish(2);
//! cart_size.unsubscribe(&sub);
//! cart_size.publish(5);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![0, 2]);
//! assert_eq!(cart_size.get(), 5);
//! ```

use core::fmt;
use core::panic::AssertUnwindSafe;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Shared handler type stored by an [`Observable`].
type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Errors returned by [`Observable`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservableError {
    /// The observable was disposed and no longer accepts subscribers.
    #[error("observable has been disposed")]
    Disposed,
}

/// Handle identifying one registration on an [`Observable`].
///
/// Pass it to [`Observable::unsubscribe`] to stop receiving updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
}

struct HandlerEntry<T> {
    id: u64,
    handler: Handler<T>,
}

/// A value paired with the handlers it must reach.
struct Delivery<T> {
    value: T,
    handlers: Vec<Handler<T>>,
}

struct State<T> {
    value: T,
    handlers: Vec<HandlerEntry<T>>,
    next_id: u64,
    disposed: bool,
    /// Deliveries waiting for the active deliverer.
    queue: VecDeque<Delivery<T>>,
    /// Whether some thread is currently draining `queue`.
    delivering: bool,
}

/// A current value plus the handlers observing it.
///
/// `Observable` is a cheap handle: clones share the same value and subscriber
/// list. It is `Send + Sync` whenever `T` is.
pub struct Observable<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an observable holding `value` with no subscribers.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                value,
                handlers: Vec::new(),
                next_id: 0,
                disposed: false,
                queue: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// Returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.state.lock().value.clone()
    }

    /// Registers `handler` and delivers the current value to it.
    ///
    /// Delivery is immediate unless another delivery is in progress, in which
    /// case the current value is queued behind it.
    ///
    /// # Errors
    ///
    /// Returns [`ObservableError::Disposed`] if [`dispose`](Self::dispose) was called.
    pub fn subscribe<F>(&self, handler: F) -> Result<Subscription, ObservableError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler: Handler<T> = Arc::new(handler);
        let mut state = self.state.lock();
        if state.disposed {
            return Err(ObservableError::Disposed);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.handlers.push(HandlerEntry {
            id,
            handler: Arc::clone(&handler),
        });
        let delivery = Delivery {
            value: state.value.clone(),
            handlers: vec![handler],
        };

        self.dispatch(state, delivery);
        Ok(Subscription { id })
    }

    /// Removes a registration. Returns `true` if a handler was removed.
    ///
    /// Unsubscribing twice, or after [`dispose`](Self::dispose), is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut state = self.state.lock();
        let before = state.handlers.len();
        state.handlers.retain(|entry| entry.id != subscription.id);
        state.handlers.len() != before
    }

    /// Replaces the current value and notifies every registered handler.
    ///
    /// If another delivery is in progress the notification is queued and
    /// handed out by that delivery's thread, after the values stored before it.
    pub fn publish(&self, value: T) {
        let mut state = self.state.lock();
        state.value = value.clone();
        let delivery = Delivery {
            handlers: snapshot(&state.handlers),
            value,
        };
        self.dispatch(state, delivery);
    }

    /// Atomically inspects the current value and optionally replaces it.
    ///
    /// `f` runs under the lock. Returning `Some(next)` stores and broadcasts
    /// `next`; returning `None` leaves the value untouched and notifies nobody.
    /// Returns whether a new value was published.
    ///
    /// `f` must not call back into this observable.
    pub fn update_if<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> Option<T>,
    {
        let mut state = self.state.lock();
        let Some(next) = f(&state.value) else {
            return false;
        };
        state.value = next.clone();
        let delivery = Delivery {
            handlers: snapshot(&state.handlers),
            value: next,
        };
        self.dispatch(state, delivery);
        true
    }

    /// Drops every handler. Subsequent [`subscribe`](Self::subscribe) calls fail.
    ///
    /// The current value remains readable and [`publish`](Self::publish) keeps
    /// updating it, but nobody is notified.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.disposed = true;
        state.handlers.clear();
        state.queue.clear();
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Returns the number of live registrations.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().handlers.len()
    }

    /// Queues `delivery` while still holding the lock that stored its value,
    /// then drains the queue unless another call is already draining it.
    fn dispatch(&self, mut state: MutexGuard<'_, State<T>>, delivery: Delivery<T>) {
        state.queue.push_back(delivery);
        if state.delivering {
            return;
        }
        state.delivering = true;
        drop(state);

        loop {
            let next = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            deliver(&next.handlers, &next.value);
        }
    }
}

impl<T> Default for Observable<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Observable")
            .field("value", &state.value)
            .field("subscribers", &state.handlers.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

fn snapshot<T>(entries: &[HandlerEntry<T>]) -> Vec<Handler<T>> {
    entries.iter().map(|entry| Arc::clone(&entry.handler)).collect()
}

fn deliver<T>(handlers: &[Handler<T>], value: &T) {
    for (index, handler) in handlers.iter().enumerate() {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(value)));
        if outcome.is_err() {
            tracing::warn!(handler = index, "observable handler panicked; continuing delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |value: &T| sink.lock().push(value.clone()))
    }

    #[test]
    fn late_subscriber_receives_current_value() {
        let obs = Observable::new("a".to_owned());
        obs.publish("b".to_owned());

        let (log, handler) = recorder::<String>();
        obs.subscribe(handler).expect("subscribe should succeed");

        assert_eq!(*log.lock(), vec!["b".to_owned()]);
    }

    #[test]
    fn publish_notifies_in_subscription_order() {
        let obs = Observable::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            obs.subscribe(move |v: &i32| {
                if *v == 1 {
                    order.lock().push(name);
                }
            })
            .expect("subscribe should succeed");
        }

        obs.publish(1);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let obs = Observable::new(0);
        let (log, handler) = recorder::<i32>();
        let sub = obs.subscribe(handler).expect("subscribe should succeed");

        obs.publish(1);
        assert!(obs.unsubscribe(&sub));
        assert!(!obs.unsubscribe(&sub), "second unsubscribe is a no-op");
        obs.publish(2);

        assert_eq!(*log.lock(), vec![0, 1]);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_during_publish_applies_to_next_publish() {
        let obs = Observable::new(0);
        let late_calls = Arc::new(AtomicUsize::new(0));

        let obs_clone = obs.clone();
        let late = Arc::clone(&late_calls);
        obs.subscribe(move |v: &i32| {
            if *v == 1 {
                let late = Arc::clone(&late);
                obs_clone
                    .subscribe(move |_: &i32| {
                        late.fetch_add(1, Ordering::SeqCst);
                    })
                    .expect("nested subscribe should succeed");
            }
        })
        .expect("subscribe should succeed");

        obs.publish(1);
        // Only the immediate delivery on subscribe, not the in-flight publish.
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);

        obs.publish(2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_during_publish_applies_to_next_publish() {
        let obs = Observable::new(0);
        let victim_calls = Arc::new(AtomicUsize::new(0));
        let victim_sub = Arc::new(Mutex::new(None::<Subscription>));

        let obs_clone = obs.clone();
        let victim_ref = Arc::clone(&victim_sub);
        obs.subscribe(move |v: &i32| {
            if *v == 1
                && let Some(sub) = *victim_ref.lock()
            {
                obs_clone.unsubscribe(&sub);
            }
        })
        .expect("subscribe should succeed");

        let calls = Arc::clone(&victim_calls);
        let sub = obs
            .subscribe(move |_: &i32| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .expect("subscribe should succeed");
        *victim_sub.lock() = Some(sub);

        obs.publish(1);
        assert_eq!(victim_calls.load(Ordering::SeqCst), 2, "initial + snapshot delivery");

        obs.publish(2);
        assert_eq!(victim_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispose_rejects_new_subscribers() {
        let obs = Observable::new(1);
        let (log, handler) = recorder::<i32>();
        obs.subscribe(handler).expect("subscribe should succeed");

        obs.dispose();
        assert!(obs.is_disposed());
        assert_eq!(obs.subscribe(|_: &i32| {}), Err(ObservableError::Disposed));

        obs.publish(9);
        assert_eq!(obs.get(), 9);
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let obs = Observable::new(0);
        obs.subscribe(|v: &i32| {
            if *v > 0 {
                panic!("handler failure");
            }
        })
        .expect("subscribe should succeed");
        let (log, handler) = recorder::<i32>();
        obs.subscribe(handler).expect("subscribe should succeed");

        obs.publish(3);
        assert_eq!(*log.lock(), vec![0, 3]);
    }

    #[test]
    fn update_if_is_conditional() {
        let obs = Observable::new(1);
        let (log, handler) = recorder::<i32>();
        obs.subscribe(handler).expect("subscribe should succeed");

        assert!(!obs.update_if(|v| (*v > 5).then_some(0)));
        assert!(obs.update_if(|v| Some(v + 1)));

        assert_eq!(obs.get(), 2);
        assert_eq!(*log.lock(), vec![1, 2]);
    }
}
