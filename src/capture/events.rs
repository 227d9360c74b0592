use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use crate::models::Color;

/// Colors computed for one processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    /// Most frequent color over the whole frame
    pub predominant: Color,
    /// One color per zone in layout order, empty if zone capture is off or unavailable
    pub zone_colors: Vec<Color>,
}

/// Subscriber callback, invoked from the capture task
pub type CaptureCallback = Arc<dyn Fn(&Arc<CaptureResult>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered result callbacks, notified in registration order
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, CaptureCallback)>>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}

impl Subscribers {
    pub fn subscribe(&self, callback: impl Fn(&Arc<CaptureResult>) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` if the subscription was already removed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.lock();
        let before = callbacks.len();
        callbacks.retain(|(other, _)| *other != id);
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback with the given result
    ///
    /// Callbacks run outside of the registry lock, so they may subscribe or unsubscribe.
    /// Changes apply starting with the next dispatch.
    pub fn dispatch(&self, result: &Arc<CaptureResult>) {
        let snapshot: Vec<CaptureCallback> = self.lock().iter().map(|(_, cb)| cb.clone()).collect();

        for callback in snapshot {
            callback(result);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, CaptureCallback)>> {
        // A panicking callback never holds the lock, the list is always consistent
        self.callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::opaque;

    fn result() -> Arc<CaptureResult> {
        Arc::new(CaptureResult {
            predominant: opaque(1, 2, 3),
            zone_colors: vec![opaque(4, 5, 6)],
        })
    }

    #[test]
    fn dispatch_in_registration_order() {
        let subscribers = Subscribers::default();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let calls = calls.clone();
            subscribers.subscribe(move |_| calls.lock().unwrap().push(i));
        }

        subscribers.dispatch(&result());
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn every_subscriber_sees_the_same_result() {
        let subscribers = Subscribers::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = seen.clone();
            subscribers.subscribe(move |r| seen.lock().unwrap().push(r.clone()));
        }

        let result = result();
        subscribers.dispatch(&result);

        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|r| Arc::ptr_eq(r, &result)));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let subscribers = Subscribers::default();
        let calls = Arc::new(AtomicU64::new(0));

        let id = {
            let calls = calls.clone();
            subscribers.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        subscribers.dispatch(&result());
        assert!(subscribers.unsubscribe(id));
        assert!(!subscribers.unsubscribe(id));
        subscribers.dispatch(&result());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(subscribers.is_empty());
    }

    #[test]
    fn callback_can_unsubscribe_itself() {
        let subscribers = Arc::new(Subscribers::default());
        let calls = Arc::new(AtomicU64::new(0));
        let id = Arc::new(Mutex::new(None));

        let registered = {
            let subscribers = subscribers.clone();
            let calls = calls.clone();
            let id = id.clone();

            subscribers.clone().subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *id.lock().unwrap() {
                    subscribers.unsubscribe(id);
                }
            })
        };
        *id.lock().unwrap() = Some(registered);

        subscribers.dispatch(&result());
        subscribers.dispatch(&result());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
