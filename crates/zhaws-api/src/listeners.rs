// ── Listener registry ──
//
// Keyed multi-listener registry used for gateway events on the client and
// for per-entity state listeners in the mirror. Emission snapshots the
// listener list first, so listeners may register or remove listeners
// (including themselves) while being called.

use std::fmt;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Error a listener may report. It is logged and otherwise ignored.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

pub type ListenerResult = Result<(), ListenerError>;

type Callback<P> = Arc<dyn Fn(&P) -> ListenerResult + Send + Sync>;

/// Handle returned by registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Registry of callbacks keyed by `K`, receiving payloads of type `P`.
pub struct EventDispatcher<K, P> {
    listeners: DashMap<K, Vec<(ListenerId, Callback<P>)>>,
    next_id: AtomicU64,
}

impl<K, P> Default for EventDispatcher<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> EventDispatcher<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` under `key`. Listeners for one key run in
    /// registration order.
    pub fn on<F>(&self, key: K, listener: F) -> ListenerId
    where
        F: Fn(&P) -> ListenerResult + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(key)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Call every listener registered under `key`.
    ///
    /// A listener that returns an error or panics is logged; the remaining
    /// listeners still run. Returns the number of listeners invoked.
    pub fn emit(&self, key: &K, payload: &P) -> usize {
        // Copy out before calling so no shard lock is held across callbacks.
        let snapshot: Vec<(ListenerId, Callback<P>)> = match self.listeners.get(key) {
            Some(entries) => entries.value().clone(),
            None => return 0,
        };
        for (id, callback) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(listener = %id, key = ?key, %error, "event listener failed");
                }
                Err(_) => {
                    tracing::error!(listener = %id, key = ?key, "event listener panicked");
                }
            }
        }
        snapshot.len()
    }

    pub fn listener_count(&self, key: &K) -> usize {
        self.listeners.get(key).map_or(0, |entries| entries.len())
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }
}

impl<K, P> fmt::Debug for EventDispatcher<K, P>
where
    K: Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("keys", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn listeners_run_in_registration_order() {
        let dispatcher = EventDispatcher::<&str, u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            dispatcher.on("k", move |n: &u32| {
                seen.lock().unwrap().push(format!("{tag}{n}"));
                Ok(())
            });
        }
        assert_eq!(dispatcher.emit(&"k", &1), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn failing_listener_does_not_stop_others() {
        let dispatcher = EventDispatcher::<&str, ()>::new();
        let hits = Arc::new(AtomicU64::new(0));
        dispatcher.on("k", |()| Err("boom".into()));
        dispatcher.on("k", |()| panic!("listener bug"));
        let counter = Arc::clone(&hits);
        dispatcher.on("k", move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        dispatcher.emit(&"k", &());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_can_remove_itself_while_emitting() {
        let dispatcher = Arc::new(EventDispatcher::<&str, ()>::new());
        let own_id = Arc::new(Mutex::new(None::<ListenerId>));
        let hits = Arc::new(AtomicU64::new(0));

        let (d, slot, counter) = (Arc::clone(&dispatcher), Arc::clone(&own_id), Arc::clone(&hits));
        let id = dispatcher.on("k", move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot.lock().unwrap() {
                d.off(id);
            }
            Ok(())
        });
        *own_id.lock().unwrap() = Some(id);

        dispatcher.emit(&"k", &());
        dispatcher.emit(&"k", &());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count(&"k"), 0);
        assert!(!dispatcher.off(id));
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let dispatcher = EventDispatcher::<u8, ()>::new();
        assert_eq!(dispatcher.emit(&1, &()), 0);
    }
}
