// ── Mirror subscriptions ──
//
// `MirrorStream` follows a whole mirrored collection (devices or groups).
// `EntityStateStream` follows one entity's state through the same
// per-entity listeners that back `MirrorStore::on_entity_state`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use zhaws_api::ListenerError;
use zhaws_api::model::{EntityRef, EntityState};

use crate::store::MirrorStore;

/// Key-ordered snapshots of one mirrored collection.
pub struct MirrorStream<T> {
    receiver: watch::Receiver<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> MirrorStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<Arc<T>>>>) -> Self {
        Self { receiver }
    }

    /// The collection as the mirror holds it now.
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next mutation. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<T>>>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until `done` holds for the collection, checking the current
    /// snapshot first.
    pub async fn wait_until(
        &mut self,
        mut done: impl FnMut(&[Arc<T>]) -> bool,
    ) -> Option<Arc<Vec<Arc<T>>>> {
        self.receiver
            .wait_for(|items| done(items))
            .await
            .ok()
            .map(|items| items.clone())
    }

    /// Current snapshot first, then one per mutation.
    pub fn into_stream(self) -> WatchStream<Arc<Vec<Arc<T>>>> {
        WatchStream::new(self.receiver)
    }
}

/// States applied to one entity, in the order the mirror applied them.
///
/// Only actual changes are yielded. The listener feeding the stream is
/// removed when the stream is dropped.
pub struct EntityStateStream {
    entity: EntityRef,
    store: Arc<MirrorStore>,
    listener: zhaws_api::ListenerId,
    receiver: mpsc::UnboundedReceiver<EntityState>,
}

impl EntityStateStream {
    pub(crate) fn new(store: Arc<MirrorStore>, entity: EntityRef) -> Self {
        let (tx, receiver) = mpsc::unbounded_channel();
        let listener = store.on_entity_state(entity.clone(), move |event| {
            tx.send(event.state.clone())
                .map_err(|_| ListenerError::from("entity state stream dropped"))
        });
        Self {
            entity,
            store,
            listener,
            receiver,
        }
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Mirrored state right now; `None` while the entity is unknown.
    pub fn current(&self) -> Option<EntityState> {
        self.store.entity(&self.entity).map(|info| info.state)
    }

    /// Next applied state.
    pub async fn next_state(&mut self) -> Option<EntityState> {
        self.receiver.recv().await
    }
}

impl Stream for EntityStateStream {
    type Item = EntityState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EntityStateStream {
    fn drop(&mut self) {
        self.store.off_entity_state(self.listener);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use serde_json::{Value, json};
    use zhaws_api::Event;
    use zhaws_api::model::Ieee;

    const DEV: &str = "aa:bb:cc:dd:ee:ff:00:02";

    fn switch_state(on: bool) -> Value {
        json!({"class_name": "Switch", "state": on, "available": true})
    }

    fn store_with_switch() -> Arc<MirrorStore> {
        let store = Arc::new(MirrorStore::new());
        let devices = serde_json::from_value(json!({
            DEV: {
                "ieee": DEV,
                "nwk": "0x2222",
                "available": true,
                "on_network": true,
                "entities": {"switch,switch_1": {
                    "platform": "switch",
                    "unique_id": "switch_1",
                    "class_name": "Switch",
                    "device_ieee": DEV,
                    "endpoint_id": 1,
                    "state": switch_state(false),
                }},
            }
        }))
        .unwrap();
        store.merge_devices(devices);
        store
    }

    fn switch_ref() -> EntityRef {
        EntityRef::Device {
            ieee: DEV.parse::<Ieee>().unwrap(),
            unique_id: "switch_1".into(),
        }
    }

    fn turned(on: bool) -> Event {
        Event::decode(
            serde_json::from_value(json!({
                "event_type": "entity",
                "event": "state_changed",
                "platform": "switch",
                "unique_id": "switch_1",
                "device_ieee": DEV,
                "endpoint_id": 1,
                "state": switch_state(on),
            }))
            .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn entity_stream_yields_applied_changes_only() {
        let store = store_with_switch();
        let mut states = EntityStateStream::new(Arc::clone(&store), switch_ref());
        assert_eq!(states.current().unwrap().is_on(), Some(false));

        store.apply_event(&turned(true));
        store.apply_event(&turned(true));
        store.apply_event(&turned(false));

        assert_eq!(states.next_state().await.unwrap().is_on(), Some(true));
        assert_eq!(states.next_state().await.unwrap().is_on(), Some(false));
        assert!(states.receiver.try_recv().is_err());
    }

    #[test]
    fn dropping_the_stream_removes_its_listener() {
        let store = store_with_switch();
        let states = EntityStateStream::new(Arc::clone(&store), switch_ref());
        let listener = states.listener;
        drop(states);
        assert!(!store.off_entity_state(listener));
    }

    #[tokio::test]
    async fn collection_wait_sees_current_snapshot() {
        let store = store_with_switch();
        let mut devices = store.subscribe_devices();
        let snapshot = devices.wait_until(|items| items.len() == 1).await.unwrap();
        assert_eq!(snapshot.len(), devices.snapshot().len());

        store.clear();
        let snapshot = devices.changed().await.unwrap();
        assert!(snapshot.is_empty());
    }
}
