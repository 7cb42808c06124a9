// ── Reactive mirror store ──
//
// Lock-free device and group storage with push-based change notification.

mod collection;
mod events;
mod mirror_store;

pub use mirror_store::MirrorStore;
