//! Client gateway and state mirror for the ZHA WebSocket protocol.
//!
//! This crate sits between `zhaws-api` and consumers such as the CLI:
//!
//! - **[`Controller`]**: facade over one server connection.
//!   [`connect()`](Controller::connect) opens the socket, starts listening,
//!   then loads every device and group into the mirror. Device, group and
//!   network operations are typed async methods.
//!
//! - **[`MirrorStore`]**: lock-free reactive storage of mirrored devices and
//!   groups (`DashMap` + `tokio::sync::watch`). Gateway events patch it in
//!   arrival order; command methods never touch it directly.
//!
//! - **[`EntityHandle`]**: typed verbs for one entity (`turn_on`,
//!   `set_temperature`, `lock`, ...) that check the entity's platform before
//!   sending.
//!
//! - **[`MirrorStream<T>`]** / **[`EntityStateStream`]**: subscriptions to a
//!   whole collection or to one entity's state. The mirror is discarded
//!   whenever the connection ends and rebuilt on the next `connect()`.

pub mod config;
pub mod controller;
pub mod entity;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ControllerConfig;
pub use controller::{ConnectionState, Controller};
pub use entity::{AlarmAction, EntityHandle};
pub use error::CoreError;
pub use model::{DeviceMirror, GroupMirror};
pub use store::MirrorStore;
pub use stream::{EntityStateStream, MirrorStream};

pub use zhaws_api::model::{EntityInfo, EntityRef, EntityState, Ieee, Platform};
pub use zhaws_api::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
