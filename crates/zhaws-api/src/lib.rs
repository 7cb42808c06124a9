//! Async client and wire codec for the ZHA WebSocket protocol.
//!
//! One WebSocket carries three kinds of JSON frames: commands sent by the
//! client, results correlated to them by `message_id`, and events pushed by
//! the server at any time. This crate provides:
//!
//! - **Wire models** ([`model`]): devices, groups, entities and their
//!   platform-specific state payloads.
//! - **Vocabulary** ([`command`], [`response`], [`event`]): every command
//!   kind with its parameters, the result payload each kind returns, and
//!   every `(event_type, event)` pair with its payload.
//! - **Codec** ([`codec`]): frame text to [`Message`] and back.
//! - **Client** ([`Client`]): connection lifecycle, request correlation with
//!   timeouts, and typed event listeners.
//!
//! ```no_run
//! use zhaws_api::{Client, ClientOptions, Command};
//! use zhaws_api::event::DeviceJoinedEvent;
//!
//! # async fn run() -> Result<(), zhaws_api::Error> {
//! let url = "ws://localhost:8001".parse().expect("valid url");
//! let client = Client::new(url, ClientOptions::default());
//! client.connect().await?;
//! client.on(|joined: &DeviceJoinedEvent| {
//!     println!("joined: {}", joined.device_info.ieee);
//!     Ok(())
//! });
//! client.listen()?;
//! client.send_command(Command::ClientListen).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod codes;
pub mod command;
mod correlation;
pub mod error;
pub mod event;
pub mod listeners;
pub mod model;
pub mod response;

pub use client::{Client, ClientOptions, ConnectionState, DEFAULT_CONNECT_TIMEOUT};
pub use codec::{CommandMessage, Message, MessageType};
pub use command::{Command, CommandKind, EntityCommand, EntityTarget, NoParams};
pub use correlation::{DEFAULT_REQUEST_TIMEOUT, MESSAGE_ID_MODULUS};
pub use error::{CommandError, DecodeError, Error, RadioOperationError, TransportError};
pub use event::{Event, EventKind, EventPayload};
pub use listeners::{EventDispatcher, ListenerError, ListenerId, ListenerResult};
pub use response::{CommandResponse, ErrorDetail, ResponsePayload};

pub use url::Url;
