//! Envelope codec: JSON text frames to typed [`Message`]s and back.
//!
//! Decoding happens in two steps. [`parse_frame`] turns a text frame into a
//! JSON object (failure here is a transport fault), then [`Message::decode`]
//! reads `message_type` and dispatches on the family's own discriminator:
//! `command` for commands and results, `(event_type, event)` for events.

mod message;

pub use message::{CommandMessage, Message, MessageType, parse_frame};
