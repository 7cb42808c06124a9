//! Server side of the ZHA WebSocket protocol.
//!
//! The radio network is an external collaborator reached through the
//! [`Gateway`] and [`PlatformEntity`] traits. This crate owns everything
//! between those traits and the socket:
//!
//! - **[`CommandDispatcher`]**: one handler per command kind. Entity commands
//!   resolve their target before any handler runs; every failure, including
//!   a panic, is answered as a failed result.
//! - **[`Server`]**: accepts WebSocket clients. Each session dispatches
//!   commands concurrently and writes results and gateway events through one
//!   ordered outbound queue. Events flow only after `client_listen`.

pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod server;
mod session;

pub use dispatch::{CommandDispatcher, HandlerContext, HandlerResult};
pub use error::{OperationError, ServerError};
pub use gateway::{Gateway, PlatformEntity};
pub use server::{DEFAULT_HOST, DEFAULT_PORT, Server, ServerConfig};
