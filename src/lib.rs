//! Small RFC 6455 websocket client and server for constrained devices.
//!
//! The protocol engine runs on any non-blocking byte stream that implements
//! [`stream::Socket`] and makes progress only when [`ws::Websocket::poll`] is called, which
//! makes it suitable for single threaded event loops. TCP transports are provided in
//! [`stream::tcp`].

pub mod buffer;
pub mod idle;
pub mod stream;
pub mod time;
mod util;
pub mod ws;
