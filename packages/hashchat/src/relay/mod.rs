//! Connection relay
//!
//! Every text frame received on one connection is forwarded verbatim to all
//! other live connections. The relay never parses payloads and has no notion
//! of which registered user (if any) sits behind a connection.

mod hub;
mod session;

pub use hub::{BroadcastReport, ConnectionHandle, ConnectionId, Relay};
pub use session::{SessionEnd, run_receive_loop, serve_connection};
