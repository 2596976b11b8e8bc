// Courier core — a named-client TCP message relay
//
// Clients connect, claim a display name, and exchange length-prefixed JSON
// envelopes through a central relay. Text messages are forwarded byte-for-
// byte to their receiver's connection; file payloads are decoded and stored
// on the relay host. The registry of who is reachable lives only in memory.

pub mod client;
pub mod protocol;
pub mod server;
pub mod sink;

pub use client::{ClientError, RelayClient};
pub use protocol::codec;
pub use protocol::envelope::{Envelope, ProtocolError};
pub use protocol::frame::{FrameError, MAX_FRAME_LEN};
pub use server::{RelayConfig, RelayServer, Registry, SessionHandle, SessionId, DEFAULT_PORT};
pub use sink::{sanitize_filename, DiskSink, FileSink};
