//! Wire protocol: framing, envelope schema, and the payload codec.
//!
//! A message travels through three layers on its way to the wire:
//! 1. payload bytes become codec text ([`codec`]),
//! 2. the codec text rides inside a typed envelope ([`envelope`]),
//! 3. the serialized envelope becomes one length-prefixed frame ([`frame`]).
//!
//! The relay itself only ever peels back layers 3 and 2; payload bytes are
//! opaque to it except when storing a file.

pub mod codec;
pub mod envelope;
pub mod frame;

pub use envelope::{Envelope, ProtocolError};
pub use frame::{FrameError, MAX_FRAME_LEN};
