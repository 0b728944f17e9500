//! Wire protocol for the realm inspector agent.
//!
//! Everything the agent and the desktop inspector exchange is described
//! here: the JSON-compatible [`Value`] model used in payloads, the
//! request/response/notification [`Message`] envelope, and the
//! length-prefixed frame [`codec`] with its incremental [`StreamBuffer`].
//!
//! The protocol carries no authentication or encryption. It is debug
//! tooling for development devices; hosts decide which interfaces to bind.

mod codec;
mod message;
mod value;

pub use codec::{DEFAULT_MAX_FRAME_BYTES, FRAME_HEADER_BYTES, StreamBuffer, decode, encode};
pub use message::{ChangeSet, Message, Notification, Request, RequestKind, Response, rfc3339_now};
pub use value::Value;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Frame larger than the configured maximum message size.
   ///
   /// On the decode path this poisons the stream: the oversize payload was
   /// never read, so there is no way to resynchronize on the next frame.
   #[error("frame of {size} bytes exceeds maximum message size of {max} bytes")]
   FrameTooLarge { size: usize, max: usize },

   /// Frame payload is not valid JSON, or not a known message shape.
   #[error("malformed frame payload: {0}")]
   Malformed(#[from] serde_json::Error),
}
