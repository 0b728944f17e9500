//! Length-prefixed frame codec.
//!
//! Each frame is a 4-byte big-endian payload length followed by a UTF-8
//! JSON encoding of one [`Message`]. The [`StreamBuffer`] turns an
//! arbitrary TCP byte stream into a sequence of decoded messages,
//! tolerating any chunking the transport produces.

use tracing::warn;

use crate::message::Message;
use crate::{Error, Result};

/// Default maximum size of a frame (header plus payload).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Size of the length prefix.
pub const FRAME_HEADER_BYTES: usize = 4;

/// Encodes a message into a single frame.
///
/// Fails with [`Error::FrameTooLarge`] when header plus payload would
/// exceed `max_frame` bytes.
pub fn encode(message: &Message, max_frame: usize) -> Result<Vec<u8>> {
   let payload = serde_json::to_vec(message)?;
   let total = FRAME_HEADER_BYTES + payload.len();
   if total > max_frame {
      return Err(Error::FrameTooLarge {
         size: total,
         max: max_frame,
      });
   }

   let mut frame = Vec::with_capacity(total);
   frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
   frame.extend_from_slice(&payload);
   Ok(frame)
}

/// Decodes one frame payload (without the length prefix).
pub fn decode(payload: &[u8]) -> Result<Message> {
   Ok(serde_json::from_slice(payload)?)
}

/// Incremental accumulator that turns byte chunks into decoded messages.
///
/// Bytes are appended with [`push`]; [`extract`] peels complete frames off
/// the front in order. Incomplete trailing data stays buffered until more
/// bytes arrive. A complete frame that fails to decode is skipped so one
/// malformed message cannot corrupt the framing of those that follow.
///
/// [`push`]: StreamBuffer::push
/// [`extract`]: StreamBuffer::extract
#[derive(Debug)]
pub struct StreamBuffer {
   buf: Vec<u8>,
   max_frame: usize,
}

impl StreamBuffer {
   pub fn new(max_frame: usize) -> StreamBuffer {
      StreamBuffer {
         buf: Vec::new(),
         max_frame,
      }
   }

   /// Appends a chunk of received bytes.
   pub fn push(&mut self, chunk: &[u8]) {
      self.buf.extend_from_slice(chunk);
   }

   /// Number of bytes currently buffered.
   pub fn len(&self) -> usize {
      self.buf.len()
   }

   pub fn is_empty(&self) -> bool {
      self.buf.is_empty()
   }

   /// Extracts every complete message currently buffered.
   ///
   /// Stops when fewer than a header's worth of bytes remain, or when the
   /// next frame's payload has not fully arrived. Malformed complete
   /// frames are skipped with a warning. An oversize length prefix is
   /// unrecoverable (the stream cannot be resynchronized) and fails with
   /// [`Error::FrameTooLarge`]; the caller is expected to drop the
   /// connection.
   pub fn extract(&mut self) -> Result<Vec<Message>> {
      let mut messages = Vec::new();
      let mut cursor = 0usize;

      loop {
         let remaining = self.buf.len() - cursor;
         if remaining < FRAME_HEADER_BYTES {
            break;
         }

         let header: [u8; FRAME_HEADER_BYTES] = self.buf[cursor..cursor + FRAME_HEADER_BYTES]
            .try_into()
            .unwrap_or_default();
         let payload_len = u32::from_be_bytes(header) as usize;
         let frame_len = FRAME_HEADER_BYTES + payload_len;

         if frame_len > self.max_frame {
            self.buf.clear();
            return Err(Error::FrameTooLarge {
               size: frame_len,
               max: self.max_frame,
            });
         }

         if remaining < frame_len {
            break;
         }

         let payload = &self.buf[cursor + FRAME_HEADER_BYTES..cursor + frame_len];
         match decode(payload) {
            Ok(message) => messages.push(message),
            Err(error) => {
               // Skip the frame; the length prefix already told us where
               // the next one starts.
               warn!(bytes = payload_len, %error, "Skipping malformed frame");
            }
         }
         cursor += frame_len;
      }

      if cursor > 0 {
         self.buf.drain(..cursor);
      }
      Ok(messages)
   }
}
