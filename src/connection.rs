//! Per-client connection state machine.
//!
//! Each accepted byte stream gets one reader task and one writer task.
//! The reader feeds the stream buffer and dispatches requests in arrival
//! order; the writer drains a bounded queue of encoded frames. States:
//! `Starting → Ready → Closing → Closed`, with `Closing` entered on peer
//! EOF so queued responses still flush before the socket closes.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use realm_inspector_protocol::{Message, Request, Response, StreamBuffer, encode};

use crate::listener::InspectorStream;
use crate::{Error, Result};

/// Upper bound on one blocking read from the socket.
const RECV_CHUNK_BYTES: usize = 64 * 1024;

/// Encoded frames queued per client before the client is considered too
/// slow and disconnected.
const SEND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientState {
   Starting,
   Ready,
   Closing,
   Closed,
}

/// Routes one decoded request to the dispatcher or the subscription
/// manager and yields the response.
pub(crate) type RouteFn = Arc<
   dyn Fn(ClientHandle, Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync,
>;

/// Invoked exactly once when a client reaches `Closed`.
pub(crate) type DisconnectFn = Arc<dyn Fn(&ClientHandle) + Send + Sync>;

enum Outgoing {
   Frame(Vec<u8>),
   /// Flush everything queued so far, then close the socket.
   Drain,
}

struct ClientShared {
   id: Uuid,
   state: Mutex<ClientState>,
   outgoing: mpsc::Sender<Outgoing>,
   subscriptions: Mutex<HashSet<String>>,
   disconnect_fired: AtomicBool,
   tasks: Mutex<Vec<AbortHandle>>,
   max_message_bytes: usize,
   on_disconnect: DisconnectFn,
}

/// Cloneable handle to one client connection.
#[derive(Clone)]
pub(crate) struct ClientHandle {
   inner: Arc<ClientShared>,
}

impl ClientHandle {
   /// Spawns the reader and writer tasks for an accepted stream. Must be
   /// called from within a tokio runtime.
   pub fn spawn(
      stream: Box<dyn InspectorStream>,
      max_message_bytes: usize,
      router: RouteFn,
      on_disconnect: DisconnectFn,
   ) -> ClientHandle {
      let (outgoing, outgoing_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
      let handle = ClientHandle {
         inner: Arc::new(ClientShared {
            id: Uuid::new_v4(),
            state: Mutex::new(ClientState::Starting),
            outgoing,
            subscriptions: Mutex::new(HashSet::new()),
            disconnect_fired: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            max_message_bytes,
            on_disconnect,
         }),
      };

      let (read_half, write_half) = tokio::io::split(stream);

      let writer = {
         let handle = handle.clone();
         tokio::spawn(writer_loop(write_half, outgoing_rx, handle))
      };

      // An accepted TCP socket is immediately writable.
      handle.set_state(ClientState::Ready);

      let reader = {
         let handle = handle.clone();
         tokio::spawn(reader_loop(read_half, handle, router))
      };

      handle
         .inner
         .tasks
         .lock()
         .extend([writer.abort_handle(), reader.abort_handle()]);
      handle
   }

   pub fn id(&self) -> Uuid {
      self.inner.id
   }

   pub fn state(&self) -> ClientState {
      *self.inner.state.lock()
   }

   fn set_state(&self, state: ClientState) {
      let mut current = self.inner.state.lock();
      // Closed is terminal.
      if *current != ClientState::Closed {
         *current = state;
      }
   }

   pub fn add_subscription(&self, id: &str) {
      self.inner.subscriptions.lock().insert(id.to_string());
   }

   pub fn remove_subscription(&self, id: &str) -> bool {
      self.inner.subscriptions.lock().remove(id)
   }

   pub fn has_subscription(&self, id: &str) -> bool {
      self.inner.subscriptions.lock().contains(id)
   }

   /// Empties and returns the membership set, for disconnect teardown.
   pub fn take_subscriptions(&self) -> Vec<String> {
      self.inner.subscriptions.lock().drain().collect()
   }

   /// Encodes and enqueues one message. Errors when the client is gone;
   /// a full queue means the client cannot keep up and is disconnected.
   pub fn send_message(&self, message: &Message) -> Result<()> {
      if self.state() == ClientState::Closed {
         return Err(Error::Disconnected);
      }

      let frame = encode(message, self.inner.max_message_bytes)?;
      match self.inner.outgoing.try_send(Outgoing::Frame(frame)) {
         Ok(()) => Ok(()),
         Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(client = %self.id(), "Send queue full; disconnecting slow client");
            self.close();
            Err(Error::Disconnected)
         }
         Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::Disconnected),
      }
   }

   /// Graceful close after peer EOF: flush the send queue, then close.
   async fn begin_close(&self) {
      self.set_state(ClientState::Closing);
      if self.inner.outgoing.send(Outgoing::Drain).await.is_err() {
         // Writer already gone; nothing left to flush.
         self.close();
      }
   }

   /// Immediate close: abort both tasks and fire the disconnect callback.
   pub fn close(&self) {
      self.set_state(ClientState::Closed);
      for task in self.inner.tasks.lock().drain(..) {
         task.abort();
      }
      self.fire_disconnect();
   }

   fn fire_disconnect(&self) {
      if self.inner.disconnect_fired.swap(true, Ordering::SeqCst) {
         return;
      }
      self.set_state(ClientState::Closed);
      debug!(client = %self.id(), "Client disconnected");
      (self.inner.on_disconnect)(self);
   }
}

impl std::fmt::Debug for ClientHandle {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("ClientHandle")
         .field("id", &self.id())
         .field("state", &self.state())
         .finish()
   }
}

async fn writer_loop(
   mut write_half: WriteHalf<Box<dyn InspectorStream>>,
   mut outgoing: mpsc::Receiver<Outgoing>,
   handle: ClientHandle,
) {
   while let Some(item) = outgoing.recv().await {
      match item {
         Outgoing::Frame(frame) => {
            if let Err(error) = write_half.write_all(&frame).await {
               debug!(client = %handle.id(), %error, "Send failed; closing client");
               handle.close();
               return;
            }
         }
         Outgoing::Drain => break,
      }
   }

   let _ = write_half.shutdown().await;
   handle.close();
}

async fn reader_loop(
   mut read_half: ReadHalf<Box<dyn InspectorStream>>,
   handle: ClientHandle,
   router: RouteFn,
) {
   let mut chunk = vec![0u8; RECV_CHUNK_BYTES];
   let mut buffer = StreamBuffer::new(handle.inner.max_message_bytes);

   loop {
      match read_half.read(&mut chunk).await {
         Ok(0) => {
            debug!(client = %handle.id(), "Peer closed the stream");
            handle.begin_close().await;
            return;
         }
         Ok(n) => {
            buffer.push(&chunk[..n]);
            let messages = match buffer.extract() {
               Ok(messages) => messages,
               Err(error) => {
                  // Oversize prefix: the stream cannot be resynchronized.
                  warn!(client = %handle.id(), %error, "Unrecoverable frame; closing client");
                  handle.close();
                  return;
               }
            };

            for message in messages {
               match message {
                  Message::Request(request) => {
                     trace!(
                        client = %handle.id(),
                        id = %request.id,
                        kind = ?request.kind,
                        "Dispatching request"
                     );
                     let response = router(handle.clone(), request).await;
                     if handle.send_message(&Message::Response(response)).is_err() {
                        trace!(client = %handle.id(), "Dropped response for closed client");
                     }
                  }
                  Message::Response(_) | Message::Notification(_) => {
                     debug!(client = %handle.id(), "Discarding unexpected server-bound message");
                  }
               }
            }
         }
         Err(error) => {
            debug!(client = %handle.id(), %error, "Receive failed");
            handle.close();
            return;
         }
      }
   }
}
