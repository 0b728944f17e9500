//! Thread-affine execution context for a database adapter.
//!
//! Embedded object databases require that reads, writes, observation
//! registration and change-feed delivery all happen on one thread with a
//! live run loop. `AdapterContext` owns that thread: every interaction
//! with the adapter is a job posted to it, and observation sinks fire on
//! it. Dropping the last handle (or calling [`shutdown`]) stops the
//! thread after the queued jobs drain.
//!
//! [`shutdown`]: AdapterContext::shutdown

use std::thread;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::adapter::DatabaseAdapter;
use crate::{Error, Result};

type Job = Box<dyn FnOnce(&mut dyn DatabaseAdapter) + Send>;

enum Command {
   Run(Job),
   Stop,
}

/// Handle to the dedicated adapter thread.
pub struct AdapterContext {
   jobs: mpsc::UnboundedSender<Command>,
   thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl AdapterContext {
   /// Spawns the adapter thread and moves the adapter onto it.
   pub fn spawn(adapter: impl DatabaseAdapter) -> AdapterContext {
      let (jobs, mut rx) = mpsc::unbounded_channel::<Command>();

      let thread = thread::Builder::new()
         .name("realm-inspector-adapter".to_string())
         .spawn(move || {
            let mut adapter = adapter;
            while let Some(command) = rx.blocking_recv() {
               match command {
                  Command::Run(job) => {
                     trace!("Running adapter job");
                     job(&mut adapter);
                  }
                  Command::Stop => break,
               }
            }
            debug!("Adapter thread stopped");
         })
         .expect("failed to spawn adapter thread");

      AdapterContext {
         jobs,
         thread: Mutex::new(Some(thread)),
      }
   }

   /// Runs a closure against the adapter on its thread and awaits the
   /// result.
   ///
   /// Fails with [`Error::ContextClosed`] when the context has shut down;
   /// callers surface that as an ordinary failed response.
   pub async fn call<F, R>(&self, job: F) -> Result<R>
   where
      F: FnOnce(&mut dyn DatabaseAdapter) -> R + Send + 'static,
      R: Send + 'static,
   {
      let (tx, rx) = oneshot::channel();
      self
         .jobs
         .send(Command::Run(Box::new(move |adapter| {
            let _ = tx.send(job(adapter));
         })))
         .map_err(|_| Error::ContextClosed)?;

      rx.await.map_err(|_| Error::ContextClosed)
   }

   /// Posts a closure to the adapter thread without awaiting it.
   ///
   /// Used for teardown paths that must not block. Reports whether the
   /// job was accepted.
   pub fn post<F>(&self, job: F) -> Result<()>
   where
      F: FnOnce(&mut dyn DatabaseAdapter) + Send + 'static,
   {
      self
         .jobs
         .send(Command::Run(Box::new(job)))
         .map_err(|_| Error::ContextClosed)
   }

   /// Stops the adapter thread after draining the jobs queued before the
   /// stop. Idempotent; blocks until the thread has exited.
   pub fn shutdown(&self) {
      let handle = self.thread.lock().take();
      if let Some(handle) = handle {
         let _ = self.jobs.send(Command::Stop);
         let _ = handle.join();
      }
   }

   /// True once [`shutdown`](Self::shutdown) has completed.
   pub fn is_closed(&self) -> bool {
      self.thread.lock().is_none()
   }
}

impl Drop for AdapterContext {
   fn drop(&mut self) {
      // Detach rather than join: the jobs channel closes with the sender
      // and the thread exits once the queue drains.
      let _ = self.jobs.send(Command::Stop);
   }
}

impl std::fmt::Debug for AdapterContext {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("AdapterContext")
         .field("closed", &self.is_closed())
         .finish()
   }
}
