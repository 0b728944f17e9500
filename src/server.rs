//! The inspector server: listeners, client registry, routing, lifecycle.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use realm_inspector_adapter::{AdapterContext, DatabaseAdapter};
use realm_inspector_protocol::RequestKind;

use crate::config::{ServerConfig, TransportMode};
use crate::connection::{ClientHandle, DisconnectFn, RouteFn};
use crate::dispatcher::RequestDispatcher;
use crate::listener::{Listener, TcpServerListener};
use crate::subscriptions::SubscriptionManager;
use crate::{Error, Result};

/// The in-process debug agent server.
///
/// Owns the adapter execution context, the accepted clients and the
/// subscription registry. Construct one per database, [`start`] it when
/// the host wants to accept inspector connections, and [`stop`] it to
/// tear everything down. A stopped server has released its adapter
/// context and cannot be restarted; construct a fresh one instead.
///
/// There is no authentication or encryption; see the crate docs.
///
/// [`start`]: Server::start
/// [`stop`]: Server::stop
pub struct Server {
   config: ServerConfig,
   context: Arc<AdapterContext>,
   dispatcher: Arc<RequestDispatcher>,
   subscriptions: Arc<SubscriptionManager>,
   clients: Arc<Mutex<HashMap<Uuid, ClientHandle>>>,
   accept_tasks: Mutex<Vec<AbortHandle>>,
   bound_addrs: Mutex<Vec<SocketAddr>>,
   running: AtomicBool,
}

impl Server {
   /// Creates a server over the given adapter. Nothing is bound until
   /// [`start`](Server::start).
   pub fn new(config: ServerConfig, adapter: impl DatabaseAdapter) -> Server {
      let context = Arc::new(AdapterContext::spawn(adapter));
      Server {
         dispatcher: Arc::new(RequestDispatcher::new(Arc::clone(&context))),
         subscriptions: Arc::new(SubscriptionManager::new(Arc::clone(&context))),
         context,
         config,
         clients: Arc::new(Mutex::new(HashMap::new())),
         accept_tasks: Mutex::new(Vec::new()),
         bound_addrs: Mutex::new(Vec::new()),
         running: AtomicBool::new(false),
      }
   }

   /// Binds the configured transports and begins accepting inspector
   /// connections. Fails with [`Error::AlreadyRunning`] when called
   /// twice, and with the underlying I/O error when a bind fails.
   pub async fn start(&self) -> Result<()> {
      if self.running.swap(true, Ordering::SeqCst) {
         return Err(Error::AlreadyRunning);
      }

      if !cfg!(debug_assertions) {
         warn!(
            "Inspector server started in a release build; this is debug tooling \
             with no authentication or encryption"
         );
      }

      let mut bind_addrs: Vec<SocketAddr> = Vec::new();
      match self.config.transport_mode {
         TransportMode::NetworkOnly => {
            bind_addrs.push((Ipv4Addr::UNSPECIFIED, self.config.network_port).into());
         }
         TransportMode::UsbOnly => {
            bind_addrs.push((Ipv4Addr::LOCALHOST, self.config.usb_port).into());
         }
         TransportMode::Both => {
            bind_addrs.push((Ipv4Addr::UNSPECIFIED, self.config.network_port).into());
            bind_addrs.push((Ipv4Addr::LOCALHOST, self.config.usb_port).into());
         }
      }

      let mut listeners: Vec<Box<dyn Listener>> = Vec::new();
      for addr in bind_addrs {
         match TcpServerListener::bind(addr).await {
            Ok(listener) => listeners.push(Box::new(listener)),
            Err(error) => {
               self.running.store(false, Ordering::SeqCst);
               return Err(error.into());
            }
         }
      }

      for listener in listeners {
         if let Ok(addr) = listener.local_addr() {
            self.bound_addrs.lock().push(addr);
         }
         self.spawn_accept_loop(listener);
      }

      info!(
         addrs = ?self.bound_addrs.lock(),
         service = ?self.config.service_name,
         "Inspector server started"
      );
      Ok(())
   }

   /// Stops accepting, closes every client, tears down every
   /// subscription and shuts the adapter context down. Idempotent.
   pub async fn stop(&self) {
      if !self.running.swap(false, Ordering::SeqCst) {
         return;
      }

      for task in self.accept_tasks.lock().drain(..) {
         task.abort();
      }
      self.bound_addrs.lock().clear();

      // Closing each client fires its disconnect callback, which already
      // removes its subscriptions; the explicit shutdown below catches
      // anything without an owner.
      let clients: Vec<ClientHandle> = self.clients.lock().drain().map(|(_, c)| c).collect();
      for client in clients {
         client.close();
      }

      self.subscriptions.shutdown();

      let context = Arc::clone(&self.context);
      let _ = tokio::task::spawn_blocking(move || context.shutdown()).await;
      info!("Inspector server stopped");
   }

   pub fn is_running(&self) -> bool {
      self.running.load(Ordering::SeqCst)
   }

   /// Addresses actually bound, in transport order. Useful with port 0.
   pub fn local_addrs(&self) -> Vec<SocketAddr> {
      self.bound_addrs.lock().clone()
   }

   pub fn client_count(&self) -> usize {
      self.clients.lock().len()
   }

   pub fn subscription_count(&self) -> usize {
      self.subscriptions.subscription_count()
   }

   fn spawn_accept_loop(&self, mut listener: Box<dyn Listener>) {
      let clients = Arc::clone(&self.clients);
      let dispatcher = Arc::clone(&self.dispatcher);
      let subscriptions = Arc::clone(&self.subscriptions);
      let max_message_bytes = self.config.max_message_bytes;

      let task = tokio::spawn(async move {
         loop {
            match listener.accept().await {
               Ok(stream) => {
                  let router = make_router(Arc::clone(&dispatcher), Arc::clone(&subscriptions));
                  let on_disconnect =
                     make_disconnect(Arc::clone(&clients), Arc::clone(&subscriptions));
                  let client =
                     ClientHandle::spawn(stream, max_message_bytes, router, on_disconnect);
                  debug!(client = %client.id(), "Client registered");
                  clients.lock().insert(client.id(), client);
               }
               Err(error) => {
                  warn!(%error, "Accept failed");
               }
            }
         }
      });

      self.accept_tasks.lock().push(task.abort_handle());
   }
}

/// Routes subscribe/unsubscribe to the subscription manager and
/// everything else to the dispatcher. Both paths yield exactly one
/// response per request.
fn make_router(
   dispatcher: Arc<RequestDispatcher>,
   subscriptions: Arc<SubscriptionManager>,
) -> RouteFn {
   Arc::new(move |client, request| {
      let dispatcher = Arc::clone(&dispatcher);
      let subscriptions = Arc::clone(&subscriptions);
      Box::pin(async move {
         match request.kind {
            RequestKind::Subscribe => subscriptions.handle_subscribe(&client, &request).await,
            RequestKind::Unsubscribe => subscriptions.handle_unsubscribe(&request).await,
            _ => dispatcher.handle(&request).await,
         }
      })
   })
}

fn make_disconnect(
   clients: Arc<Mutex<HashMap<Uuid, ClientHandle>>>,
   subscriptions: Arc<SubscriptionManager>,
) -> DisconnectFn {
   Arc::new(move |client| {
      clients.lock().remove(&client.id());
      subscriptions.drop_client(client);
   })
}

impl std::fmt::Debug for Server {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Server")
         .field("running", &self.is_running())
         .field("clients", &self.client_count())
         .field("subscriptions", &self.subscription_count())
         .finish()
   }
}
