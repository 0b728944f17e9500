//! Transport seam: listeners yielding accepted byte streams.
//!
//! The server consumes [`Listener`] only, so discovery-specific
//! transports (USB muxing, tunnels) plug in without touching the core.
//! [`TcpServerListener`] is the implementation used for both the network
//! and the USB-muxed port.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::debug;

/// A bidirectional byte stream carrying inspector frames.
pub trait InspectorStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> InspectorStream for T {}

/// Source of accepted inspector connections.
#[async_trait]
pub trait Listener: Send {
   /// Waits for the next inbound connection.
   async fn accept(&mut self) -> std::io::Result<Box<dyn InspectorStream>>;

   /// The address this listener is bound to.
   fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// TCP listener for inspector connections.
pub struct TcpServerListener {
   inner: TcpListener,
}

impl TcpServerListener {
   /// Binds the given address. Port 0 picks an ephemeral port; read it
   /// back with [`Listener::local_addr`].
   pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpServerListener> {
      let inner = TcpListener::bind(addr).await?;
      debug!(addr = %inner.local_addr()?, "Listener bound");
      Ok(TcpServerListener { inner })
   }
}

#[async_trait]
impl Listener for TcpServerListener {
   async fn accept(&mut self) -> std::io::Result<Box<dyn InspectorStream>> {
      let (stream, peer) = self.inner.accept().await?;
      stream.set_nodelay(true).ok();
      debug!(%peer, "Accepted inspector connection");
      Ok(Box::new(stream))
   }

   fn local_addr(&self) -> std::io::Result<SocketAddr> {
      self.inner.local_addr()
   }
}
