//! Server configuration.

use serde::{Deserialize, Serialize};

use realm_inspector_adapter::SerializerConfig;
use realm_inspector_protocol::DEFAULT_MAX_FRAME_BYTES;

/// Which transports the server binds.
///
/// `Network` binds all interfaces on the network port so the desktop
/// inspector can discover the device over Wi-Fi; `Usb` binds loopback
/// only (USB-muxed transports forward to localhost). Production builds
/// that keep the agent alive should prefer [`TransportMode::UsbOnly`] so
/// nothing is reachable from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportMode {
   NetworkOnly,
   UsbOnly,
   #[default]
   Both,
}

/// Configuration for a [`Server`](crate::Server). All fields have
/// defaults; construct with [`ServerConfig::new`] and override with the
/// `with_*` methods.
#[derive(Debug, Clone)]
pub struct ServerConfig {
   /// TCP port for network connections. Default: 9876.
   pub network_port: u16,
   /// TCP port (loopback) for USB-muxed connections. Default: 9877.
   pub usb_port: u16,
   /// Which transports to bind. Default: both.
   pub transport_mode: TransportMode,
   /// Name advertised by service discovery integrations. Discovery is an
   /// external collaborator; the server only carries the name.
   pub service_name: Option<String>,
   /// Maximum size of one frame, header included. Default: 10 MiB.
   pub max_message_bytes: usize,
   /// Budget adapters should apply when rendering object graphs.
   pub serializer: SerializerConfig,
}

impl Default for ServerConfig {
   fn default() -> Self {
      Self {
         network_port: 9876,
         usb_port: 9877,
         transport_mode: TransportMode::default(),
         service_name: None,
         max_message_bytes: DEFAULT_MAX_FRAME_BYTES,
         serializer: SerializerConfig::default(),
      }
   }
}

impl ServerConfig {
   pub fn new() -> ServerConfig {
      ServerConfig::default()
   }

   pub fn with_network_port(mut self, port: u16) -> ServerConfig {
      self.network_port = port;
      self
   }

   pub fn with_usb_port(mut self, port: u16) -> ServerConfig {
      self.usb_port = port;
      self
   }

   pub fn with_transport_mode(mut self, mode: TransportMode) -> ServerConfig {
      self.transport_mode = mode;
      self
   }

   pub fn with_service_name(mut self, name: impl Into<String>) -> ServerConfig {
      self.service_name = Some(name.into());
      self
   }

   pub fn with_max_message_bytes(mut self, bytes: usize) -> ServerConfig {
      self.max_message_bytes = bytes;
      self
   }

   pub fn with_serializer(mut self, serializer: SerializerConfig) -> ServerConfig {
      self.serializer = serializer;
      self
   }
}
