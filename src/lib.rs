//! In-process debug agent for inspecting an embedded object database.
//!
//! The agent runs inside a host application on a developer device and
//! serves the companion desktop inspector over a framed TCP protocol:
//! schema browsing, document reads and mutations, and live change
//! subscriptions. The database itself is an external collaborator reached
//! through the adapter crate's `DatabaseAdapter`; service discovery and
//! host-UI integration stay outside this crate.
//!
//! # Security
//!
//! This is debug tooling. There is **no authentication and no
//! encryption** on the wire. Hosts choose which interfaces to expose via
//! [`TransportMode`]; production builds should not start the agent at
//! all, or should restrict it to [`TransportMode::UsbOnly`] (loopback).
//!
//! # Example
//!
//! ```rust,ignore
//! use realm_inspector_agent::{Server, ServerConfig};
//! use realm_inspector_adapter::MemoryAdapter;
//!
//! let server = Server::new(ServerConfig::new(), MemoryAdapter::new(schemas));
//! server.start().await?;
//! // ... host runs ...
//! server.stop().await;
//! ```

mod config;
mod connection;
mod dispatcher;
mod error;
mod listener;
mod server;
mod subscriptions;

pub use config::{ServerConfig, TransportMode};
pub use error::{Error, Result};
pub use listener::{InspectorStream, Listener, TcpServerListener};
pub use server::Server;

pub use realm_inspector_adapter as adapter;
pub use realm_inspector_protocol as protocol;
