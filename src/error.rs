//! Error types for the agent.

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the agent distinguishes.
///
/// Protocol and adapter errors are caught at the dispatcher boundary and
/// become failed responses; transport errors terminate the affected
/// client only; lifecycle errors surface to the host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// A request omitted a parameter its operation requires.
   #[error("missing required parameter '{0}'")]
   MissingParameter(String),

   /// A request parameter had the wrong type or an unusable value.
   #[error("invalid parameter '{name}': {reason}")]
   InvalidParameter { name: String, reason: String },

   /// `getSchema` for a type the catalog does not know.
   #[error("Schema '{0}' not found")]
   SchemaNotFound(String),

   /// Error reported by the database adapter.
   #[error(transparent)]
   Adapter(#[from] realm_inspector_adapter::Error),

   /// Error from the wire codec.
   #[error(transparent)]
   Codec(#[from] realm_inspector_protocol::Error),

   /// Transport-level I/O failure (listen, accept, send, receive).
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   /// `start` called while the server is already running.
   #[error("server is already running")]
   AlreadyRunning,

   /// Operation that requires a running server.
   #[error("server is not running")]
   NotRunning,

   /// The target client has disconnected; the message was dropped.
   #[error("client disconnected")]
   Disconnected,
}
