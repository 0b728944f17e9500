//! Error types for adapter operations.
//!
//! `Display` strings are what inspector clients see verbatim in the
//! `error` field of failed responses, so they stay human-readable.

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors an adapter (or its execution context) can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
   /// No schema with the requested name.
   #[error("type '{0}' not found in schema")]
   UnknownType(String),

   /// Filter string did not parse or referenced something unusable.
   #[error("invalid filter predicate '{filter}': {reason}")]
   InvalidPredicate { filter: String, reason: String },

   /// Primary key value of an unusable shape, or a keyless collection.
   #[error("invalid primary key: {0}")]
   InvalidPrimaryKey(String),

   /// An update referenced a property the schema does not define.
   #[error("property '{property}' not found on type '{type_name}'")]
   PropertyNotFound { type_name: String, property: String },

   /// No object with the given primary key.
   #[error("object with primary key '{0}' not found")]
   NotFound(String),

   /// Create collided with an existing primary key.
   #[error("object with primary key '{0}' already exists")]
   AlreadyExists(String),

   /// The engine rejected a write.
   #[error("write failed: {0}")]
   WriteFailed(String),

   /// The database was opened read-only.
   #[error("database is read-only")]
   ReadOnly,

   /// The adapter execution context has shut down; no further calls can
   /// be serviced.
   #[error("adapter context has shut down")]
   ContextClosed,
}
