//! Database adapter contract for the realm inspector agent.
//!
//! The agent never talks to a database engine directly. It consumes the
//! narrow [`DatabaseAdapter`] trait defined here, always from the single
//! dedicated thread owned by an [`AdapterContext`]: embedded object
//! databases impose thread affinity on reads, writes and change feeds, and
//! this crate makes that rule explicit instead of hiding it behind
//! thread-local state.
//!
//! [`MemoryAdapter`] is a complete in-memory backend used by the agent's
//! integration tests and by host applications that want a demo database.

mod adapter;
mod context;
mod error;
mod filter;
mod memory;
mod types;

pub use adapter::{ChangeSink, DatabaseAdapter, ObservationHandle};
pub use context::AdapterContext;
pub use error::{Error, Result};
pub use memory::MemoryAdapter;
pub use types::{
   ChangeEvent, DatabaseInfo, DeleteAllResult, PropertyInfo, PropertyType, QueryParams,
   QueryResult, SchemaInfo, SerializerConfig,
};
