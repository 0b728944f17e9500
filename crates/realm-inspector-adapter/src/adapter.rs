//! The contract the agent requires of a database backend.

use indexmap::IndexMap;

use realm_inspector_protocol::Value;

use crate::Result;
use crate::types::{
   ChangeEvent, DatabaseInfo, DeleteAllResult, QueryParams, QueryResult, SchemaInfo,
};

/// Callback receiving the events of one observation.
///
/// Sinks are invoked on the adapter's execution thread, never anywhere
/// else; implementations must hand work off if they need another context.
pub type ChangeSink = Box<dyn FnMut(ChangeEvent) + Send>;

/// Opaque cancellation token for a live observation.
///
/// The observation stays registered until the token is passed back to
/// [`DatabaseAdapter::unobserve`] on the adapter thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationHandle(u64);

impl ObservationHandle {
   pub fn new(id: u64) -> ObservationHandle {
      ObservationHandle(id)
   }

   pub fn id(&self) -> u64 {
      self.0
   }
}

/// Minimal interface over an embedded object database.
///
/// Every method is called on the single dedicated thread owned by an
/// [`AdapterContext`](crate::AdapterContext); implementations may assume
/// exclusive, thread-affine access and never need internal locking for
/// the agent's sake.
pub trait DatabaseAdapter: Send + 'static {
   /// Static facts about the database (path, schema version, counts).
   fn info(&self) -> DatabaseInfo;

   /// Every schema in the catalog.
   fn list_schemas(&self) -> Vec<SchemaInfo>;

   /// One schema by name, absent when unknown.
   fn get_schema(&self, type_name: &str) -> Option<SchemaInfo>;

   /// Number of objects of a type, optionally filtered.
   fn count(&self, type_name: &str, filter: Option<&str>) -> Result<i64>;

   /// A page of objects, filtered, sorted and sliced per `params`.
   fn query(&self, params: &QueryParams) -> Result<QueryResult>;

   /// One object by primary key, absent when no such key exists.
   fn get(&self, type_name: &str, primary_key: &Value) -> Result<Option<Value>>;

   /// Inserts a new object and returns its serialized form.
   fn create(&mut self, type_name: &str, data: &IndexMap<String, Value>) -> Result<Value>;

   /// Applies `changes` to an existing object and returns its new form.
   fn update(
      &mut self,
      type_name: &str,
      primary_key: &Value,
      changes: &IndexMap<String, Value>,
   ) -> Result<Value>;

   /// Removes one object by primary key.
   fn delete(&mut self, type_name: &str, primary_key: &Value) -> Result<bool>;

   /// Removes every object of a type; returns the deleted count.
   fn delete_all_in(&mut self, type_name: &str) -> Result<i64>;

   /// Purges the whole database.
   fn delete_all(&mut self) -> DeleteAllResult;

   /// Registers a live observation of a type, optionally filtered.
   ///
   /// The sink fires once with [`ChangeEvent::Initial`] on registration
   /// and then once per committed change until the handle is cancelled.
   /// Events are delivered on the adapter thread.
   fn observe(
      &mut self,
      type_name: &str,
      filter: Option<&str>,
      sink: ChangeSink,
   ) -> Result<ObservationHandle>;

   /// Cancels an observation. Unknown handles are a no-op.
   fn unobserve(&mut self, handle: ObservationHandle);
}
