//! In-memory reference backend.
//!
//! Backs the agent's integration tests and host demo databases. Documents
//! live in insertion order per collection, keyed by canonicalized primary
//! key. Every committed mutation synchronously notifies the matching
//! observers on the calling (adapter) thread.

use indexmap::IndexMap;
use tracing::trace;

use realm_inspector_protocol::Value;

use crate::adapter::{ChangeSink, DatabaseAdapter, ObservationHandle};
use crate::filter::Filter;
use crate::types::{
   ChangeEvent, DatabaseInfo, DeleteAllResult, QueryParams, QueryResult, SchemaInfo,
   SerializerConfig,
};
use crate::{Error, Result};

struct Observer {
   handle: ObservationHandle,
   type_name: String,
   filter: Option<Filter>,
   sink: ChangeSink,
}

/// What a mutation did, for change-event diffing.
enum DocChange {
   Put(String),
   Remove(String),
   Clear,
}

/// In-memory object database with schemas, a predicate grammar and live
/// observations.
pub struct MemoryAdapter {
   path: String,
   schema_version: u64,
   schemas: IndexMap<String, SchemaInfo>,
   collections: IndexMap<String, IndexMap<String, Value>>,
   observers: Vec<Observer>,
   next_observer_id: u64,
   serializer: SerializerConfig,
}

impl MemoryAdapter {
   /// Creates an empty database with the given schema catalog.
   pub fn new(schemas: Vec<SchemaInfo>) -> MemoryAdapter {
      let mut schema_map = IndexMap::with_capacity(schemas.len());
      let mut collections = IndexMap::with_capacity(schemas.len());
      for schema in schemas {
         collections.insert(schema.name.clone(), IndexMap::new());
         schema_map.insert(schema.name.clone(), schema);
      }
      MemoryAdapter {
         path: "memory://inspector".to_string(),
         schema_version: 1,
         schemas: schema_map,
         collections,
         observers: Vec::new(),
         next_observer_id: 0,
         serializer: SerializerConfig::default(),
      }
   }

   pub fn with_serializer(mut self, serializer: SerializerConfig) -> MemoryAdapter {
      self.serializer = serializer;
      self
   }

   pub fn with_schema_version(mut self, schema_version: u64) -> MemoryAdapter {
      self.schema_version = schema_version;
      self
   }

   fn schema(&self, type_name: &str) -> Result<&SchemaInfo> {
      self
         .schemas
         .get(type_name)
         .ok_or_else(|| Error::UnknownType(type_name.to_string()))
   }

   fn primary_key_property(&self, type_name: &str) -> Result<String> {
      self
         .schema(type_name)?
         .primary_key
         .clone()
         .ok_or_else(|| Error::InvalidPrimaryKey(format!("type '{}' has no primary key", type_name)))
   }

   fn documents<'a>(&'a self, type_name: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
      self.collections.get(type_name).into_iter().flatten()
   }

   /// Keys of documents matching each observer of `type_name`, captured
   /// before a mutation so deletions can be reported by pre-delete
   /// ordinal.
   fn observer_snapshots(&self, type_name: &str) -> Vec<(u64, Vec<String>)> {
      self
         .observers
         .iter()
         .filter(|observer| observer.type_name == type_name)
         .map(|observer| {
            let keys = self
               .documents(type_name)
               .filter(|(_, doc)| matches_filter(&observer.filter, doc))
               .map(|(key, _)| key.clone())
               .collect();
            (observer.handle.id(), keys)
         })
         .collect()
   }

   /// Diffs a committed mutation against each observer's pre-snapshot and
   /// delivers the resulting events. Runs on the calling thread.
   fn notify_observers(&mut self, type_name: &str, pre: &[(u64, Vec<String>)], change: &DocChange) {
      let MemoryAdapter {
         collections,
         observers,
         serializer,
         ..
      } = self;
      let empty = IndexMap::new();
      let collection = collections.get(type_name).unwrap_or(&empty);

      for observer in observers
         .iter_mut()
         .filter(|observer| observer.type_name == type_name)
      {
         let pre_keys: &[String] = pre
            .iter()
            .find(|(id, _)| *id == observer.handle.id())
            .map(|(_, keys)| keys.as_slice())
            .unwrap_or(&[]);

         let mut post_keys = Vec::new();
         let mut results = Vec::new();
         for (key, doc) in collection {
            if matches_filter(&observer.filter, doc) {
               post_keys.push(key.as_str());
               results.push(serialize_value(doc, serializer, 0));
            }
         }

         let mut deletions = Vec::new();
         let mut insertions = Vec::new();
         let mut modifications = Vec::new();
         match change {
            DocChange::Put(key) => {
               let was = pre_keys.iter().position(|k| k == key);
               let now = post_keys.iter().position(|k| *k == key.as_str());
               match (was, now) {
                  (Some(_), Some(index)) => modifications.push(index),
                  (None, Some(index)) => insertions.push(index),
                  // Matched before the update but no longer does: it
                  // left this observer's result set.
                  (Some(index), None) => deletions.push(index),
                  (None, None) => {}
               }
            }
            DocChange::Remove(key) => {
               if let Some(index) = pre_keys.iter().position(|k| k == key) {
                  deletions.push(index);
               }
            }
            DocChange::Clear => deletions.extend(0..pre_keys.len()),
         }

         if deletions.is_empty() && insertions.is_empty() && modifications.is_empty() {
            continue;
         }
         trace!(
            observation = observer.handle.id(),
            inserted = insertions.len(),
            modified = modifications.len(),
            deleted = deletions.len(),
            "Delivering change event"
         );
         (observer.sink)(ChangeEvent::Update {
            results,
            deletions,
            insertions,
            modifications,
         });
      }
   }
}

/// Canonical map key for a primary key value.
fn canonical_key(primary_key: &Value) -> Result<String> {
   match primary_key {
      Value::String(s) | Value::ObjectId(s) | Value::Uuid(s) | Value::Decimal(s) => Ok(s.clone()),
      Value::Int(i) => Ok(i.to_string()),
      other => Err(Error::InvalidPrimaryKey(format!(
         "unsupported key value {:?}",
         other
      ))),
   }
}

fn matches_filter(filter: &Option<Filter>, document: &Value) -> bool {
   filter.as_ref().is_none_or(|f| f.matches(document))
}

/// Renders a stored document within the serializer budget: object graphs
/// cut at `max_depth` with a truncation marker, lists capped, binary
/// previews bounded.
fn serialize_value(value: &Value, config: &SerializerConfig, depth: u32) -> Value {
   match value {
      Value::Object(map) => {
         if depth >= config.max_depth {
            let mut marker = IndexMap::new();
            marker.insert("_truncated".to_string(), Value::Bool(true));
            return Value::Object(marker);
         }
         Value::Object(
            map.iter()
               .map(|(key, child)| (key.clone(), serialize_value(child, config, depth + 1)))
               .collect(),
         )
      }
      Value::List(items) => Value::List(
         items
            .iter()
            .take(config.max_list_items)
            .map(|item| serialize_value(item, config, depth))
            .collect(),
      ),
      Value::Data {
         length, preview, ..
      } if preview.len() > config.max_data_preview => Value::Data {
         length: *length,
         preview: preview[..config.max_data_preview].to_vec(),
         truncated: true,
      },
      other => other.clone(),
   }
}

/// Orders two optional field values for sorting: absent sorts first, then
/// by type group (bool, number, string-like, date), then by value.
fn value_order(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
   use std::cmp::Ordering;

   fn rank(value: &Value) -> u8 {
      match value {
         Value::Null => 0,
         Value::Bool(_) => 1,
         Value::Int(_) | Value::Double(_) => 2,
         Value::String(_) | Value::ObjectId(_) | Value::Uuid(_) | Value::Decimal(_) => 3,
         Value::Date(_) => 4,
         _ => 5,
      }
   }

   fn text(value: &Value) -> Option<&str> {
      match value {
         Value::String(s) | Value::ObjectId(s) | Value::Uuid(s) | Value::Decimal(s) => Some(s),
         _ => None,
      }
   }

   match (a, b) {
      (None, None) => Ordering::Equal,
      (None, Some(_)) => Ordering::Less,
      (Some(_), None) => Ordering::Greater,
      (Some(a), Some(b)) => rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
         (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
         (Value::Date(x), Value::Date(y)) => x.cmp(y),
         _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
               x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            } else if let (Some(x), Some(y)) = (text(a), text(b)) {
               x.cmp(y)
            } else {
               Ordering::Equal
            }
         }
      }),
   }
}

/// Resolves a dotted key path for sorting.
fn lookup<'a>(document: &'a Value, key_path: &str) -> Option<&'a Value> {
   let mut current = document;
   for segment in key_path.split('.') {
      current = current.get(segment)?;
   }
   Some(current)
}

impl DatabaseAdapter for MemoryAdapter {
   fn info(&self) -> DatabaseInfo {
      DatabaseInfo {
         path: self.path.clone(),
         schema_version: self.schema_version,
         object_count: self.collections.values().map(|c| c.len() as i64).sum(),
         file_size: None,
         is_in_memory: true,
         is_sync_enabled: false,
      }
   }

   fn list_schemas(&self) -> Vec<SchemaInfo> {
      self.schemas.values().cloned().collect()
   }

   fn get_schema(&self, type_name: &str) -> Option<SchemaInfo> {
      self.schemas.get(type_name).cloned()
   }

   fn count(&self, type_name: &str, filter: Option<&str>) -> Result<i64> {
      self.schema(type_name)?;
      let filter = filter.map(Filter::parse).transpose()?;
      Ok(self
         .documents(type_name)
         .filter(|(_, doc)| matches_filter(&filter, doc))
         .count() as i64)
   }

   fn query(&self, params: &QueryParams) -> Result<QueryResult> {
      self.schema(&params.type_name)?;
      let filter = params.filter.as_deref().map(Filter::parse).transpose()?;

      let mut matched: Vec<&Value> = self
         .documents(&params.type_name)
         .map(|(_, doc)| doc)
         .filter(|doc| matches_filter(&filter, doc))
         .collect();

      if let Some(key_path) = &params.sort_key_path {
         matched.sort_by(|a, b| value_order(lookup(a, key_path), lookup(b, key_path)));
         if !params.ascending {
            matched.reverse();
         }
      }

      let total_count = matched.len() as i64;
      let skip = params.skip.max(0) as usize;
      let limit = params.limit.max(0) as usize;
      let documents: Vec<Value> = matched
         .into_iter()
         .skip(skip)
         .take(limit)
         .map(|doc| serialize_value(doc, &self.serializer, 0))
         .collect();

      let has_more = (skip as i64) + (documents.len() as i64) < total_count;
      Ok(QueryResult {
         documents,
         total_count,
         skip: params.skip,
         limit: params.limit,
         has_more,
      })
   }

   fn get(&self, type_name: &str, primary_key: &Value) -> Result<Option<Value>> {
      self.schema(type_name)?;
      let key = canonical_key(primary_key)?;
      Ok(self
         .collections
         .get(type_name)
         .and_then(|collection| collection.get(&key))
         .map(|doc| serialize_value(doc, &self.serializer, 0)))
   }

   fn create(&mut self, type_name: &str, data: &IndexMap<String, Value>) -> Result<Value> {
      let schema = self.schema(type_name)?.clone();
      for property in data.keys() {
         if schema.property(property).is_none() {
            return Err(Error::PropertyNotFound {
               type_name: type_name.to_string(),
               property: property.clone(),
            });
         }
      }

      let pk_property = self.primary_key_property(type_name)?;
      let key = data
         .get(&pk_property)
         .ok_or_else(|| {
            Error::InvalidPrimaryKey(format!(
               "create data for '{}' is missing primary key property '{}'",
               type_name, pk_property
            ))
         })
         .and_then(canonical_key)?;

      let pre = self.observer_snapshots(type_name);
      let collection = self
         .collections
         .entry(type_name.to_string())
         .or_default();
      if collection.contains_key(&key) {
         return Err(Error::AlreadyExists(key));
      }

      let document = Value::Object(data.clone());
      collection.insert(key.clone(), document.clone());
      self.notify_observers(type_name, &pre, &DocChange::Put(key));
      Ok(serialize_value(&document, &self.serializer, 0))
   }

   fn update(
      &mut self,
      type_name: &str,
      primary_key: &Value,
      changes: &IndexMap<String, Value>,
   ) -> Result<Value> {
      let schema = self.schema(type_name)?.clone();
      for property in changes.keys() {
         if schema.property(property).is_none() {
            return Err(Error::PropertyNotFound {
               type_name: type_name.to_string(),
               property: property.clone(),
            });
         }
      }

      let key = canonical_key(primary_key)?;
      let pre = self.observer_snapshots(type_name);

      let document = {
         let collection = self
            .collections
            .get_mut(type_name)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
         let document = collection
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;

         let Value::Object(map) = document else {
            return Err(Error::WriteFailed(format!(
               "stored object '{}' is not a document",
               key
            )));
         };
         for (property, value) in changes {
            map.insert(property.clone(), value.clone());
         }
         document.clone()
      };

      self.notify_observers(type_name, &pre, &DocChange::Put(key));
      Ok(serialize_value(&document, &self.serializer, 0))
   }

   fn delete(&mut self, type_name: &str, primary_key: &Value) -> Result<bool> {
      self.schema(type_name)?;
      let key = canonical_key(primary_key)?;
      let pre = self.observer_snapshots(type_name);

      let removed = self
         .collections
         .get_mut(type_name)
         .and_then(|collection| collection.shift_remove(&key))
         .is_some();
      if !removed {
         return Err(Error::NotFound(key));
      }

      self.notify_observers(type_name, &pre, &DocChange::Remove(key));
      Ok(true)
   }

   fn delete_all_in(&mut self, type_name: &str) -> Result<i64> {
      self.schema(type_name)?;
      let pre = self.observer_snapshots(type_name);

      let deleted = self
         .collections
         .get_mut(type_name)
         .map(|collection| {
            let count = collection.len() as i64;
            collection.clear();
            count
         })
         .unwrap_or(0);

      if deleted > 0 {
         self.notify_observers(type_name, &pre, &DocChange::Clear);
      }
      Ok(deleted)
   }

   fn delete_all(&mut self) -> DeleteAllResult {
      let type_names: Vec<String> = self.collections.keys().cloned().collect();
      let mut result = DeleteAllResult {
         collections_cleared: 0,
         total_deleted: 0,
         collections: Vec::new(),
      };

      for type_name in type_names {
         let pre = self.observer_snapshots(&type_name);
         let deleted = self
            .collections
            .get_mut(&type_name)
            .map(|collection| {
               let count = collection.len() as i64;
               collection.clear();
               count
            })
            .unwrap_or(0);
         if deleted > 0 {
            result.collections_cleared += 1;
            result.total_deleted += deleted;
            result.collections.push(type_name.clone());
            self.notify_observers(&type_name, &pre, &DocChange::Clear);
         }
      }
      result
   }

   fn observe(
      &mut self,
      type_name: &str,
      filter: Option<&str>,
      mut sink: ChangeSink,
   ) -> Result<ObservationHandle> {
      self.schema(type_name)?;
      let filter = filter.map(Filter::parse).transpose()?;

      let handle = ObservationHandle::new(self.next_observer_id);
      self.next_observer_id += 1;

      let results: Vec<Value> = self
         .documents(type_name)
         .filter(|(_, doc)| matches_filter(&filter, doc))
         .map(|(_, doc)| serialize_value(doc, &self.serializer, 0))
         .collect();
      sink(ChangeEvent::Initial { results });

      self.observers.push(Observer {
         handle,
         type_name: type_name.to_string(),
         filter,
         sink,
      });
      trace!(observation = handle.id(), type_name, "Observation registered");
      Ok(handle)
   }

   fn unobserve(&mut self, handle: ObservationHandle) {
      self.observers.retain(|observer| observer.handle != handle);
   }
}
