//! Integration tests for the in-memory reference backend.
//!
//! Tests verify:
//! - CRUD semantics: create/get/update/delete with canonical primary keys
//! - Query pagination boundaries and sort behavior
//! - Observation events: indices, filter membership, deletion ordinals
//! - Serializer budget: depth, list and binary preview truncation

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use realm_inspector_adapter::{
   ChangeEvent, DatabaseAdapter, Error, MemoryAdapter, PropertyInfo, PropertyType, QueryParams,
   SchemaInfo, SerializerConfig,
};
use realm_inspector_protocol::Value;

fn user_schema() -> SchemaInfo {
   SchemaInfo {
      name: "User".into(),
      primary_key: Some("id".into()),
      properties: vec![
         PropertyInfo::new("id", PropertyType::Int).primary_key(),
         PropertyInfo::new("name", PropertyType::String),
         PropertyInfo::new("age", PropertyType::Int).optional(),
         PropertyInfo::new("avatar", PropertyType::Data).optional(),
         PropertyInfo::new("address", PropertyType::Link("Address".into())).optional(),
         PropertyInfo::new("tags", PropertyType::Any).optional(),
      ],
      is_embedded: false,
   }
}

fn post_schema() -> SchemaInfo {
   SchemaInfo {
      name: "Post".into(),
      primary_key: Some("id".into()),
      properties: vec![
         PropertyInfo::new("id", PropertyType::Int).primary_key(),
         PropertyInfo::new("title", PropertyType::String),
      ],
      is_embedded: false,
   }
}

fn adapter() -> MemoryAdapter {
   MemoryAdapter::new(vec![user_schema(), post_schema()])
}

fn user(id: i64, name: &str, age: i64) -> IndexMap<String, Value> {
   let mut data = IndexMap::new();
   data.insert("id".to_string(), Value::Int(id));
   data.insert("name".to_string(), Value::String(name.to_string()));
   data.insert("age".to_string(), Value::Int(age));
   data
}

fn seed_users(adapter: &mut MemoryAdapter, count: i64) {
   for i in 0..count {
      adapter
         .create("User", &user(i, &format!("user-{}", i), 20 + (i % 50)))
         .unwrap();
   }
}

// ============================================================================
// CRUD
// ============================================================================

#[test]
fn test_create_and_get_round_trip() {
   let mut adapter = adapter();
   adapter.create("User", &user(1, "Alice", 30)).unwrap();

   let fetched = adapter.get("User", &Value::Int(1)).unwrap().unwrap();
   assert_eq!(fetched.get("name"), Some(&Value::String("Alice".into())));

   assert!(adapter.get("User", &Value::Int(2)).unwrap().is_none());
}

#[test]
fn test_create_duplicate_key_is_already_exists() {
   let mut adapter = adapter();
   adapter.create("User", &user(1, "Alice", 30)).unwrap();
   let error = adapter.create("User", &user(1, "Bob", 40)).unwrap_err();
   assert!(matches!(error, Error::AlreadyExists(_)));
}

#[test]
fn test_create_unknown_property_is_rejected() {
   let mut adapter = adapter();
   let mut data = user(1, "Alice", 30);
   data.insert("height".to_string(), Value::Int(170));
   let error = adapter.create("User", &data).unwrap_err();
   assert!(matches!(error, Error::PropertyNotFound { .. }));
}

#[test]
fn test_update_merges_changes() {
   let mut adapter = adapter();
   adapter.create("User", &user(1, "Alice", 30)).unwrap();

   let mut changes = IndexMap::new();
   changes.insert("age".to_string(), Value::Int(31));
   let updated = adapter.update("User", &Value::Int(1), &changes).unwrap();
   assert_eq!(updated.get("age"), Some(&Value::Int(31)));
   assert_eq!(updated.get("name"), Some(&Value::String("Alice".into())));
}

#[test]
fn test_update_missing_object_is_not_found() {
   let mut adapter = adapter();
   let mut changes = IndexMap::new();
   changes.insert("age".to_string(), Value::Int(31));
   let error = adapter.update("User", &Value::Int(9), &changes).unwrap_err();
   assert!(matches!(error, Error::NotFound(_)));
}

#[test]
fn test_delete_and_delete_missing() {
   let mut adapter = adapter();
   adapter.create("User", &user(1, "Alice", 30)).unwrap();

   assert!(adapter.delete("User", &Value::Int(1)).unwrap());
   let error = adapter.delete("User", &Value::Int(1)).unwrap_err();
   assert!(matches!(error, Error::NotFound(_)));
}

#[test]
fn test_unknown_type_is_rejected_everywhere() {
   let mut adapter = adapter();
   assert!(matches!(
      adapter.count("Nope", None).unwrap_err(),
      Error::UnknownType(_)
   ));
   assert!(matches!(
      adapter.get("Nope", &Value::Int(1)).unwrap_err(),
      Error::UnknownType(_)
   ));
   assert!(matches!(
      adapter.delete_all_in("Nope").unwrap_err(),
      Error::UnknownType(_)
   ));
}

#[test]
fn test_object_id_primary_keys_canonicalize() {
   let mut adapter = MemoryAdapter::new(vec![SchemaInfo {
      name: "Doc".into(),
      primary_key: Some("id".into()),
      properties: vec![PropertyInfo::new("id", PropertyType::ObjectId).primary_key()],
      is_embedded: false,
   }]);

   let mut data = IndexMap::new();
   data.insert(
      "id".to_string(),
      Value::ObjectId("6500a1b2c3d4e5f6a7b8c9d0".into()),
   );
   adapter.create("Doc", &data).unwrap();

   // A bare string key reaches the same object as the typed wrapper.
   let fetched = adapter
      .get("Doc", &Value::String("6500a1b2c3d4e5f6a7b8c9d0".into()))
      .unwrap();
   assert!(fetched.is_some());
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_query_pagination_shapes() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 125);

   let mut params = QueryParams::new("User");
   params.limit = 50;
   params.skip = 100;
   let page = adapter.query(&params).unwrap();
   assert_eq!(page.documents.len(), 25);
   assert_eq!(page.total_count, 125);
   assert_eq!(page.skip, 100);
   assert_eq!(page.limit, 50);
   assert!(!page.has_more);

   let mut params = QueryParams::new("User");
   params.limit = 50;
   let page = adapter.query(&params).unwrap();
   assert_eq!(page.documents.len(), 50);
   assert!(page.has_more);
}

#[test]
fn test_query_limit_zero_returns_count_only() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 10);

   let mut params = QueryParams::new("User");
   params.limit = 0;
   let page = adapter.query(&params).unwrap();
   assert!(page.documents.is_empty());
   assert_eq!(page.total_count, 10);
}

#[test]
fn test_query_skip_past_end_has_no_more() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 10);

   let mut params = QueryParams::new("User");
   params.skip = 50;
   let page = adapter.query(&params).unwrap();
   assert!(page.documents.is_empty());
   assert!(!page.has_more);
}

#[test]
fn test_query_filter_and_count_agree() {
   let mut adapter = adapter();
   adapter.create("User", &user(1, "Alice", 30)).unwrap();
   adapter.create("User", &user(2, "Bob", 17)).unwrap();
   adapter.create("User", &user(3, "Cara", 45)).unwrap();

   let mut params = QueryParams::new("User");
   params.filter = Some("age >= 18".into());
   let page = adapter.query(&params).unwrap();
   assert_eq!(page.total_count, 2);
   assert_eq!(adapter.count("User", Some("age >= 18")).unwrap(), 2);
}

#[test]
fn test_query_sort_descending() {
   let mut adapter = adapter();
   adapter.create("User", &user(1, "Alice", 30)).unwrap();
   adapter.create("User", &user(2, "Bob", 17)).unwrap();
   adapter.create("User", &user(3, "Cara", 45)).unwrap();

   let mut params = QueryParams::new("User");
   params.sort_key_path = Some("age".into());
   params.ascending = false;
   let page = adapter.query(&params).unwrap();
   let ages: Vec<i64> = page
      .documents
      .iter()
      .map(|doc| doc.get("age").and_then(Value::as_i64).unwrap())
      .collect();
   assert_eq!(ages, vec![45, 30, 17]);
}

#[test]
fn test_invalid_filter_is_rejected() {
   let adapter = adapter();
   let error = adapter.count("User", Some("not a predicate ???")).unwrap_err();
   assert!(matches!(error, Error::InvalidPredicate { .. }));
}

// ============================================================================
// Purges
// ============================================================================

#[test]
fn test_delete_all_in_reports_count() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 7);
   assert_eq!(adapter.delete_all_in("User").unwrap(), 7);
   assert_eq!(adapter.count("User", None).unwrap(), 0);
}

#[test]
fn test_delete_all_on_empty_database() {
   let mut adapter = adapter();
   let result = adapter.delete_all();
   assert_eq!(result.total_deleted, 0);
   assert_eq!(result.collections_cleared, 0);
   assert!(result.collections.is_empty());
}

#[test]
fn test_delete_all_clears_every_collection() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 3);
   let mut post = IndexMap::new();
   post.insert("id".to_string(), Value::Int(1));
   post.insert("title".to_string(), Value::String("hello".into()));
   adapter.create("Post", &post).unwrap();

   let result = adapter.delete_all();
   assert_eq!(result.total_deleted, 4);
   assert_eq!(result.collections_cleared, 2);
   assert!(result.collections.contains(&"User".to_string()));
   assert_eq!(adapter.info().object_count, 0);
}

// ============================================================================
// Observations
// ============================================================================

fn recording_sink() -> (
   Arc<Mutex<Vec<ChangeEvent>>>,
   realm_inspector_adapter::ChangeSink,
) {
   let events = Arc::new(Mutex::new(Vec::new()));
   let sink_events = events.clone();
   let sink = Box::new(move |event| {
      sink_events.lock().unwrap().push(event);
   });
   (events, sink)
}

#[test]
fn test_observe_fires_initial_with_current_results() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 2);

   let (events, sink) = recording_sink();
   adapter.observe("User", None, sink).unwrap();

   let events = events.lock().unwrap();
   assert_eq!(events.len(), 1);
   let ChangeEvent::Initial { results } = &events[0] else {
      panic!("expected initial event");
   };
   assert_eq!(results.len(), 2);
}

#[test]
fn test_insert_reports_insertion_index() {
   let mut adapter = adapter();
   let (events, sink) = recording_sink();
   adapter.observe("User", None, sink).unwrap();

   adapter.create("User", &user(1, "Alice", 30)).unwrap();

   let events = events.lock().unwrap();
   let ChangeEvent::Update {
      results,
      insertions,
      modifications,
      deletions,
   } = &events[1]
   else {
      panic!("expected update event");
   };
   assert_eq!(results.len(), 1);
   assert_eq!(insertions, &vec![0]);
   assert!(modifications.is_empty());
   assert!(deletions.is_empty());
}

#[test]
fn test_update_reports_modification_index() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 3);
   let (events, sink) = recording_sink();
   adapter.observe("User", None, sink).unwrap();

   let mut changes = IndexMap::new();
   changes.insert("name".to_string(), Value::String("renamed".into()));
   adapter.update("User", &Value::Int(1), &changes).unwrap();

   let events = events.lock().unwrap();
   let ChangeEvent::Update { modifications, .. } = &events[1] else {
      panic!("expected update event");
   };
   assert_eq!(modifications, &vec![1]);
}

#[test]
fn test_delete_reports_predelete_ordinal() {
   let mut adapter = adapter();
   seed_users(&mut adapter, 3);
   let (events, sink) = recording_sink();
   adapter.observe("User", None, sink).unwrap();

   adapter.delete("User", &Value::Int(1)).unwrap();

   let events = events.lock().unwrap();
   let ChangeEvent::Update {
      results, deletions, ..
   } = &events[1]
   else {
      panic!("expected update event");
   };
   // The middle of three objects was deleted; its pre-delete position
   // was 1 and two objects remain.
   assert_eq!(deletions, &vec![1]);
   assert_eq!(results.len(), 2);
}

#[test]
fn test_filtered_observer_tracks_membership() {
   let mut adapter = adapter();
   let (events, sink) = recording_sink();
   adapter.observe("User", Some("age >= 18"), sink).unwrap();

   // A minor does not enter the filtered result set at all.
   adapter.create("User", &user(1, "Kid", 10)).unwrap();
   assert_eq!(events.lock().unwrap().len(), 1, "only the initial event");

   // Growing up inserts them into the observer's results.
   let mut changes = IndexMap::new();
   changes.insert("age".to_string(), Value::Int(18));
   adapter.update("User", &Value::Int(1), &changes).unwrap();
   {
      let events = events.lock().unwrap();
      let ChangeEvent::Update { insertions, .. } = &events[1] else {
         panic!("expected update event");
      };
      assert_eq!(insertions, &vec![0]);
   }

   // Leaving the filter is a deletion from the observer's perspective.
   let mut changes = IndexMap::new();
   changes.insert("age".to_string(), Value::Int(5));
   adapter.update("User", &Value::Int(1), &changes).unwrap();
   let events = events.lock().unwrap();
   let ChangeEvent::Update { deletions, .. } = &events[2] else {
      panic!("expected update event");
   };
   assert_eq!(deletions, &vec![0]);
}

#[test]
fn test_unobserve_stops_events() {
   let mut adapter = adapter();
   let (events, sink) = recording_sink();
   let handle = adapter.observe("User", None, sink).unwrap();

   adapter.unobserve(handle);
   adapter.create("User", &user(1, "Alice", 30)).unwrap();
   assert_eq!(events.lock().unwrap().len(), 1, "only the initial event");
}

#[test]
fn test_observer_ignores_other_collections() {
   let mut adapter = adapter();
   let (events, sink) = recording_sink();
   adapter.observe("User", None, sink).unwrap();

   let mut post = IndexMap::new();
   post.insert("id".to_string(), Value::Int(1));
   post.insert("title".to_string(), Value::String("hello".into()));
   adapter.create("Post", &post).unwrap();

   assert_eq!(events.lock().unwrap().len(), 1, "only the initial event");
}

// ============================================================================
// Serializer budget
// ============================================================================

#[test]
fn test_nested_objects_truncate_at_max_depth() {
   let mut adapter = MemoryAdapter::new(vec![user_schema()])
      .with_serializer(SerializerConfig::new().with_max_depth(2));

   let mut inner = IndexMap::new();
   inner.insert("city".to_string(), Value::String("Oslo".into()));
   let mut address = IndexMap::new();
   address.insert("geo".to_string(), Value::Object(inner));
   let mut data = user(1, "Alice", 30);
   data.insert("address".to_string(), Value::Object(address));

   let created = adapter.create("User", &data).unwrap();
   let geo = created.get("address").and_then(|a| a.get("geo")).unwrap();
   assert_eq!(geo.get("_truncated"), Some(&Value::Bool(true)));
   assert_eq!(geo.get("city"), None);
}

#[test]
fn test_long_lists_are_capped() {
   let mut adapter = MemoryAdapter::new(vec![user_schema()])
      .with_serializer(SerializerConfig::new().with_max_list_items(5));

   let mut data = user(1, "Alice", 30);
   data.insert(
      "tags".to_string(),
      Value::List((0..50).map(Value::Int).collect()),
   );
   let created = adapter.create("User", &data).unwrap();
   assert_eq!(created.get("tags").and_then(Value::as_list).unwrap().len(), 5);
}

#[test]
fn test_binary_previews_are_bounded() {
   let mut adapter = MemoryAdapter::new(vec![user_schema()])
      .with_serializer(SerializerConfig::new().with_max_data_preview(16));

   let mut data = user(1, "Alice", 30);
   data.insert("avatar".to_string(), Value::data(&[9u8; 64], 64));
   let created = adapter.create("User", &data).unwrap();
   let Some(Value::Data {
      length,
      preview,
      truncated,
   }) = created.get("avatar")
   else {
      panic!("expected data value");
   };
   assert_eq!(*length, 64);
   assert_eq!(preview.len(), 16);
   assert!(*truncated);
}

// ============================================================================
// Info
// ============================================================================

#[test]
fn test_info_reports_in_memory_database() {
   let mut adapter = adapter().with_schema_version(7);
   seed_users(&mut adapter, 4);

   let info = adapter.info();
   assert_eq!(info.schema_version, 7);
   assert_eq!(info.object_count, 4);
   assert!(info.is_in_memory);
   assert!(info.file_size.is_none());
   assert!(!info.is_sync_enabled);
}
