//! Schema, query and change-event types shared across adapters.

use serde::{Serialize, Serializer};

use realm_inspector_protocol::Value;

/// Static facts about the underlying database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
   pub path: String,
   pub schema_version: u64,
   pub object_count: i64,
   pub file_size: Option<i64>,
   pub is_in_memory: bool,
   pub is_sync_enabled: bool,
}

/// One collection's schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
   pub name: String,
   pub primary_key: Option<String>,
   pub properties: Vec<PropertyInfo>,
   pub is_embedded: bool,
}

impl SchemaInfo {
   pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
      self.properties.iter().find(|p| p.name == name)
   }
}

/// One property of a schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInfo {
   pub name: String,
   #[serde(rename = "type")]
   pub property_type: PropertyType,
   pub is_optional: bool,
   pub is_primary_key: bool,
   pub is_indexed: bool,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub object_class_name: Option<String>,
}

impl PropertyInfo {
   /// A plain required property with the given type.
   pub fn new(name: impl Into<String>, property_type: PropertyType) -> PropertyInfo {
      PropertyInfo {
         name: name.into(),
         property_type,
         is_optional: false,
         is_primary_key: false,
         is_indexed: false,
         object_class_name: None,
      }
   }

   pub fn primary_key(mut self) -> PropertyInfo {
      self.is_primary_key = true;
      self.is_indexed = true;
      self
   }

   pub fn optional(mut self) -> PropertyInfo {
      self.is_optional = true;
      self
   }
}

/// The closed set of property type tags the inspector understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
   Int,
   Bool,
   Float,
   Double,
   String,
   Data,
   Date,
   ObjectId,
   Decimal128,
   Any,
   Link(String),
   LinkingObjects(String),
   Unknown,
}

impl std::fmt::Display for PropertyType {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      match self {
         PropertyType::Int => write!(f, "Int"),
         PropertyType::Bool => write!(f, "Bool"),
         PropertyType::Float => write!(f, "Float"),
         PropertyType::Double => write!(f, "Double"),
         PropertyType::String => write!(f, "String"),
         PropertyType::Data => write!(f, "Data"),
         PropertyType::Date => write!(f, "Date"),
         PropertyType::ObjectId => write!(f, "ObjectId"),
         PropertyType::Decimal128 => write!(f, "Decimal128"),
         PropertyType::Any => write!(f, "AnyRealmValue"),
         PropertyType::Link(target) => write!(f, "Link<{}>", target),
         PropertyType::LinkingObjects(target) => write!(f, "LinkingObjects<{}>", target),
         PropertyType::Unknown => write!(f, "Unknown"),
      }
   }
}

impl Serialize for PropertyType {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      serializer.collect_str(self)
   }
}

/// Parameters for a paginated query. Defaults are applied by the request
/// dispatcher, not the adapter.
#[derive(Debug, Clone)]
pub struct QueryParams {
   pub type_name: String,
   pub filter: Option<String>,
   pub sort_key_path: Option<String>,
   pub ascending: bool,
   pub limit: i64,
   pub skip: i64,
}

impl QueryParams {
   pub fn new(type_name: impl Into<String>) -> QueryParams {
      QueryParams {
         type_name: type_name.into(),
         filter: None,
         sort_key_path: None,
         ascending: true,
         limit: 50,
         skip: 0,
      }
   }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
   pub documents: Vec<Value>,
   pub total_count: i64,
   pub skip: i64,
   pub limit: i64,
   pub has_more: bool,
}

/// Outcome of purging the whole database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllResult {
   pub collections_cleared: i64,
   pub total_deleted: i64,
   pub collections: Vec<String>,
}

/// Budget applied when documents are rendered to wire values.
///
/// Linked object graphs are cut off at `max_depth` with a truncation
/// marker; lists are capped at `max_list_items`; binary blobs carry at
/// most `max_data_preview` bytes of preview.
#[derive(Debug, Clone, Copy)]
pub struct SerializerConfig {
   pub max_depth: u32,
   pub max_list_items: usize,
   pub max_data_preview: usize,
}

impl Default for SerializerConfig {
   fn default() -> Self {
      Self {
         max_depth: 3,
         max_list_items: 100,
         max_data_preview: 1024,
      }
   }
}

impl SerializerConfig {
   pub fn new() -> SerializerConfig {
      SerializerConfig::default()
   }

   pub fn with_max_depth(mut self, max_depth: u32) -> SerializerConfig {
      self.max_depth = max_depth;
      self
   }

   pub fn with_max_list_items(mut self, max_list_items: usize) -> SerializerConfig {
      self.max_list_items = max_list_items;
      self
   }

   pub fn with_max_data_preview(mut self, max_data_preview: usize) -> SerializerConfig {
      self.max_data_preview = max_data_preview;
      self
   }
}

/// One event from a live observation.
///
/// `Initial` fires once when the observation is registered and carries the
/// current result set. `Update` indices for `insertions` and
/// `modifications` reference positions in `results` (the set *after* the
/// update); `deletions` are pre-delete ordinals in the previous result
/// set; once a row is gone the feed cannot name its primary key.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
   Initial {
      results: Vec<Value>,
   },
   Update {
      results: Vec<Value>,
      deletions: Vec<usize>,
      insertions: Vec<usize>,
      modifications: Vec<usize>,
   },
   Error(String),
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_property_type_wire_tags() {
      assert_eq!(PropertyType::Int.to_string(), "Int");
      assert_eq!(PropertyType::Any.to_string(), "AnyRealmValue");
      assert_eq!(PropertyType::Link("User".into()).to_string(), "Link<User>");
      assert_eq!(
         PropertyType::LinkingObjects("Comment".into()).to_string(),
         "LinkingObjects<Comment>"
      );
   }

   #[test]
   fn test_schema_serializes_camel_case() {
      let schema = SchemaInfo {
         name: "User".into(),
         primary_key: Some("id".into()),
         properties: vec![PropertyInfo::new("id", PropertyType::ObjectId).primary_key()],
         is_embedded: false,
      };
      let json = serde_json::to_value(&schema).unwrap();
      assert_eq!(json["primaryKey"], "id");
      assert_eq!(json["isEmbedded"], false);
      assert_eq!(json["properties"][0]["type"], "ObjectId");
      assert_eq!(json["properties"][0]["isPrimaryKey"], true);
   }

   #[test]
   fn test_optional_object_class_name_is_omitted() {
      let info = PropertyInfo::new("age", PropertyType::Int);
      let json = serde_json::to_value(&info).unwrap();
      assert!(json.get("objectClassName").is_none());
   }
}
