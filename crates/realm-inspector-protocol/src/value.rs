//! Tagged value model shared by every payload on the wire.
//!
//! `Value` is the canonical serialized form of database documents and the
//! type of all request parameters. Scalars map to their natural JSON form;
//! binary, timestamps, object ids and decimals encode as objects tagged
//! with a `_type` discriminator so the inspector can render them natively.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A JSON-compatible tagged value.
///
/// Values are immutable once constructed. Binary data carries only a
/// bounded preview (the producer decides how much to capture), so encoding
/// and decoding a value round-trips exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
   Null,
   Bool(bool),
   Int(i64),
   Double(f64),
   String(String),
   /// Binary blob preview. `length` is the size of the original blob;
   /// `preview` holds at most the producer's preview budget.
   Data {
      length: usize,
      preview: Vec<u8>,
      truncated: bool,
   },
   Date(OffsetDateTime),
   /// Opaque object id rendered as a hex string.
   ObjectId(String),
   Uuid(String),
   /// 128-bit decimal rendered as its string form.
   Decimal(String),
   List(Vec<Value>),
   Object(IndexMap<String, Value>),
}

impl Value {
   /// Builds a `Data` value from raw bytes, capturing at most
   /// `max_preview` bytes of preview.
   pub fn data(bytes: &[u8], max_preview: usize) -> Value {
      let truncated = bytes.len() > max_preview;
      let preview = if truncated {
         bytes[..max_preview].to_vec()
      } else {
         bytes.to_vec()
      };
      Value::Data {
         length: bytes.len(),
         preview,
         truncated,
      }
   }

   /// Builds the tagged wire shape for a link to another object.
   pub fn reference(type_name: &str, id: Value) -> Value {
      let mut map = IndexMap::new();
      map.insert("_type".to_string(), Value::String("Reference".to_string()));
      map.insert("_typeName".to_string(), Value::String(type_name.to_string()));
      map.insert("_id".to_string(), id);
      Value::Object(map)
   }

   /// Builds the tagged wire shape for a backlink collection.
   pub fn linking_objects(count: i64, items: Vec<Value>, truncated: bool) -> Value {
      let mut map = IndexMap::new();
      map.insert(
         "_type".to_string(),
         Value::String("LinkingObjects".to_string()),
      );
      map.insert("_count".to_string(), Value::Int(count));
      map.insert("_items".to_string(), Value::List(items));
      map.insert("_truncated".to_string(), Value::Bool(truncated));
      Value::Object(map)
   }

   /// Returns true if this value is null.
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }

   /// Attempts to get this value as a bool.
   pub fn as_bool(&self) -> Option<bool> {
      match self {
         Value::Bool(b) => Some(*b),
         _ => None,
      }
   }

   /// Attempts to get this value as a signed integer.
   pub fn as_i64(&self) -> Option<i64> {
      match self {
         Value::Int(i) => Some(*i),
         _ => None,
      }
   }

   /// Attempts to get this value as a double. Integers coerce.
   pub fn as_f64(&self) -> Option<f64> {
      match self {
         Value::Double(d) => Some(*d),
         Value::Int(i) => Some(*i as f64),
         _ => None,
      }
   }

   /// Attempts to get this value as a string reference.
   pub fn as_str(&self) -> Option<&str> {
      match self {
         Value::String(s) => Some(s),
         _ => None,
      }
   }

   /// Attempts to get this value as a list.
   pub fn as_list(&self) -> Option<&[Value]> {
      match self {
         Value::List(items) => Some(items),
         _ => None,
      }
   }

   /// Attempts to get this value as an object map.
   pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
      match self {
         Value::Object(map) => Some(map),
         _ => None,
      }
   }

   /// Looks up a key on an object value. Missing keys and non-object
   /// receivers are both absent, not errors.
   pub fn get(&self, key: &str) -> Option<&Value> {
      self.as_object().and_then(|map| map.get(key))
   }

   /// Converts to the JSON wire form.
   pub fn to_json(&self) -> JsonValue {
      match self {
         Value::Null => JsonValue::Null,
         Value::Bool(b) => JsonValue::Bool(*b),
         Value::Int(i) => JsonValue::Number((*i).into()),
         Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
         Value::String(s) => JsonValue::String(s.clone()),
         Value::Data {
            length,
            preview,
            truncated,
         } => serde_json::json!({
            "_type": "Data",
            "length": length,
            "preview": base64_encode(preview),
            "truncated": truncated,
         }),
         Value::Date(dt) => serde_json::json!({
            "_type": "Date",
            "iso": dt.format(&Rfc3339).unwrap_or_default(),
            "timestamp": dt.unix_timestamp_nanos() as f64 / 1e9,
         }),
         Value::ObjectId(id) => serde_json::json!({
            "_type": "ObjectId",
            "value": id,
         }),
         Value::Uuid(u) => JsonValue::String(u.clone()),
         Value::Decimal(d) => serde_json::json!({
            "_type": "Decimal128",
            "value": d,
         }),
         Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
         Value::Object(map) => {
            // serde_json's map is BTree-backed, so keys come out sorted
            // and the output is deterministic regardless of insertion order.
            let mut out = serde_json::Map::new();
            for (key, value) in map {
               out.insert(key.clone(), value.to_json());
            }
            JsonValue::Object(out)
         }
      }
   }

   /// Reconstructs a value from its JSON wire form.
   ///
   /// Objects carrying a recognized `_type` tag decode as the typed
   /// variant; unknown tags (`Reference`, `LinkingObjects`, user data that
   /// happens to have a `_type` field) stay plain objects. Unknown keys
   /// inside tagged forms are ignored.
   pub fn from_json(json: &JsonValue) -> Value {
      match json {
         JsonValue::Null => Value::Null,
         JsonValue::Bool(b) => Value::Bool(*b),
         JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
               Value::Int(i)
            } else {
               Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
         }
         JsonValue::String(s) => Value::String(s.clone()),
         JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
         JsonValue::Object(map) => {
            if let Some(tagged) = decode_tagged(map) {
               return tagged;
            }
            let mut out = IndexMap::with_capacity(map.len());
            for (key, value) in map {
               out.insert(key.clone(), Value::from_json(value));
            }
            Value::Object(out)
         }
      }
   }
}

/// Decodes a `_type`-tagged object into its typed variant, if recognized
/// and well-formed.
fn decode_tagged(map: &serde_json::Map<String, JsonValue>) -> Option<Value> {
   let tag = map.get("_type")?.as_str()?;
   match tag {
      "ObjectId" => Some(Value::ObjectId(map.get("value")?.as_str()?.to_string())),
      "Decimal128" => Some(Value::Decimal(map.get("value")?.as_str()?.to_string())),
      "Data" => {
         let length = map.get("length")?.as_u64()? as usize;
         let preview = base64_decode(map.get("preview")?.as_str()?)?;
         let truncated = map.get("truncated")?.as_bool()?;
         Some(Value::Data {
            length,
            preview,
            truncated,
         })
      }
      "Date" => {
         // Prefer the ISO form; fall back to the epoch-seconds form.
         if let Some(iso) = map.get("iso").and_then(JsonValue::as_str)
            && let Ok(dt) = OffsetDateTime::parse(iso, &Rfc3339)
         {
            return Some(Value::Date(dt));
         }
         let seconds = map.get("timestamp")?.as_f64()?;
         OffsetDateTime::from_unix_timestamp_nanos((seconds * 1e9) as i128)
            .ok()
            .map(Value::Date)
      }
      _ => None,
   }
}

fn base64_encode(data: &[u8]) -> String {
   use base64::Engine;
   base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(data: &str) -> Option<Vec<u8>> {
   use base64::Engine;
   base64::engine::general_purpose::STANDARD.decode(data).ok()
}

impl Serialize for Value {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      self.to_json().serialize(serializer)
   }
}

impl<'de> Deserialize<'de> for Value {
   fn deserialize<D>(deserializer: D) -> std::result::Result<Value, D::Error>
   where
      D: Deserializer<'de>,
   {
      let json = JsonValue::deserialize(deserializer)?;
      Ok(Value::from_json(&json))
   }
}

impl From<&str> for Value {
   fn from(value: &str) -> Self {
      Value::String(value.to_string())
   }
}

impl From<String> for Value {
   fn from(value: String) -> Self {
      Value::String(value)
   }
}

impl From<i64> for Value {
   fn from(value: i64) -> Self {
      Value::Int(value)
   }
}

impl From<f64> for Value {
   fn from(value: f64) -> Self {
      Value::Double(value)
   }
}

impl From<bool> for Value {
   fn from(value: bool) -> Self {
      Value::Bool(value)
   }
}
