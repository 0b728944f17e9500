//! Request dispatcher: decoded request in, exactly one response out.
//!
//! All adapter work runs on the adapter execution context, so one
//! client's requests serialize naturally and responses come back in
//! arrival order. Subscription requests never reach the dispatcher; the
//! server routes them to the subscription manager.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use time::OffsetDateTime;

use realm_inspector_adapter::{AdapterContext, QueryParams};
use realm_inspector_protocol::{Request, RequestKind, Response, Value};

use crate::{Error, Result};

pub(crate) struct RequestDispatcher {
   context: Arc<AdapterContext>,
}

impl RequestDispatcher {
   pub fn new(context: Arc<AdapterContext>) -> RequestDispatcher {
      RequestDispatcher { context }
   }

   /// Computes the response for one request. Never fails; every error
   /// becomes a failed response carrying the request's id.
   pub async fn handle(&self, request: &Request) -> Response {
      match self.dispatch(request).await {
         Ok(data) => Response::ok(&request.id, data),
         Err(error) => Response::failure(&request.id, error.to_string()),
      }
   }

   async fn dispatch(&self, request: &Request) -> Result<Value> {
      match request.kind {
         RequestKind::Ping => {
            let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
            Ok(object([
               ("pong", Value::Bool(true)),
               ("timestamp", Value::Int(millis as i64)),
            ]))
         }

         RequestKind::GetRealmInfo => {
            let info = self.context.call(|adapter| adapter.info()).await?;
            Ok(to_wire(&info))
         }

         RequestKind::ListSchemas => {
            let schemas = self
               .context
               .call(|adapter| {
                  adapter
                     .list_schemas()
                     .into_iter()
                     .map(|schema| {
                        let count = adapter.count(&schema.name, None).unwrap_or(0);
                        (schema, count)
                     })
                     .collect::<Vec<_>>()
               })
               .await?;

            let entries = schemas
               .into_iter()
               .map(|(schema, count)| {
                  object([
                     ("name", Value::String(schema.name)),
                     (
                        "primaryKey",
                        schema.primary_key.map(Value::String).unwrap_or(Value::Null),
                     ),
                     ("propertyCount", Value::Int(schema.properties.len() as i64)),
                     ("isEmbedded", Value::Bool(schema.is_embedded)),
                     ("objectCount", Value::Int(count)),
                  ])
               })
               .collect();
            Ok(Value::List(entries))
         }

         RequestKind::GetSchema => {
            let type_name = require_str(request, "typeName")?;
            let name = type_name.clone();
            let schema = self
               .context
               .call(move |adapter| adapter.get_schema(&name))
               .await?;
            let schema = schema.ok_or(Error::SchemaNotFound(type_name))?;
            Ok(to_wire(&schema))
         }

         RequestKind::QueryDocuments => {
            let mut params = QueryParams::new(require_str(request, "typeName")?);
            params.filter = optional_str(request, "filter")?;
            params.sort_key_path = optional_str(request, "sortKeyPath")?;
            if let Some(ascending) = optional_bool(request, "ascending")? {
               params.ascending = ascending;
            }
            if let Some(limit) = optional_i64(request, "limit")?
               && limit >= 0
            {
               params.limit = limit;
            }
            if let Some(skip) = optional_i64(request, "skip")?
               && skip >= 0
            {
               params.skip = skip;
            }

            let result = self
               .context
               .call(move |adapter| adapter.query(&params))
               .await??;
            Ok(to_wire(&result))
         }

         RequestKind::GetDocument => {
            let type_name = require_str(request, "typeName")?;
            let primary_key = normalize_primary_key(require_value(request, "primaryKey")?);
            let key_text = key_display(&primary_key);
            let document = self
               .context
               .call(move |adapter| adapter.get(&type_name, &primary_key))
               .await??;
            document.ok_or(Error::Adapter(realm_inspector_adapter::Error::NotFound(
               key_text,
            )))
         }

         RequestKind::CountDocuments => {
            let type_name = require_str(request, "typeName")?;
            let filter = optional_str(request, "filter")?;
            let count = self
               .context
               .call(move |adapter| adapter.count(&type_name, filter.as_deref()))
               .await??;
            Ok(object([("count", Value::Int(count))]))
         }

         RequestKind::CreateDocument => {
            let type_name = require_str(request, "typeName")?;
            let data = object_param(request, "data")?
               .ok_or_else(|| Error::MissingParameter("data".to_string()))?;
            let created = self
               .context
               .call(move |adapter| adapter.create(&type_name, &data))
               .await??;
            Ok(created)
         }

         RequestKind::UpdateDocument => {
            let type_name = require_str(request, "typeName")?;
            let primary_key = normalize_primary_key(require_value(request, "primaryKey")?);
            // Upstream inspector builds disagree on the parameter name;
            // accept both, preferring `data`.
            let changes = match object_param(request, "data")? {
               Some(map) => map,
               None => object_param(request, "changes")?
                  .ok_or_else(|| Error::MissingParameter("data".to_string()))?,
            };
            let updated = self
               .context
               .call(move |adapter| adapter.update(&type_name, &primary_key, &changes))
               .await??;
            Ok(updated)
         }

         RequestKind::DeleteDocument => {
            let type_name = require_str(request, "typeName")?;
            let primary_key = normalize_primary_key(require_value(request, "primaryKey")?);
            let deleted = self
               .context
               .call(move |adapter| adapter.delete(&type_name, &primary_key))
               .await??;
            Ok(object([("deleted", Value::Bool(deleted))]))
         }

         RequestKind::DeleteAllInCollection => {
            let type_name = require_str(request, "typeName")?;
            let deleted = self
               .context
               .call(move |adapter| adapter.delete_all_in(&type_name))
               .await??;
            Ok(object([("deletedCount", Value::Int(deleted))]))
         }

         RequestKind::DeleteAllInDatabase => {
            let result = self.context.call(|adapter| adapter.delete_all()).await?;
            Ok(to_wire(&result))
         }

         // The server routes these to the subscription manager; reaching
         // here is a routing bug.
         RequestKind::Subscribe | RequestKind::Unsubscribe => Err(Error::InvalidParameter {
            name: "type".to_string(),
            reason: "subscription requests are handled by the subscription manager".to_string(),
         }),
      }
   }
}

/// Builds an object value from literal pairs.
pub(crate) fn object<const N: usize>(pairs: [(&str, Value); N]) -> Value {
   Value::Object(
      pairs
         .into_iter()
         .map(|(key, value)| (key.to_string(), value))
         .collect(),
   )
}

/// Serializes an adapter-side type into its wire value.
fn to_wire<T: Serialize>(value: &T) -> Value {
   serde_json::to_value(value)
      .map(|json| Value::from_json(&json))
      .unwrap_or(Value::Null)
}

/// Unwraps typed-value wrappers so the adapter sees a bare scalar
/// (`{"_type":"ObjectId","value":...}` arrives from the wire already
/// decoded into its typed variant).
fn normalize_primary_key(value: Value) -> Value {
   match value {
      Value::ObjectId(s) | Value::Uuid(s) | Value::Decimal(s) => Value::String(s),
      Value::Object(map) => map
         .get("value")
         .cloned()
         .unwrap_or(Value::Object(map)),
      other => other,
   }
}

fn key_display(value: &Value) -> String {
   match value {
      Value::String(s) => s.clone(),
      Value::Int(i) => i.to_string(),
      other => format!("{:?}", other),
   }
}

pub(crate) fn require_str(request: &Request, name: &str) -> Result<String> {
   match request.param(name) {
      None => Err(Error::MissingParameter(name.to_string())),
      Some(value) => value
         .as_str()
         .map(str::to_string)
         .ok_or_else(|| Error::InvalidParameter {
            name: name.to_string(),
            reason: "expected a string".to_string(),
         }),
   }
}

pub(crate) fn optional_str(request: &Request, name: &str) -> Result<Option<String>> {
   match request.param(name) {
      None | Some(Value::Null) => Ok(None),
      Some(value) => value
         .as_str()
         .map(|s| Some(s.to_string()))
         .ok_or_else(|| Error::InvalidParameter {
            name: name.to_string(),
            reason: "expected a string".to_string(),
         }),
   }
}

fn optional_i64(request: &Request, name: &str) -> Result<Option<i64>> {
   match request.param(name) {
      None | Some(Value::Null) => Ok(None),
      Some(value) => value
         .as_i64()
         .map(Some)
         .ok_or_else(|| Error::InvalidParameter {
            name: name.to_string(),
            reason: "expected an integer".to_string(),
         }),
   }
}

fn optional_bool(request: &Request, name: &str) -> Result<Option<bool>> {
   match request.param(name) {
      None | Some(Value::Null) => Ok(None),
      Some(value) => value
         .as_bool()
         .map(Some)
         .ok_or_else(|| Error::InvalidParameter {
            name: name.to_string(),
            reason: "expected a boolean".to_string(),
         }),
   }
}

fn object_param(request: &Request, name: &str) -> Result<Option<IndexMap<String, Value>>> {
   match request.param(name) {
      None | Some(Value::Null) => Ok(None),
      Some(value) => value
         .as_object()
         .map(|map| Some(map.clone()))
         .ok_or_else(|| Error::InvalidParameter {
            name: name.to_string(),
            reason: "expected an object".to_string(),
         }),
   }
}

pub(crate) fn require_value(request: &Request, name: &str) -> Result<Value> {
   request
      .param(name)
      .cloned()
      .ok_or_else(|| Error::MissingParameter(name.to_string()))
}

#[cfg(test)]
mod tests {
   use super::*;
   use realm_inspector_adapter::{
      MemoryAdapter, PropertyInfo, PropertyType, SchemaInfo,
   };

   fn dispatcher_with_users() -> RequestDispatcher {
      let schema = SchemaInfo {
         name: "User".into(),
         primary_key: Some("id".into()),
         properties: vec![
            PropertyInfo::new("id", PropertyType::ObjectId).primary_key(),
            PropertyInfo::new("name", PropertyType::String),
         ],
         is_embedded: false,
      };
      let context = Arc::new(AdapterContext::spawn(MemoryAdapter::new(vec![schema])));
      RequestDispatcher::new(context)
   }

   fn request(kind: RequestKind, params: &[(&str, Value)]) -> Request {
      let mut map = IndexMap::new();
      for (key, value) in params {
         map.insert(key.to_string(), value.clone());
      }
      Request::new("r1", kind).with_params(map)
   }

   #[tokio::test]
   async fn test_ping_needs_no_adapter_state() {
      let dispatcher = dispatcher_with_users();
      let response = dispatcher
         .handle(&Request::new("r1", RequestKind::Ping))
         .await;
      assert!(response.success);
      let data = response.data.unwrap();
      assert_eq!(data.get("pong"), Some(&Value::Bool(true)));
      assert!(data.get("timestamp").and_then(Value::as_i64).is_some());
   }

   #[tokio::test]
   async fn test_missing_parameter_is_reported_by_name() {
      let dispatcher = dispatcher_with_users();
      let response = dispatcher
         .handle(&Request::new("r1", RequestKind::GetSchema))
         .await;
      assert!(!response.success);
      assert_eq!(
         response.error.as_deref(),
         Some("missing required parameter 'typeName'")
      );
   }

   #[tokio::test]
   async fn test_wrong_typed_parameter_is_invalid() {
      let dispatcher = dispatcher_with_users();
      let response = dispatcher
         .handle(&request(
            RequestKind::GetSchema,
            &[("typeName", Value::Int(7))],
         ))
         .await;
      assert!(!response.success);
      assert!(response.error.unwrap().contains("invalid parameter 'typeName'"));
   }

   #[tokio::test]
   async fn test_unknown_schema_message() {
      let dispatcher = dispatcher_with_users();
      let response = dispatcher
         .handle(&request(
            RequestKind::GetSchema,
            &[("typeName", Value::String("Nope".into()))],
         ))
         .await;
      assert!(!response.success);
      assert_eq!(response.error.as_deref(), Some("Schema 'Nope' not found"));
   }

   #[tokio::test]
   async fn test_object_id_primary_key_unwraps_to_scalar() {
      let dispatcher = dispatcher_with_users();

      let mut data = IndexMap::new();
      data.insert(
         "id".to_string(),
         Value::ObjectId("6500a1b2c3d4e5f6a7b8c9d0".into()),
      );
      data.insert("name".to_string(), Value::String("Alice".into()));
      let response = dispatcher
         .handle(&request(
            RequestKind::CreateDocument,
            &[
               ("typeName", Value::String("User".into())),
               ("data", Value::Object(data)),
            ],
         ))
         .await;
      assert!(response.success, "{:?}", response.error);

      // The typed wrapper fetches the same document as the bare string.
      let response = dispatcher
         .handle(&request(
            RequestKind::GetDocument,
            &[
               ("typeName", Value::String("User".into())),
               (
                  "primaryKey",
                  Value::ObjectId("6500a1b2c3d4e5f6a7b8c9d0".into()),
               ),
            ],
         ))
         .await;
      assert!(response.success);
      assert_eq!(
         response.data.unwrap().get("name"),
         Some(&Value::String("Alice".into()))
      );
   }

   #[tokio::test]
   async fn test_update_accepts_changes_alias() {
      let dispatcher = dispatcher_with_users();

      let mut data = IndexMap::new();
      data.insert("id".to_string(), Value::String("u1".into()));
      data.insert("name".to_string(), Value::String("Alice".into()));
      dispatcher
         .handle(&request(
            RequestKind::CreateDocument,
            &[
               ("typeName", Value::String("User".into())),
               ("data", Value::Object(data)),
            ],
         ))
         .await;

      let mut changes = IndexMap::new();
      changes.insert("name".to_string(), Value::String("Bob".into()));
      let response = dispatcher
         .handle(&request(
            RequestKind::UpdateDocument,
            &[
               ("typeName", Value::String("User".into())),
               ("primaryKey", Value::String("u1".into())),
               ("changes", Value::Object(changes)),
            ],
         ))
         .await;
      assert!(response.success, "{:?}", response.error);
      assert_eq!(
         response.data.unwrap().get("name"),
         Some(&Value::String("Bob".into()))
      );
   }

   #[tokio::test]
   async fn test_query_applies_defaults() {
      let dispatcher = dispatcher_with_users();
      let response = dispatcher
         .handle(&request(
            RequestKind::QueryDocuments,
            &[("typeName", Value::String("User".into()))],
         ))
         .await;
      assert!(response.success);
      let data = response.data.unwrap();
      assert_eq!(data.get("limit"), Some(&Value::Int(50)));
      assert_eq!(data.get("skip"), Some(&Value::Int(0)));
      assert_eq!(data.get("hasMore"), Some(&Value::Bool(false)));
   }

   #[tokio::test]
   async fn test_response_echoes_request_id() {
      let dispatcher = dispatcher_with_users();
      for id in ["a", "b", "c"] {
         let response = dispatcher.handle(&Request::new(id, RequestKind::Ping)).await;
         assert_eq!(response.id, id);
      }
   }
}
