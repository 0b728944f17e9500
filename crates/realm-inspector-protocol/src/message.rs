//! Message envelope and payload types.
//!
//! Every frame on the wire carries exactly one [`Message`], encoded as
//! `{"type": "request" | "response" | "notification", "payload": {...}}`.
//! Unknown envelope tags and unknown request kinds are decode errors; a
//! request must never silently degrade into a different operation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::value::Value;

/// Current UTC time as an RFC 3339 string, the timestamp format used on
/// every response and notification.
pub fn rfc3339_now() -> String {
   OffsetDateTime::now_utc()
      .format(&Rfc3339)
      .unwrap_or_default()
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Message {
   Request(Request),
   Response(Response),
   Notification(Notification),
}

/// The closed set of operations a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
   Ping,
   GetRealmInfo,
   ListSchemas,
   GetSchema,
   QueryDocuments,
   GetDocument,
   CountDocuments,
   CreateDocument,
   UpdateDocument,
   DeleteDocument,
   DeleteAllInCollection,
   DeleteAllInDatabase,
   Subscribe,
   Unsubscribe,
}

/// A client request. `id` is opaque to the server and echoed verbatim in
/// the matching response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
   pub id: String,
   #[serde(rename = "type")]
   pub kind: RequestKind,
   #[serde(default)]
   pub params: Option<IndexMap<String, Value>>,
}

impl Request {
   pub fn new(id: impl Into<String>, kind: RequestKind) -> Request {
      Request {
         id: id.into(),
         kind,
         params: None,
      }
   }

   pub fn with_params(mut self, params: IndexMap<String, Value>) -> Request {
      self.params = Some(params);
      self
   }

   /// Looks up a parameter. Absent when there is no params map at all.
   pub fn param(&self, name: &str) -> Option<&Value> {
      self.params.as_ref().and_then(|params| params.get(name))
   }
}

/// The server's answer to exactly one request. Exactly one of
/// `data`/`error` carries meaning, selected by `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
   pub id: String,
   pub success: bool,
   #[serde(default)]
   pub data: Option<Value>,
   #[serde(default)]
   pub error: Option<String>,
   pub timestamp: String,
}

impl Response {
   /// A successful response carrying `data`, stamped with the current time.
   pub fn ok(id: impl Into<String>, data: Value) -> Response {
      Response {
         id: id.into(),
         success: true,
         data: Some(data),
         error: None,
         timestamp: rfc3339_now(),
      }
   }

   /// A failed response carrying a human-readable error.
   pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Response {
      Response {
         id: id.into(),
         success: false,
         data: None,
         error: Some(error.into()),
         timestamp: rfc3339_now(),
      }
   }
}

/// A change notification fanned out to the client owning a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
   pub subscription_id: String,
   pub type_name: String,
   pub changes: ChangeSet,
   pub timestamp: String,
}

impl Notification {
   pub fn new(
      subscription_id: impl Into<String>,
      type_name: impl Into<String>,
      changes: ChangeSet,
   ) -> Notification {
      Notification {
         subscription_id: subscription_id.into(),
         type_name: type_name.into(),
         changes,
         timestamp: rfc3339_now(),
      }
   }
}

/// The diff delivered in a notification.
///
/// `insertions` and `modifications` hold fully serialized documents at
/// their new state. `deletions` holds stable identifiers of removed rows;
/// when the engine cannot supply primary keys for deleted rows the entries
/// are pre-delete ordinal indices rendered as decimal strings (a known
/// limitation of the change feed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
   pub insertions: Vec<Value>,
   pub modifications: Vec<Value>,
   pub deletions: Vec<String>,
}

impl ChangeSet {
   pub fn is_empty(&self) -> bool {
      self.insertions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_request_envelope_shape() {
      let message = Message::Request(Request::new("r1", RequestKind::Ping));
      let json = serde_json::to_value(&message).unwrap();
      assert_eq!(json["type"], "request");
      assert_eq!(json["payload"]["id"], "r1");
      assert_eq!(json["payload"]["type"], "ping");
   }

   #[test]
   fn test_request_kind_wire_names() {
      let json = serde_json::to_value(RequestKind::GetRealmInfo).unwrap();
      assert_eq!(json, "getRealmInfo");
      let json = serde_json::to_value(RequestKind::DeleteAllInCollection).unwrap();
      assert_eq!(json, "deleteAllInCollection");
   }

   #[test]
   fn test_unknown_request_kind_is_decode_error() {
      let text = r#"{"type":"request","payload":{"id":"r1","type":"pwn"}}"#;
      assert!(serde_json::from_str::<Message>(text).is_err());
   }

   #[test]
   fn test_unknown_envelope_tag_is_decode_error() {
      let text = r#"{"type":"telemetry","payload":{}}"#;
      assert!(serde_json::from_str::<Message>(text).is_err());
   }

   #[test]
   fn test_missing_params_decodes_as_none() {
      let text = r#"{"type":"request","payload":{"id":"r1","type":"listSchemas"}}"#;
      let Message::Request(request) = serde_json::from_str::<Message>(text).unwrap() else {
         panic!("expected request");
      };
      assert!(request.params.is_none());
   }

   #[test]
   fn test_response_serializes_explicit_nulls() {
      let response = Response::ok("r1", Value::Bool(true));
      let json = serde_json::to_value(&response).unwrap();
      assert!(json["error"].is_null());
      assert_eq!(json["success"], true);

      let response = Response::failure("r2", "nope");
      let json = serde_json::to_value(&response).unwrap();
      assert!(json["data"].is_null());
      assert_eq!(json["error"], "nope");
   }

   #[test]
   fn test_response_timestamp_is_rfc3339() {
      let response = Response::ok("r1", Value::Null);
      assert!(
         OffsetDateTime::parse(&response.timestamp, &Rfc3339).is_ok(),
         "timestamp {} should parse",
         response.timestamp
      );
   }

   #[test]
   fn test_notification_uses_camel_case_keys() {
      let notification = Notification::new("s1", "User", ChangeSet::default());
      let json = serde_json::to_value(Message::Notification(notification)).unwrap();
      assert_eq!(json["type"], "notification");
      assert_eq!(json["payload"]["subscriptionId"], "s1");
      assert_eq!(json["payload"]["typeName"], "User");
      assert!(json["payload"]["changes"]["insertions"].is_array());
   }

   #[test]
   fn test_change_set_is_empty() {
      let mut changes = ChangeSet::default();
      assert!(changes.is_empty());
      changes.deletions.push("0".to_string());
      assert!(!changes.is_empty());
   }
}
