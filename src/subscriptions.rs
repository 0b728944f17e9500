//! Subscription manager: live observations fanned out to clients.
//!
//! Owns the registry of active subscriptions and the diffing of adapter
//! change events into wire change sets. Observation registration, event
//! delivery and cancellation all happen on the adapter execution context;
//! the sink hops back to the owning client's send queue only at the last
//! step. Delivery is at most once: events for clients that are not
//! `Ready`, or whose membership was already removed by a racing
//! unsubscribe, are dropped and never redelivered.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use realm_inspector_adapter::{AdapterContext, ChangeEvent, ChangeSink, ObservationHandle};
use realm_inspector_protocol::{ChangeSet, Message, Notification, Request, Response, Value};

use crate::Result;
use crate::connection::{ClientHandle, ClientState};
use crate::dispatcher::{object, optional_str, require_str};

struct SubscriptionEntry {
   client: ClientHandle,
   #[allow(dead_code)]
   type_name: String,
   #[allow(dead_code)]
   filter: Option<String>,
   observation: ObservationHandle,
}

pub(crate) struct SubscriptionManager {
   context: Arc<AdapterContext>,
   registry: Arc<Mutex<HashMap<String, SubscriptionEntry>>>,
}

impl SubscriptionManager {
   pub fn new(context: Arc<AdapterContext>) -> SubscriptionManager {
      SubscriptionManager {
         context,
         registry: Arc::new(Mutex::new(HashMap::new())),
      }
   }

   pub fn subscription_count(&self) -> usize {
      self.registry.lock().len()
   }

   /// Handles a `subscribe` request for the given client.
   pub async fn handle_subscribe(&self, client: &ClientHandle, request: &Request) -> Response {
      match self.subscribe(client, request).await {
         Ok((subscription_id, type_name)) => Response::ok(
            &request.id,
            object([
               ("subscriptionId", Value::String(subscription_id)),
               ("typeName", Value::String(type_name)),
            ]),
         ),
         Err(error) => Response::failure(&request.id, error.to_string()),
      }
   }

   async fn subscribe(&self, client: &ClientHandle, request: &Request) -> Result<(String, String)> {
      let type_name = require_str(request, "typeName")?;
      let filter = optional_str(request, "filter")?;
      let subscription_id = Uuid::new_v4().to_string();

      let sink = notification_sink(client.clone(), subscription_id.clone(), type_name.clone());

      let registry = Arc::clone(&self.registry);
      let entry_client = client.clone();
      let entry_id = subscription_id.clone();
      let entry_type = type_name.clone();
      self
         .context
         .call(move |adapter| -> realm_inspector_adapter::Result<()> {
            let observation = adapter.observe(&entry_type, filter.as_deref(), sink)?;
            // Membership and registry entry are recorded in the same
            // adapter-thread step as the registration, so no change event
            // can slip in between and find a half-built subscription.
            entry_client.add_subscription(&entry_id);
            registry.lock().insert(
               entry_id.clone(),
               SubscriptionEntry {
                  client: entry_client,
                  type_name: entry_type,
                  filter,
                  observation,
               },
            );
            Ok(())
         })
         .await??;

      debug!(subscription = %subscription_id, client = %client.id(), %type_name, "Subscription created");
      Ok((subscription_id, type_name))
   }

   /// Handles an `unsubscribe` request. Unknown ids still succeed; the
   /// operation is idempotent.
   pub async fn handle_unsubscribe(&self, request: &Request) -> Response {
      let subscription_id = match require_str(request, "subscriptionId") {
         Ok(id) => id,
         Err(error) => return Response::failure(&request.id, error.to_string()),
      };

      self.unsubscribe(&subscription_id).await;
      Response::ok(&request.id, object([("unsubscribed", Value::Bool(true))]))
   }

   async fn unsubscribe(&self, subscription_id: &str) {
      let entry = self.registry.lock().remove(subscription_id);
      let Some(entry) = entry else {
         debug!(subscription = %subscription_id, "Unsubscribe for unknown id ignored");
         return;
      };

      entry.client.remove_subscription(subscription_id);
      let observation = entry.observation;
      let _ = self
         .context
         .call(move |adapter| adapter.unobserve(observation))
         .await;
      debug!(subscription = %subscription_id, "Subscription removed");
   }

   /// Tears down every subscription owned by a disconnected client.
   /// Called from the disconnect callback, so it must not block.
   pub fn drop_client(&self, client: &ClientHandle) {
      let ids = client.take_subscriptions();
      if ids.is_empty() {
         return;
      }

      let mut observations = Vec::with_capacity(ids.len());
      {
         let mut registry = self.registry.lock();
         for id in &ids {
            if let Some(entry) = registry.remove(id) {
               observations.push(entry.observation);
            }
         }
      }

      debug!(
         client = %client.id(),
         count = observations.len(),
         "Tearing down subscriptions for disconnected client"
      );
      let _ = self.context.post(move |adapter| {
         for observation in observations {
            adapter.unobserve(observation);
         }
      });
   }

   /// Tears down every subscription; used on server stop.
   pub fn shutdown(&self) {
      let entries: Vec<(String, SubscriptionEntry)> = {
         let mut registry = self.registry.lock();
         registry.drain().collect()
      };
      if entries.is_empty() {
         return;
      }

      debug!(count = entries.len(), "Tearing down all subscriptions");
      let mut observations = Vec::with_capacity(entries.len());
      for (id, entry) in entries {
         entry.client.remove_subscription(&id);
         observations.push(entry.observation);
      }
      let _ = self.context.post(move |adapter| {
         for observation in observations {
            adapter.unobserve(observation);
         }
      });
   }
}

/// Builds the sink that diffs change events into notifications for the
/// owning client. Runs on the adapter thread.
fn notification_sink(
   client: ClientHandle,
   subscription_id: String,
   type_name: String,
) -> ChangeSink {
   Box::new(move |event| match event {
      // The snapshot delivered at registration is not a change.
      ChangeEvent::Initial { .. } => {}

      ChangeEvent::Error(message) => {
         warn!(subscription = %subscription_id, %message, "Observation reported an error");
      }

      ChangeEvent::Update {
         results,
         deletions,
         insertions,
         modifications,
      } => {
         let changes = ChangeSet {
            insertions: insertions
               .iter()
               .filter_map(|&index| results.get(index).cloned())
               .collect(),
            modifications: modifications
               .iter()
               .filter_map(|&index| results.get(index).cloned())
               .collect(),
            // The feed cannot name deleted rows' primary keys; their
            // pre-delete ordinals stand in.
            deletions: deletions.iter().map(|index| index.to_string()).collect(),
         };
         if changes.is_empty() {
            return;
         }

         if client.state() != ClientState::Ready {
            debug!(
               subscription = %subscription_id,
               "Dropping notification for non-ready client"
            );
            return;
         }
         if !client.has_subscription(&subscription_id) {
            // Unsubscribe raced a pending event; deliver nothing.
            return;
         }

         let notification =
            Notification::new(subscription_id.clone(), type_name.clone(), changes);
         if let Err(error) = client.send_message(&Message::Notification(notification)) {
            debug!(subscription = %subscription_id, %error, "Failed to deliver notification");
         }
      }
   })
}
