//! Application instances connected over server-sent events.
//!
//! Each open `/__agent/clients` stream is one instance. Messages the agent
//! posts are pushed down that stream as JSON `data:` lines.

use async_trait::async_trait;
use axum::response::sse::Event;
use futures::stream::{self, Stream, StreamExt};
use offline_agent::{AgentError, ClientId, ClientRegistry, OutboundMessage};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

type Senders = HashMap<ClientId, UnboundedSender<OutboundMessage>>;

/// Registry of connected instances.
#[derive(Default)]
pub struct BroadcastClients {
    senders: RwLock<Senders>,
}

impl BroadcastClients {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new instance and return its id and inbox.
    pub fn connect(&self) -> (ClientId, UnboundedReceiver<OutboundMessage>) {
        let id = ClientId(uuid::Uuid::new_v4().to_string());
        let (tx, rx) = unbounded_channel();
        self.write().insert(id.clone(), tx);
        info!("Client {} connected", id);
        (id, rx)
    }

    pub fn disconnect(&self, id: &ClientId) {
        if self.write().remove(id).is_some() {
            info!("Client {} disconnected", id);
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Senders> {
        self.senders.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Senders> {
        self.senders.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ClientRegistry for BroadcastClients {
    async fn match_all(&self) -> offline_agent::Result<Vec<ClientId>> {
        Ok(self.read().keys().cloned().collect())
    }

    async fn post_message(
        &self,
        client: &ClientId,
        message: &OutboundMessage,
    ) -> offline_agent::Result<()> {
        let sender = self.read().get(client).cloned();
        let delivered = sender.is_some_and(|tx| tx.send(message.clone()).is_ok());
        if delivered {
            return Ok(());
        }
        self.disconnect(client);
        Err(AgentError::ClientGone(client.to_string()))
    }
}

/// Removes the instance when its stream is dropped.
struct Connection {
    clients: Arc<BroadcastClients>,
    id: ClientId,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.clients.disconnect(&self.id);
    }
}

/// Event stream for a newly connected instance.
///
/// The first event (`connected`) carries the assigned client id; every later
/// event is one outbound message.
pub fn event_stream(
    clients: Arc<BroadcastClients>,
) -> impl Stream<Item = Result<Event, axum::Error>> + Send {
    let (id, inbox) = clients.connect();
    let hello = Event::default()
        .event("connected")
        .json_data(json!({ "client_id": id.0 }));

    let connection = Connection { clients, id };
    let messages = stream::unfold((inbox, connection), |(mut inbox, connection)| async move {
        let message = inbox.recv().await?;
        debug!("Pushing {:?} to client {}", message, connection.id);
        let event = Event::default().json_data(&message);
        Some((event, (inbox, connection)))
    });

    stream::once(async move { hello }).chain(messages)
}
