//! Registry of open clients.
//!
//! A client is a browsing context (an open page) whose requests flow through
//! the fetch handler. Each client records which generation controls it; a
//! freshly seen client keeps whatever generation was active when it first
//! appeared, until a successful activation claims it.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Identifies one open client.
pub type ClientId = Uuid;

/// Tracks clients and the generation controlling each.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Option<String>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client if it has not been seen before.
    ///
    /// `controlling` is the generation in control at first sight; an already
    /// registered client keeps its current controller.
    pub async fn register(&self, client: ClientId, controlling: Option<String>) {
        let mut clients = self.clients.write().await;
        clients.entry(client).or_insert_with(|| {
            debug!(client = %client, controlling = ?controlling, "Registered client");
            controlling
        });
    }

    /// The generation controlling a client, if the client is known.
    pub async fn controller_of(&self, client: ClientId) -> Option<Option<String>> {
        self.clients.read().await.get(&client).cloned()
    }

    /// Forcibly bring every registered client under `generation`'s control.
    ///
    /// Returns how many clients changed controller.
    pub async fn claim(&self, generation: &str) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for controlling in clients.values_mut() {
            if controlling.as_deref() != Some(generation) {
                *controlling = Some(generation.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    /// Number of clients currently controlled by `generation`.
    pub async fn controlled_by(&self, generation: &str) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|controlling| controlling.as_deref() == Some(generation))
            .count()
    }

    /// Total number of registered clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
