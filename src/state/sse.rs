use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Broadcast hub behind the view SSE stream.
///
/// Remembers the last event of each name so a client that connects late
/// starts from the current view and status.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
    latest: Mutex<BTreeMap<String, ServerEvent>>,
}

impl SseHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender,
            latest: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a subscriber. Returns the replay of the latest named events
    /// alongside the live receiver.
    pub fn subscribe(&self) -> (Vec<ServerEvent>, broadcast::Receiver<ServerEvent>) {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = self.sender.subscribe();
        (latest.values().cloned().collect(), receiver)
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(name) = &event.event {
            latest.insert(name.clone(), event.clone());
        }
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscribers_get_the_latest_of_each_event() {
        let hub = SseHub::new(4);
        hub.broadcast(ServerEvent::new("view", "1"));
        hub.broadcast(ServerEvent::new("view", "2"));
        hub.broadcast(ServerEvent::new("status", "connected"));

        let (replay, mut receiver) = hub.subscribe();
        let data: Vec<_> = replay.iter().map(|event| event.data.as_str()).collect();
        assert_eq!(data, ["connected", "2"]);

        hub.broadcast(ServerEvent::new("view", "3"));
        assert_eq!(receiver.recv().await.unwrap().data, "3");
    }
}
