use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::limits::NOTIFY_CHANNEL_CAPACITY;
use crate::model::BookingEvent;

/// Broadcast hub for booking events per facility.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<BookingEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a facility. Creates the channel if needed.
    pub fn subscribe(&self, facility_name: &str) -> broadcast::Receiver<BookingEvent> {
        let sender = self
            .channels
            .entry(facility_name.to_string())
            .or_insert_with(|| broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, facility_name: &str, event: &BookingEvent) {
        if let Some(sender) = self.channels.get(facility_name) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a facility's channel; current receivers see it close.
    pub fn remove(&self, facility_name: &str) {
        self.channels.remove(facility_name);
    }
}
