//! Message bus contract
//!
//! Cross-process messaging as consumed by the screen managers. The Unix
//! socket implementation lives in [`crate::ipc`]; [`RecordingBus`] is the
//! in-process stand-in used by tests.

mod display;

pub use display::{
    AllDisplays, BusDisplayController, DisplayBounds, DisplayController, DisplayInfo,
    HeadlessDisplayController, ScreenPlacement, SharedDisplayController,
};

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type DataHandler = Arc<dyn Fn(Value) + Send + Sync>;
pub type SyncResponder = Arc<dyn Fn(Value) -> Value + Send + Sync>;

pub trait MessageBus: Send + Sync {
    /// Fire-and-forget
    fn send_data(&self, channel: &str, payload: Value);

    /// Blocking round trip
    fn send_data_sync(&self, channel: &str, payload: Value) -> Result<Value>;

    fn listen_for_data(&self, channel: &str, handler: DataHandler);
}

pub type SharedMessageBus = Arc<dyn MessageBus>;

/// Records outbound traffic; inbound traffic is injected with [`RecordingBus::deliver`]
#[derive(Default)]
pub struct RecordingBus {
    sent: Mutex<Vec<(String, Value)>>,
    listeners: Mutex<HashMap<String, Vec<DataHandler>>>,
    responders: Mutex<HashMap<String, SyncResponder>>,
}

impl std::fmt::Debug for RecordingBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingBus")
            .field("sent", &self.sent.lock().map(|s| s.len()).unwrap_or(0))
            .finish()
    }
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_on(&self, channel: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }

    /// Answer `send_data_sync` on `channel`
    pub fn respond_to<F>(&self, channel: &str, responder: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        if let Ok(mut responders) = self.responders.lock() {
            responders.insert(channel.to_string(), Arc::new(responder));
        }
    }

    /// Simulate an inbound message
    pub fn deliver(&self, channel: &str, payload: Value) {
        let handlers: Vec<DataHandler> = self
            .listeners
            .lock()
            .ok()
            .and_then(|l| l.get(channel).cloned())
            .unwrap_or_default();
        for handler in handlers {
            handler(payload.clone());
        }
    }
}

impl MessageBus for RecordingBus {
    fn send_data(&self, channel: &str, payload: Value) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((channel.to_string(), payload));
        }
    }

    fn send_data_sync(&self, channel: &str, payload: Value) -> Result<Value> {
        let responder = self
            .responders
            .lock()
            .ok()
            .and_then(|r| r.get(channel).cloned())
            .ok_or_else(|| anyhow!("No responder for channel '{channel}'"))?;
        Ok(responder(payload))
    }

    fn listen_for_data(&self, channel: &str, handler: DataHandler) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.entry(channel.to_string()).or_default().push(handler);
        }
    }
}
