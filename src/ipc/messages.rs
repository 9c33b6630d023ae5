//! Frames exchanged between bus peers

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BusFrame {
    /// Fire-and-forget message on a channel
    Data { channel: String, payload: Value },

    /// Query answered by the peer that registered a responder for `channel`
    Request {
        id: u64,
        channel: String,
        payload: Value,
    },

    /// Answer to the request with the same id
    Reply { id: u64, payload: Value },
}
