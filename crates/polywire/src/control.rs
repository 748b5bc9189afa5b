//! # Control Messages
//!
//! The messages carried on a client session's persistent channel. They are always JSON
//! objects tagged by `"type"`, whatever Format the call payloads use; payload bytes are
//! embedded as UTF-8 text.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Client to server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        event: String,
        listener_id: String,
        /// The subscription arguments, encoded as a tuple of the event's non-dispatch
        /// parameters.
        #[serde(with = "utf8_payload")]
        payload: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { event: String, listener_id: String },
}

/// Server to client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Emitted {
        listener_id: String,
        #[serde(with = "utf8_payload")]
        payload: Vec<u8>,
    },
    /// A rejected subscription. Without a listener id, every stream on the session fails.
    #[serde(rename_all = "camelCase")]
    SubscriptionError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listener_id: Option<String>,
        error: String,
    },
}

impl ClientMessage {
    pub fn listener_id(&self) -> &str {
        match self {
            Self::Subscribe { listener_id, .. } | Self::Unsubscribe { listener_id, .. } => listener_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::ProtocolViolation(format!("not a client control message: {}", e)))
    }
}

impl ServerMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::ProtocolViolation(format!("not a server control message: {}", e)))
    }
}

mod utf8_payload {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::ser;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let text = std::str::from_utf8(bytes).map_err(|_| <S::Error as ser::Error>::custom("payload is not valid UTF-8"))?;
        serializer.serialize_str(text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        String::deserialize(deserializer).map(String::into_bytes)
    }
}
