//! Message-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

/// Message payload type. Audio messages always carry their recording URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio {
        #[serde(rename = "audioUrl")]
        audio_url: String,
    },
}

impl MessageKind {
    pub fn audio_url(&self) -> Option<&str> {
        match self {
            MessageKind::Text => None,
            MessageKind::Audio { audio_url } => Some(audio_url),
        }
    }
}

/// Fields a client supplies when appending a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub sender_role: Role,
    pub original_text: String,
    pub translated_text: Option<String>,
    /// Sender's language at send time
    pub language: String,
    #[serde(flatten)]
    pub kind: MessageKind,
}

/// Persisted chat message. Immutable once written.
///
/// `id`, `seq` and `timestamp` are assigned by the store; `seq` is the write
/// position inside the room and is the only ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub sender_role: Role,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub language: String,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl Message {
    pub fn from_new(new: NewMessage, id: String, seq: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            seq,
            timestamp,
            sender_role: new.sender_role,
            original_text: new.original_text,
            translated_text: new.translated_text,
            language: new.language,
            kind: new.kind,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, MessageKind::Audio { .. })
    }
}
