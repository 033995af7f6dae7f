use serde::{Deserialize, Serialize};

use crate::types::Attachment;

/// The structure serialized into `Message.content`: the message text plus
/// the attachments uploaded with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageEnvelope {
    pub fn new(text: String, attachments: Vec<Attachment>) -> Self {
        Self { text, attachments }
    }

    pub fn text_only(text: String) -> Self {
        Self {
            text,
            attachments: Vec::new(),
        }
    }

    /// Encode into the single text blob stored in `Message.content`.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("envelope serialization")
    }

    /// Decode a message content blob. Never fails: content that does not
    /// parse as an envelope (legacy bare strings, foreign JSON) is treated
    /// as plain text with no attachments.
    pub fn decode(content: &str) -> Self {
        match serde_json::from_str::<Self>(content) {
            Ok(envelope) => envelope,
            Err(_) => Self::text_only(content.to_string()),
        }
    }
}
