use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket lifecycle status. Transitions only move forward; see the store's
/// append/update rules for when each one fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in-progress" => Some(Self::InProgress),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Who posted a message. Staff and ticket owners post through the authorizer;
// the submitter variant exists only for the initial anonymous-intake message.
// On the wire this collapses to the legacy pair (sender label, senderInfo).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Admin { id: String },
    User { email: String },
    Submitter { name: String, email: String },
}

impl Sender {
    /// Rebuild a sender from the persisted/wire pair.
    pub fn from_wire(label: String, info: String) -> Self {
        match label.as_str() {
            "admin" => Self::Admin { id: info },
            "user" => Self::User { email: info },
            _ => Self::Submitter {
                name: label,
                email: info,
            },
        }
    }

    /// The legacy sender label: `"admin"`, `"user"`, or the submitter's
    /// display name.
    pub fn wire_label(&self) -> &str {
        match self {
            Self::Admin { .. } => "admin",
            Self::User { .. } => "user",
            Self::Submitter { name, .. } => name,
        }
    }

    /// The authenticated identifier behind the post (staff id, owner email,
    /// or submitter email). Audit data, never re-checked after append.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Admin { id } => id,
            Self::User { email } => email,
            Self::Submitter { email, .. } => email,
        }
    }
}

/// One entry in a ticket's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "MessageWire", into = "MessageWire")]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    /// JSON-encoded [`MessageEnvelope`](crate::envelope::MessageEnvelope),
    /// or legacy bare text.
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content,
            timestamp: Utc::now(),
        }
    }
}

// Wire shape of a message: the sender union flattened to its legacy pair.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageWire {
    id: Uuid,
    sender: String,
    sender_info: String,
    content: String,
    timestamp: DateTime<Utc>,
}

impl From<MessageWire> for Message {
    fn from(wire: MessageWire) -> Self {
        Self {
            id: wire.id,
            sender: Sender::from_wire(wire.sender, wire.sender_info),
            content: wire.content,
            timestamp: wire.timestamp,
        }
    }
}

impl From<Message> for MessageWire {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender.wire_label().to_string(),
            sender_info: message.sender.identifier().to_string(),
            content: message.content,
            timestamp: message.timestamp,
        }
    }
}

/// A stored file reference handed back by the blob store. Field names follow
/// the asset-host shape and stay snake_case on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    /// Blob store identifier, required to issue a delete/rollback.
    pub public_id: String,
    pub original_filename: String,
    pub bytes: u64,
    /// `"image"` or `"raw"`.
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// The ticket aggregate: header, ownership fields, ordered message log,
/// status. Messages are ordered by timestamp ascending everywhere this
/// struct appears.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    /// First message's text, duplicated into the header for display.
    pub description: String,
    pub user_name: String,
    /// Authorization anchor for user-role access. Immutable after creation.
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub project_name: String,
    pub status: TicketStatus,
    pub is_anonymous: bool,
    pub messages: Vec<Message>,
    /// Initial-submission attachments, copied into the header.
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "lastMessageTimestamp")]
    pub last_message_at: DateTime<Utc>,
}
