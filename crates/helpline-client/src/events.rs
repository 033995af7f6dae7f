use serde::Serialize;

use helpline_shared::TicketStatus;

/// Conversation updates surfaced to the embedding frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConversationEvent {
    /// New messages arrived in the shared log.
    MessagesUpdated { new_messages: usize },
    /// The ticket status changed under us.
    StatusChanged { status: TicketStatus },
    /// The conversation was closed; polling stops.
    ConversationClosed,
}
