//! Store-side input models.
//!
//! The persisted domain types themselves ([`Ticket`](helpline_shared::Ticket),
//! [`Message`](helpline_shared::Message)) live in `helpline-shared` because
//! they cross the wire; this module holds the shapes that only exist on the
//! way *into* the store.

use helpline_shared::Attachment;

/// Everything needed to create a ticket from an anonymous submission.
///
/// The store assigns the id, timestamps and initial status itself; the
/// description becomes the text of the seeded first message, and the
/// attachments (already uploaded by the caller) are copied both into that
/// message's envelope and into the ticket header.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub user_name: String,
    pub user_email: String,
    pub project_id: Option<String>,
    pub project_name: String,
    pub attachments: Vec<Attachment>,
}
