//! Local state for one open conversation.

use helpline_shared::{Ticket, TicketStatus};

use crate::api::FilePart;

/// Unsent reply text and attachments, owned by the UI.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub text: String,
    pub files: Vec<FilePart>,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.files.clear();
    }
}

/// What a poll refresh did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Snapshot unchanged, nothing to re-render.
    Unchanged,
    /// Snapshot replaced wholesale.
    Updated {
        new_messages: usize,
        status_changed: bool,
    },
}

/// One conversation snapshot plus the user's in-progress draft.
///
/// Poll refreshes replace the snapshot but never touch the draft; only a
/// successful send clears it.
#[derive(Debug, Clone)]
pub struct ConversationView {
    ticket: Ticket,
    pub draft: Draft,
}

impl ConversationView {
    pub fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            draft: Draft::default(),
        }
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn is_closed(&self) -> bool {
        self.ticket.status == TicketStatus::Closed
    }

    /// Fold a freshly polled snapshot into the view.
    ///
    /// The server timestamps every mutation, so an equal `updated_at` means
    /// nothing changed and the render can be skipped.
    pub fn apply_poll(&mut self, fresh: Ticket) -> PollOutcome {
        if fresh.updated_at == self.ticket.updated_at {
            return PollOutcome::Unchanged;
        }

        let new_messages = fresh
            .messages
            .len()
            .saturating_sub(self.ticket.messages.len());
        let status_changed = fresh.status != self.ticket.status;
        self.ticket = fresh;

        PollOutcome::Updated {
            new_messages,
            status_changed,
        }
    }

    /// Adopt the snapshot returned by a successful reply and clear the
    /// draft.
    pub fn apply_reply(&mut self, ticket: Ticket) {
        self.ticket = ticket;
        self.draft.clear();
    }
}
