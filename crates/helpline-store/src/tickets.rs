//! Ticket aggregate operations: create, read, message append and status
//! updates.  This is the single authority for ticket state transitions.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use helpline_shared::{Attachment, Message, MessageEnvelope, Sender, Ticket, TicketStatus};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::NewTicket;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a ticket from an anonymous submission.
    ///
    /// Assigns a fresh id, sets status `open`, and seeds the message log with
    /// exactly one message: the description plus any uploaded attachments,
    /// posted under the submitter's display name.  Header, initial message
    /// and all three timestamps land in one transaction.
    pub fn create_ticket(&mut self, new: NewTicket) -> Result<Ticket> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let envelope = MessageEnvelope::new(new.description.clone(), new.attachments.clone());
        let initial = Message {
            id: Uuid::new_v4(),
            sender: Sender::Submitter {
                name: new.user_name.clone(),
                email: new.user_email.clone(),
            },
            content: envelope.encode(),
            timestamp: now,
        };

        let attachments_json = serde_json::to_string(&new.attachments)?;

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO tickets (id, title, description, user_name, user_email, project_id,
                                  project_name, status, is_anonymous, attachments,
                                  created_at, updated_at, last_message_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?11)",
            params![
                id.to_string(),
                new.title,
                new.description,
                new.user_name,
                new.user_email,
                new.project_id,
                new.project_name,
                TicketStatus::Open.as_str(),
                true,
                attachments_json,
                now.to_rfc3339(),
            ],
        )?;
        insert_message(&tx, id, &initial)?;
        tx.commit()?;

        self.get_ticket(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a full ticket snapshot: header plus the ordered message log.
    pub fn get_ticket(&self, ticket_id: Uuid) -> Result<Ticket> {
        let mut ticket = self
            .conn()
            .query_row(
                "SELECT id, title, description, user_name, user_email, project_id,
                        project_name, status, is_anonymous, attachments,
                        created_at, updated_at, last_message_at
                 FROM tickets
                 WHERE id = ?1",
                params![ticket_id.to_string()],
                row_to_ticket,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        ticket.messages = self.get_messages_for_ticket(ticket_id)?;
        Ok(ticket)
    }

    /// A ticket's message log, re-sorted by timestamp on every read.
    ///
    /// Insertion order is not trusted: out-of-order or concurrent appends
    /// must still observe an ascending log.
    pub fn get_messages_for_ticket(&self, ticket_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, sender_info, content, timestamp
             FROM messages
             WHERE ticket_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![ticket_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// List ticket headers for the dashboard, newest activity first.
    ///
    /// The returned tickets carry an empty message log; conversation views
    /// fetch the full snapshot with [`Database::get_ticket`].
    pub fn list_tickets(&self, filter: Option<TicketStatus>) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();

        match filter {
            Some(status) => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, title, description, user_name, user_email, project_id,
                            project_name, status, is_anonymous, attachments,
                            created_at, updated_at, last_message_at
                     FROM tickets
                     WHERE status = ?1
                     ORDER BY last_message_at DESC",
                )?;
                let rows = stmt.query_map(params![status.as_str()], row_to_ticket)?;
                for row in rows {
                    tickets.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, title, description, user_name, user_email, project_id,
                            project_name, status, is_anonymous, attachments,
                            created_at, updated_at, last_message_at
                     FROM tickets
                     ORDER BY last_message_at DESC",
                )?;
                let rows = stmt.query_map([], row_to_ticket)?;
                for row in rows {
                    tickets.push(row?);
                }
            }
        }

        Ok(tickets)
    }

    // ------------------------------------------------------------------
    // Mutate
    // ------------------------------------------------------------------

    /// Append a message to a ticket's conversation log.
    ///
    /// The message gets a fresh id and a server-assigned timestamp, and
    /// `updated_at`/`last_message_at` move to that timestamp.  If the sender
    /// is staff and the ticket is still `open`, the same transaction moves
    /// the ticket to `in-progress`.
    ///
    /// Ownership of `User` senders (email equals the ticket's `user_email`)
    /// is a precondition checked by the caller; the store has no notion of
    /// the authorizer.
    pub fn append_message(
        &mut self,
        ticket_id: Uuid,
        sender: &Sender,
        envelope: &MessageEnvelope,
    ) -> Result<Ticket> {
        let message = Message::new(sender.clone(), envelope.encode());

        let tx = self.conn_mut().transaction()?;

        let current: TicketStatus = tx
            .query_row(
                "SELECT status FROM tickets WHERE id = ?1",
                params![ticket_id.to_string()],
                |row| {
                    let s: String = row.get(0)?;
                    TicketStatus::parse(&s).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            0,
                            rusqlite::types::Type::Text,
                            format!("unknown ticket status: {}", s).into(),
                        )
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        // A staff reply picks up an open ticket.  No other sender/state
        // combination moves status implicitly; in particular a user reply
        // to a closed ticket does not reopen it.
        let next = match (sender, current) {
            (Sender::Admin { .. }, TicketStatus::Open) => TicketStatus::InProgress,
            (_, current) => current,
        };

        insert_message(&tx, ticket_id, &message)?;
        tx.execute(
            "UPDATE tickets SET status = ?1, updated_at = ?2, last_message_at = ?2
             WHERE id = ?3",
            params![
                next.as_str(),
                message.timestamp.to_rfc3339(),
                ticket_id.to_string(),
            ],
        )?;
        tx.commit()?;

        self.get_ticket(ticket_id)
    }

    /// Explicitly set a ticket's status (the status-update surface).
    ///
    /// Accepts any of the three values and bumps `updated_at` only;
    /// `last_message_at` moves exclusively on append.
    pub fn update_status(&self, ticket_id: Uuid, status: TicketStatus) -> Result<Ticket> {
        let now = Utc::now();
        let affected = self.conn().execute(
            "UPDATE tickets SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.to_rfc3339(), ticket_id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        self.get_ticket(ticket_id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert_message(conn: &Connection, ticket_id: Uuid, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, ticket_id, sender, sender_info, content, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.id.to_string(),
            ticket_id.to_string(),
            message.sender.wire_label(),
            message.sender.identifier(),
            message.content,
            message.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Map a `rusqlite::Row` to a [`Ticket`] header (empty message log).
fn row_to_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let description: String = row.get(2)?;
    let user_name: String = row.get(3)?;
    let user_email: String = row.get(4)?;
    let project_id: Option<String> = row.get(5)?;
    let project_name: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    let is_anonymous: bool = row.get(8)?;
    let attachments_json: String = row.get(9)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;
    let last_message_str: String = row.get(12)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = TicketStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown ticket status: {}", status_str).into(),
        )
    })?;
    let attachments: Vec<Attachment> = serde_json::from_str(&attachments_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Ticket {
        id,
        title,
        description,
        user_name,
        user_email,
        project_id,
        project_name,
        status,
        is_anonymous,
        messages: Vec::new(),
        attachments,
        created_at: parse_ts(&created_str, 10)?,
        updated_at: parse_ts(&updated_str, 11)?,
        last_message_at: parse_ts(&last_message_str, 12)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_label: String = row.get(1)?;
    let sender_info: String = row.get(2)?;
    let content: String = row.get(3)?;
    let ts_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id,
        sender: Sender::from_wire(sender_label, sender_info),
        content,
        timestamp: parse_ts(&ts_str, 4)?,
    })
}

fn parse_ts(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
