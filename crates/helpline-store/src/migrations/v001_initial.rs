//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `tickets` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Tickets (aggregate header)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS tickets (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    title           TEXT NOT NULL,
    description     TEXT NOT NULL,               -- first message's text, kept for display
    user_name       TEXT NOT NULL,
    user_email      TEXT NOT NULL,               -- authorization anchor for user-role access
    project_id      TEXT,                        -- optional contextual tag, no FK
    project_name    TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'open',-- 'open' | 'in-progress' | 'closed'
    is_anonymous    INTEGER NOT NULL DEFAULT 1,  -- boolean 0/1
    attachments     TEXT NOT NULL DEFAULT '[]',  -- JSON array, initial-submission copies
    created_at      TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    updated_at      TEXT NOT NULL,
    last_message_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
CREATE INDEX IF NOT EXISTS idx_tickets_last_message
    ON tickets(last_message_at DESC);

-- ----------------------------------------------------------------
-- Messages (append-only conversation log)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    ticket_id   TEXT NOT NULL,                   -- FK -> tickets(id)
    sender      TEXT NOT NULL,                   -- 'admin' | 'user' | submitter display name
    sender_info TEXT NOT NULL,                   -- authenticated email or staff id
    content     TEXT NOT NULL,                   -- JSON envelope, or legacy bare text
    timestamp   TEXT NOT NULL,                   -- ISO-8601, the ordering key

    FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_ticket_ts
    ON messages(ticket_id, timestamp ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
