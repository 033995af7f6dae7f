/// Product name, also the default instance name
pub const APP_NAME: &str = "Helpline";

/// Port the API server binds when HTTP_ADDR is unset
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Conversation poll interval in seconds
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Maximum size of a single attachment in bytes (10 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 10 * 1024 * 1024;

/// Maximum number of attachments per message
pub const MAX_ATTACHMENTS_PER_MESSAGE: usize = 5;

/// Ticket-scoped token lifetime in seconds (7 days)
pub const TICKET_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Byte length of Ed25519 key material (public keys and signing seeds)
pub const PUBKEY_SIZE: usize = 32;
