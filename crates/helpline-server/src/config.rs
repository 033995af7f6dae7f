//! Environment-driven server configuration.
//!
//! Every setting has a workable default, so a bare `helpline-server` starts
//! for local development.  The struct is built once in `main` and handed by
//! `Arc` to every subsystem; nothing reads the process environment after
//! startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use helpline_shared::constants::{
    APP_NAME, DEFAULT_HTTP_PORT, MAX_ATTACHMENTS_PER_MESSAGE, MAX_ATTACHMENT_SIZE, PUBKEY_SIZE,
    TICKET_TOKEN_TTL_SECS,
};

/// Runtime settings for one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Explicit SQLite database path.  When unset the platform data
    /// directory is used.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Filesystem path where attachment blobs are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// Public base URL of this instance, used for attachment URLs and the
    /// conversation links embedded in notification mails.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:8080`
    pub public_base_url: String,

    /// Ed25519 public key of the staff identity provider (hex, 64 chars).
    /// Env: `STAFF_PROVIDER_PUBKEY`
    /// Default: unset, which disables staff verification entirely so every
    /// staff token is rejected (development only).
    pub staff_provider_pubkey: Option<[u8; 32]>,

    /// Ed25519 seed for the server's own token-signing key (hex, 64 chars).
    /// Env: `TOKEN_SIGNING_KEY`
    /// Default: random per boot, so emailed links stop working on restart.
    pub token_signing_seed: [u8; 32],

    /// Maximum size of a single attachment in bytes.
    /// Env: `MAX_ATTACHMENT_SIZE`
    pub max_attachment_size: usize,

    /// Maximum number of attachments per message.
    /// Env: `MAX_ATTACHMENTS`
    pub max_attachments: usize,

    /// Lifetime of ticket-scoped link tokens in seconds.
    /// Env: `TICKET_TOKEN_TTL_SECS`
    /// Default: 7 days.
    pub ticket_token_ttl_secs: i64,

    // -- Instance settings --

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Helpline"`
    pub instance_name: String,

    /// Address that receives the new-ticket alert mails.
    /// Env: `SUPPORT_INBOX`
    /// Default: `support@helpline.dev`
    pub support_inbox: String,

    /// Mail relay endpoint that accepts `{to, subject, html}` as JSON.
    /// Env: `MAIL_RELAY_URL`
    /// Default: unset (notifications disabled).
    pub mail_relay_url: Option<String>,

    /// Bearer token for the mail relay.
    /// Env: `MAIL_API_KEY`
    pub mail_api_key: Option<String>,

    /// Sustained per-IP request rate (requests per second).
    /// Env: `RATE_LIMIT_RATE`
    /// Default: `10.0`
    pub rate_limit_rate: f64,

    /// Per-IP burst capacity.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `30.0`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            blob_storage_path: PathBuf::from("./blobs"),
            public_base_url: format!("http://localhost:{}", DEFAULT_HTTP_PORT),
            staff_provider_pubkey: None,
            token_signing_seed: [0u8; 32],
            max_attachment_size: MAX_ATTACHMENT_SIZE,
            max_attachments: MAX_ATTACHMENTS_PER_MESSAGE,
            ticket_token_ttl_secs: TICKET_TOKEN_TTL_SECS,
            instance_name: APP_NAME.to_string(),
            support_inbox: "support@helpline.dev".to_string(),
            mail_relay_url: None,
            mail_api_key: None,
            rate_limit_rate: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from the process environment.  Unset or
    /// unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => {
                    tracing::warn!(value = %addr, "Unparseable HTTP_ADDR, keeping default")
                }
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(hex_key) = std::env::var("STAFF_PROVIDER_PUBKEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.staff_provider_pubkey = Some(key),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid STAFF_PROVIDER_PUBKEY, staff verification disabled"
                    );
                }
            }
        }

        match std::env::var("TOKEN_SIGNING_KEY") {
            Ok(hex_key) => match parse_hex_key(&hex_key) {
                Ok(seed) => config.token_signing_seed = seed,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid TOKEN_SIGNING_KEY, generating a random key");
                    config.token_signing_seed = rand::random();
                }
            },
            Err(_) => {
                tracing::warn!(
                    "TOKEN_SIGNING_KEY not set, generating a random key; emailed ticket links will not survive a restart"
                );
                config.token_signing_seed = rand::random();
            }
        }

        if let Ok(val) = std::env::var("MAX_ATTACHMENT_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_attachment_size = n;
            }
        }

        if let Ok(val) = std::env::var("MAX_ATTACHMENTS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_attachments = n;
            }
        }

        if let Ok(val) = std::env::var("TICKET_TOKEN_TTL_SECS") {
            if let Ok(n) = val.parse::<i64>() {
                config.ticket_token_ttl_secs = n;
            }
        }

        // -- Instance settings --

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(addr) = std::env::var("SUPPORT_INBOX") {
            config.support_inbox = addr;
        }

        if let Ok(url) = std::env::var("MAIL_RELAY_URL") {
            if !url.is_empty() {
                config.mail_relay_url = Some(url);
            }
        }

        if let Ok(key) = std::env::var("MAIL_API_KEY") {
            if !key.is_empty() {
                config.mail_api_key = Some(key);
            }
        }

        if let Ok(val) = std::env::var("RATE_LIMIT_RATE") {
            if let Ok(n) = val.parse::<f64>() {
                config.rate_limit_rate = n;
            }
        }

        if let Ok(val) = std::env::var("RATE_LIMIT_BURST") {
            if let Ok(n) = val.parse::<f64>() {
                config.rate_limit_burst = n;
            }
        }

        // RUST_LOG goes straight to the EnvFilter in main, not through
        // this struct.

        config
    }

    /// Request body cap for the HTTP layer: a full attachment batch plus
    /// form overhead.
    pub fn body_limit(&self) -> usize {
        self.max_attachment_size * self.max_attachments + 1024 * 1024
    }
}

/// Parse a hex string into 32 bytes of Ed25519 key material.
fn parse_hex_key(hex_str: &str) -> Result<[u8; PUBKEY_SIZE], String> {
    let hex_str = hex_str.trim();
    if hex_str.len() != PUBKEY_SIZE * 2 {
        return Err(format!(
            "expected {} hex chars, got {}",
            PUBKEY_SIZE * 2,
            hex_str.len()
        ));
    }

    let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {}", e))?;
    let mut key = [0u8; PUBKEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}
