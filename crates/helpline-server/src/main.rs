//! # helpline-server
//!
//! HTTP API server for the Helpline support-ticket system.
//!
//! The binary wires together:
//! - **Anonymous ticket intake** (multipart form, optional attachments)
//! - **Conversation API** (axum): snapshot reads, message append with the
//!   implicit status transition, explicit status updates, staff listing
//! - **Dual-token authorization**: provider-signed staff tokens and
//!   server-minted ticket-scoped link tokens
//! - **Attachment storage** with all-or-nothing batch uploads
//! - **Email notifications** handed fire-and-forget to a mail relay
//! - **Per-IP rate limiting** on every route

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod notify;
mod rate_limit;
#[cfg(test)]
mod testutil;
mod upload;

use std::sync::{Arc, Mutex};

use chrono::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use helpline_store::Database;

use crate::api::AppState;
use crate::auth::Authorizer;
use crate::blob_store::FsBlobStore;
use crate::config::ServerConfig;
use crate::notify::{HttpMailer, Notifier, NullMailer};
use crate::rate_limit::RateLimiter;
use crate::upload::AttachmentUploader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing (RUST_LOG wins when set)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,helpline_server=debug")),
        )
        .init();

    info!("Starting Helpline server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        http_addr = %config.http_addr,
        base_url = %config.public_base_url,
        mail_relay = config.mail_relay_url.is_some(),
        "Loaded configuration"
    );
    if config.staff_provider_pubkey.is_none() {
        warn!("STAFF_PROVIDER_PUBKEY not configured, staff tokens will be rejected");
    }

    // -----------------------------------------------------------------------
    // 3. Subsystems
    // -----------------------------------------------------------------------

    // Ticket store (platform data dir unless DATABASE_PATH is set)
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = db.path() {
        info!(path = %path.display(), "Ticket store opened");
    }
    let db = Arc::new(Mutex::new(db));

    // Attachment storage (directory is created on demand)
    let blob_store = Arc::new(
        FsBlobStore::new(
            config.blob_storage_path.clone(),
            config.public_base_url.clone(),
        )
        .await?,
    );

    let uploader = Arc::new(AttachmentUploader::new(
        blob_store.clone(),
        config.max_attachment_size,
        config.max_attachments,
    ));

    let authorizer = Arc::new(Authorizer::new(
        config.staff_provider_pubkey,
        &config.token_signing_seed,
        Duration::seconds(config.ticket_token_ttl_secs),
    ));

    let notifier: Arc<dyn Notifier> = match &config.mail_relay_url {
        Some(url) => Arc::new(HttpMailer::new(url.clone(), config.mail_api_key.clone())),
        None => {
            warn!("MAIL_RELAY_URL not set, notifications disabled");
            Arc::new(NullMailer)
        }
    };

    let rate_limiter = RateLimiter::new(config.rate_limit_rate, config.rate_limit_burst);

    let http_addr = config.http_addr;

    // Shared state handed to every handler
    let app_state = AppState {
        db,
        blob_store,
        uploader,
        authorizer,
        notifier,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (evict buckets idle >10 min)
    rate_limit::spawn_purge_task(rate_limiter);

    // -----------------------------------------------------------------------
    // 5. Serve until the listener fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
        }
    }

    Ok(())
}
