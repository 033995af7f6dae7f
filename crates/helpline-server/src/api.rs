//! HTTP API: ticket intake, conversation access and attachment serving.
//!
//! Handlers stay thin: request decoding and authorization happen here, the
//! conversation rules live in `helpline-store`, and the write pipelines
//! (`submit_ticket`, `post_reply`) are plain async functions so the service
//! tests can drive them without an HTTP client.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{
        multipart::Field, DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use helpline_shared::constants::POLL_INTERVAL_SECS;
use helpline_shared::{MessageEnvelope, Sender, Ticket, TicketStatus};
use helpline_store::{Database, NewTicket};

use crate::auth::{self, Authorizer};
use crate::blob_store::FsBlobStore;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::notify::{self, Notifier};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::upload::{AttachmentUploader, UploadFile};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub blob_store: Arc<FsBlobStore>,
    pub uploader: Arc<AttachmentUploader>,
    pub authorizer: Arc<Authorizer>,
    pub notifier: Arc<dyn Notifier>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/api/tickets", post(create_ticket).get(list_tickets))
        .route("/api/tickets/{id}", get(get_ticket))
        .route("/api/tickets/{id}/messages", post(append_message))
        .route("/api/tickets/{id}/status", patch(update_status))
        .route("/blobs/{folder}/{name}", get(serve_blob))
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    max_attachment_size: usize,
    max_attachments: usize,
    poll_interval_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTicketResponse {
    success: bool,
    ticket_id: Uuid,
}

#[derive(Deserialize)]
struct ReplyBody {
    content: String,
}

#[derive(Deserialize)]
struct StatusBody {
    status: TicketStatus,
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<TicketStatus>,
}

/// Parsed intake form for a new ticket.
#[derive(Debug)]
struct TicketSubmission {
    title: String,
    user_name: String,
    email: String,
    project_id: Option<String>,
    project_name: String,
    description: String,
    files: Vec<UploadFile>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        max_attachment_size: state.config.max_attachment_size,
        max_attachments: state.config.max_attachments,
        poll_interval_secs: POLL_INTERVAL_SECS,
    })
}

async fn create_ticket(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreateTicketResponse>), ApiError> {
    let submission = read_ticket_form(&mut multipart).await?;
    let ticket = submit_ticket(&state, submission).await?;

    info!(ticket = %ticket.id, "Ticket created");

    Ok((
        StatusCode::CREATED,
        Json(CreateTicketResponse {
            success: true,
            ticket_id: ticket.id,
        }),
    ))
}

async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Ticket>, ApiError> {
    state.authorizer.authorize(bearer_token(&headers), id)?;
    let ticket = lock_db(&state)?.get_ticket(id)?;
    Ok(Json(ticket))
}

async fn list_tickets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    state.authorizer.authorize_staff(bearer_token(&headers))?;
    let tickets = lock_db(&state)?.list_tickets(query.status)?;
    Ok(Json(tickets))
}

async fn append_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Request,
) -> Result<Json<Ticket>, ApiError> {
    let sender = state
        .authorizer
        .authorize(bearer_token(request.headers()), id)?;

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (text, files) = if content_type.starts_with("application/json") {
        let Json(body) = Json::<ReplyBody>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::Validation(format!("Invalid JSON body: {}", e)))?;
        (body.content, Vec::new())
    } else if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::Validation(format!("Multipart error: {}", e)))?;
        read_reply_form(&mut multipart).await?
    } else {
        return Err(ApiError::UnsupportedMediaType(content_type));
    };

    let updated = post_reply(&state, id, sender, text, files).await?;
    Ok(Json(updated))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<StatusBody>,
) -> Result<Json<Ticket>, ApiError> {
    state.authorizer.authorize_staff(bearer_token(&headers))?;
    let updated = lock_db(&state)?.update_status(id, body.status)?;

    info!(ticket = %id, status = %body.status, "Ticket status updated");

    Ok(Json(updated))
}

async fn serve_blob(
    State(state): State<AppState>,
    Path((folder, name)): Path<(String, String)>,
) -> Result<Vec<u8>, ApiError> {
    let data = state.blob_store.read_blob(&folder, &name).await?;
    Ok(data)
}

/// Create a ticket from a parsed intake form: validate, upload the
/// attachment batch, persist, then notify both sides.
async fn submit_ticket(state: &AppState, submission: TicketSubmission) -> Result<Ticket, ApiError> {
    for (value, field) in [
        (&submission.title, "title"),
        (&submission.user_name, "userName"),
        (&submission.email, "email"),
        (&submission.project_name, "projectName"),
        (&submission.description, "description"),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "Missing required field: {}",
                field
            )));
        }
    }

    let attachments = state
        .uploader
        .upload_batch(submission.files, "intake")
        .await?;

    let new_ticket = NewTicket {
        title: submission.title,
        description: submission.description,
        user_name: submission.user_name,
        user_email: submission.email,
        project_id: submission.project_id.filter(|s| !s.trim().is_empty()),
        project_name: submission.project_name,
        attachments: attachments.clone(),
    };

    let created = lock_db(state)?.create_ticket(new_ticket);
    let ticket = match created {
        Ok(ticket) => ticket,
        Err(e) => {
            // The uploads must not outlive a failed insert.
            state.uploader.rollback(&attachments).await;
            return Err(e.into());
        }
    };

    let token = state
        .authorizer
        .issue_ticket_token(ticket.id, &ticket.user_email);
    let link = ticket_link(&state.config, ticket.id, &token);

    notify::spawn(
        state.notifier.clone(),
        notify::ticket_created_alert(&state.config.support_inbox, &ticket),
    );
    notify::spawn(
        state.notifier.clone(),
        notify::ticket_created_ack(&ticket, &link),
    );

    Ok(ticket)
}

/// Append one reply to a conversation on behalf of an authorized sender.
///
/// User senders must additionally match the ticket owner's email; staff
/// replies trigger a notification mail with a fresh conversation link.
async fn post_reply(
    state: &AppState,
    ticket_id: Uuid,
    sender: Sender,
    text: String,
    files: Vec<UploadFile>,
) -> Result<Ticket, ApiError> {
    let ticket = lock_db(state)?.get_ticket(ticket_id)?;

    if let Sender::User { ref email } = sender {
        if !auth::emails_match(email, &ticket.user_email) {
            tracing::warn!(ticket = %ticket_id, "Reply rejected: token email does not own this ticket");
            return Err(ApiError::Ownership);
        }
    }

    if text.trim().is_empty() && files.is_empty() {
        return Err(ApiError::Validation(
            "A message needs text or at least one attachment".to_string(),
        ));
    }

    let folder = format!("ticket-{}", ticket_id);
    let attachments = state.uploader.upload_batch(files, &folder).await?;

    let envelope = MessageEnvelope::new(text, attachments.clone());
    let appended = lock_db(state)?.append_message(ticket_id, &sender, &envelope);
    let updated = match appended {
        Ok(ticket) => ticket,
        Err(e) => {
            // The uploads must not outlive a failed append.
            state.uploader.rollback(&attachments).await;
            return Err(e.into());
        }
    };

    info!(
        ticket = %ticket_id,
        sender = sender.wire_label(),
        attachments = attachments.len(),
        "Message appended"
    );

    if matches!(sender, Sender::Admin { .. }) {
        let token = state
            .authorizer
            .issue_ticket_token(updated.id, &updated.user_email);
        let link = ticket_link(&state.config, updated.id, &token);
        notify::spawn(
            state.notifier.clone(),
            notify::admin_reply_alert(&updated, &link),
        );
    }

    Ok(updated)
}

async fn read_ticket_form(multipart: &mut Multipart) -> Result<TicketSubmission, ApiError> {
    let mut title = String::new();
    let mut user_name = String::new();
    let mut email = String::new();
    let mut project_id = None;
    let mut project_name = String::new();
    let mut description = String::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => title = read_text_field(field).await?,
            "userName" => user_name = read_text_field(field).await?,
            "email" => email = read_text_field(field).await?,
            "projectId" => project_id = Some(read_text_field(field).await?),
            "projectName" => project_name = read_text_field(field).await?,
            "description" => description = read_text_field(field).await?,
            "files" => files.push(read_file_field(field).await?),
            _ => {}
        }
    }

    Ok(TicketSubmission {
        title,
        user_name,
        email,
        project_id,
        project_name,
        description,
        files,
    })
}

async fn read_reply_form(multipart: &mut Multipart) -> Result<(String, Vec<UploadFile>), ApiError> {
    let mut content = String::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "content" => content = read_text_field(field).await?,
            "files" => files.push(read_file_field(field).await?),
            _ => {}
        }
    }

    Ok((content, files))
}

async fn read_text_field(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("Failed to read field: {}", e)))
}

async fn read_file_field(field: Field<'_>) -> Result<UploadFile, ApiError> {
    let filename = field.file_name().unwrap_or("attachment").to_string();
    let content_type = field.content_type().map(|s| s.to_string());
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::Validation(format!("Failed to read file field: {}", e)))?;

    Ok(UploadFile {
        filename,
        content_type,
        bytes,
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|auth| auth.strip_prefix("Bearer ").unwrap_or(auth).trim())
}

/// Conversation link embedded in notification mails.  The web frontend
/// reads the token from the query string.
fn ticket_link(config: &ServerConfig, ticket_id: Uuid, token: &str) -> String {
    format!(
        "{}/tickets/{}?token={}",
        config.public_base_url, ticket_id, token
    )
}

fn lock_db(state: &AppState) -> Result<MutexGuard<'_, Database>, ApiError> {
    state
        .db
        .lock()
        .map_err(|_| ApiError::Internal("Database lock poisoned".to_string()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
