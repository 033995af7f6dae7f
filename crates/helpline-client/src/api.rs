//! HTTP client for the Helpline ticket API.
//!
//! One [`TicketApi`] talks to one server.  The bearer is either a
//! provider-signed staff token or the ticket token lifted from an emailed
//! conversation link; the server decides what it opens.

use bytes::Bytes;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use helpline_shared::{Ticket, TicketStatus};

use crate::error::ClientError;

/// One file picked for upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// The anonymous intake form.
#[derive(Debug, Clone, Default)]
pub struct NewTicketForm {
    pub title: String,
    pub user_name: String,
    pub email: String,
    pub project_id: Option<String>,
    pub project_name: String,
    pub description: String,
    pub files: Vec<FilePart>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketResponse {
    pub success: bool,
    pub ticket_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub max_attachment_size: usize,
    pub max_attachments: usize,
    pub poll_interval_secs: u64,
}

#[derive(Serialize)]
struct ReplyBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct StatusBody {
    status: TicketStatus,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct TicketApi {
    client: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl TicketApi {
    /// Unauthenticated client, enough for intake and `/info`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: None,
        }
    }

    /// Client that sends `Authorization: Bearer <token>` on every request.
    pub fn with_bearer(base_url: &str, bearer: &str) -> Self {
        let mut api = Self::new(base_url);
        api.bearer = Some(bearer.to_string());
        api
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit the anonymous intake form.
    pub async fn create_ticket(
        &self,
        form: NewTicketForm,
    ) -> Result<CreateTicketResponse, ClientError> {
        let mut body = multipart::Form::new()
            .text("title", form.title)
            .text("userName", form.user_name)
            .text("email", form.email)
            .text("projectName", form.project_name)
            .text("description", form.description);
        if let Some(project_id) = form.project_id {
            body = body.text("projectId", project_id);
        }
        for file in form.files {
            body = body.part("files", file_part(file)?);
        }

        let response = self
            .request(reqwest::Method::POST, "/api/tickets")
            .multipart(body)
            .send()
            .await?;
        decode(response).await
    }

    /// Fetch the full conversation snapshot.
    pub async fn fetch_ticket(&self, ticket_id: Uuid) -> Result<Ticket, ClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/tickets/{}", ticket_id))
            .send()
            .await?;
        decode(response).await
    }

    /// Append a text-only reply.
    pub async fn send_reply(&self, ticket_id: Uuid, content: &str) -> Result<Ticket, ClientError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/tickets/{}/messages", ticket_id),
            )
            .json(&ReplyBody { content })
            .send()
            .await?;
        decode(response).await
    }

    /// Append a reply with attachments.
    pub async fn send_reply_with_files(
        &self,
        ticket_id: Uuid,
        content: &str,
        files: Vec<FilePart>,
    ) -> Result<Ticket, ClientError> {
        let mut body = multipart::Form::new().text("content", content.to_string());
        for file in files {
            body = body.part("files", file_part(file)?);
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/tickets/{}/messages", ticket_id),
            )
            .multipart(body)
            .send()
            .await?;
        decode(response).await
    }

    /// Staff: move a ticket to a new status.
    pub async fn set_status(
        &self,
        ticket_id: Uuid,
        status: TicketStatus,
    ) -> Result<Ticket, ClientError> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/api/tickets/{}/status", ticket_id),
            )
            .json(&StatusBody { status })
            .send()
            .await?;
        decode(response).await
    }

    /// Staff: list conversation headers, optionally filtered by status.
    pub async fn list_tickets(
        &self,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, ClientError> {
        let mut request = self.request(reqwest::Method::GET, "/api/tickets");
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }

        let response = request.send().await?;
        decode(response).await
    }

    pub async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let response = self.request(reqwest::Method::GET, "/info").send().await?;
        decode(response).await
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref bearer) = self.bearer {
            builder = builder.bearer_auth(bearer);
        }
        builder
    }
}

fn file_part(file: FilePart) -> Result<multipart::Part, ClientError> {
    let mut part = multipart::Part::bytes(file.bytes.to_vec()).file_name(file.filename);
    if let Some(content_type) = file.content_type {
        part = part
            .mime_str(&content_type)
            .map_err(|e| ClientError::BadRequest(format!("Bad content type: {}", e)))?;
    }
    Ok(part)
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        // The server puts its message in {"error": ...}; fall back to the
        // status line for anything else in the path.
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let api = TicketApi::new("http://localhost:8080/");
        assert_eq!(api.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_with_bearer_keeps_token() {
        let api = TicketApi::with_bearer("http://localhost:8080", "tok");
        assert_eq!(api.bearer.as_deref(), Some("tok"));
    }

    #[test]
    fn test_file_part_rejects_bad_mime() {
        let file = FilePart {
            filename: "a.png".to_string(),
            content_type: Some("not a mime".to_string()),
            bytes: Bytes::from_static(b"x"),
        };
        assert!(matches!(file_part(file), Err(ClientError::BadRequest(_))));
    }
}
