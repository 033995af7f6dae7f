//! Email notifications.
//!
//! Mails are handed to a relay service as JSON; the relay owns delivery,
//! retries and the sender address.  Dispatch is fire-and-forget: a failed
//! notification is logged and never fails the HTTP request that caused it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use helpline_shared::Ticket;

/// One outbound email.
#[derive(Debug, Clone, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Mail relay request failed: {0}")]
    Transport(String),

    #[error("Mail relay returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError>;
}

/// POSTs mails as JSON to the configured relay endpoint.
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(relay_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url,
            api_key,
        }
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.relay_url).json(mail);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }

        debug!(to = %mail.to, subject = %mail.subject, "Mail dispatched to relay");
        Ok(())
    }
}

/// Stands in when no mail relay is configured; drops mails after logging.
pub struct NullMailer;

#[async_trait]
impl Notifier for NullMailer {
    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError> {
        debug!(to = %mail.to, subject = %mail.subject, "Mail relay not configured, dropping mail");
        Ok(())
    }
}

/// Dispatch a mail on a detached task.  Errors are logged, nothing is
/// reported back to the caller.
pub fn spawn(notifier: Arc<dyn Notifier>, mail: Mail) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send_mail(&mail).await {
            warn!(
                to = %mail.to,
                subject = %mail.subject,
                error = %e,
                "Failed to send notification"
            );
        }
    });
}

/// Minimal HTML escaping for interpolated user strings.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Alert to the support inbox about a freshly opened ticket.
pub fn ticket_created_alert(support_inbox: &str, ticket: &Ticket) -> Mail {
    Mail {
        to: support_inbox.to_string(),
        subject: format!("[{}] New ticket: {}", ticket.project_name, ticket.title),
        html: format!(
            "<h2>New support ticket</h2>\
             <p><strong>{}</strong> ({}) opened a ticket for <strong>{}</strong>.</p>\
             <blockquote>{}</blockquote>",
            escape(&ticket.user_name),
            escape(&ticket.user_email),
            escape(&ticket.project_name),
            escape(&ticket.description),
        ),
    }
}

/// Acknowledgement to the submitter, carrying their conversation link.
pub fn ticket_created_ack(ticket: &Ticket, link: &str) -> Mail {
    Mail {
        to: ticket.user_email.clone(),
        subject: format!("We received your ticket: {}", ticket.title),
        html: format!(
            "<p>Hi {},</p>\
             <p>Thanks for reaching out. We opened the ticket <strong>{}</strong> \
             and will get back to you soon.</p>\
             <p>You can follow the conversation here: <a href=\"{}\">{}</a></p>",
            escape(&ticket.user_name),
            escape(&ticket.title),
            link,
            link,
        ),
    }
}

/// Reply alert to the ticket owner, carrying a fresh conversation link.
pub fn admin_reply_alert(ticket: &Ticket, link: &str) -> Mail {
    Mail {
        to: ticket.user_email.clone(),
        subject: format!("New reply on your ticket: {}", ticket.title),
        html: format!(
            "<p>Hi {},</p>\
             <p>Our support team replied to your ticket <strong>{}</strong>.</p>\
             <p>Read and answer here: <a href=\"{}\">{}</a></p>",
            escape(&ticket.user_name),
            escape(&ticket.title),
            link,
            link,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::recording_notifier;
    use chrono::Utc;
    use helpline_shared::TicketStatus;
    use uuid::Uuid;

    fn sample_ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            title: "Search <broken>".to_string(),
            description: "It returns nothing & errors".to_string(),
            user_name: "Ada".to_string(),
            user_email: "ada@example.com".to_string(),
            project_id: None,
            project_name: "docs".to_string(),
            status: TicketStatus::Open,
            is_anonymous: true,
            messages: Vec::new(),
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
            last_message_at: now,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a & <b>"), "a &amp; &lt;b&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_created_alert_goes_to_support_inbox() {
        let mail = ticket_created_alert("support@example.com", &sample_ticket());
        assert_eq!(mail.to, "support@example.com");
        assert!(mail.subject.contains("Search <broken>"));
        assert!(mail.html.contains("&lt;broken&gt;"));
        assert!(mail.html.contains("ada@example.com"));
    }

    #[test]
    fn test_ack_and_reply_alert_carry_the_link() {
        let ticket = sample_ticket();
        let link = "http://localhost:8080/tickets/abc?token=xyz";

        let ack = ticket_created_ack(&ticket, link);
        assert_eq!(ack.to, "ada@example.com");
        assert!(ack.html.contains(link));

        let alert = admin_reply_alert(&ticket, link);
        assert_eq!(alert.to, "ada@example.com");
        assert!(alert.html.contains(link));
        assert!(alert.subject.contains(&ticket.title));
    }

    #[tokio::test]
    async fn test_spawn_is_fire_and_forget() {
        let (notifier, mut inbox) = recording_notifier();
        spawn(notifier, ticket_created_alert("support@example.com", &sample_ticket()));

        let mail = inbox.recv().await.unwrap();
        assert_eq!(mail.to, "support@example.com");
    }

    #[tokio::test]
    async fn test_null_mailer_swallows_mail() {
        let mail = ticket_created_alert("support@example.com", &sample_ticket());
        assert!(NullMailer.send_mail(&mail).await.is_ok());
    }
}
