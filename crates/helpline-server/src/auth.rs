//! Dual-token request authorization.
//!
//! Two kinds of bearer credentials reach this server:
//!
//! - **Staff tokens**, signed by the staff identity provider.  They are not
//!   tied to any ticket and authorize every conversation.
//! - **Ticket tokens**, minted by this server and embedded in emailed
//!   conversation links.  Each one opens exactly one ticket.
//!
//! The [`Authorizer`] tries the staff interpretation first and falls back
//! to the ticket-scoped one.  It never touches ticket data; the ownership
//! check for user replies happens in the API layer once the ticket is
//! loaded.

use chrono::Duration;
use ed25519_dalek::{SigningKey, VerifyingKey};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use helpline_shared::{Sender, StaffToken, TicketToken};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Token rejected")]
    InvalidToken,
}

pub struct Authorizer {
    staff_provider_pubkey: Option<[u8; 32]>,
    signing_key: SigningKey,
    token_ttl: Duration,
}

impl Authorizer {
    pub fn new(
        staff_provider_pubkey: Option<[u8; 32]>,
        token_signing_seed: &[u8; 32],
        token_ttl: Duration,
    ) -> Self {
        Self {
            staff_provider_pubkey,
            signing_key: SigningKey::from_bytes(token_signing_seed),
            token_ttl,
        }
    }

    /// Classify a bearer credential for one ticket.
    ///
    /// Staff credentials win: they are valid for any ticket.  Only when the
    /// bearer is not a valid staff token is it tried as a ticket token, and
    /// then it must be scoped to exactly this ticket.
    pub fn authorize(&self, bearer: Option<&str>, ticket_id: Uuid) -> Result<Sender, AuthError> {
        let bearer = bearer.ok_or(AuthError::MissingToken)?;
        if bearer.is_empty() {
            return Err(AuthError::MissingToken);
        }

        if let Some(email) = self.verify_staff(bearer) {
            return Ok(Sender::Admin { id: email });
        }

        if let Ok(token) = TicketToken::decode(bearer) {
            if token
                .verify_for_ticket(&self.signing_key.verifying_key(), ticket_id)
                .is_ok()
            {
                return Ok(Sender::User {
                    email: token.payload.email,
                });
            }
        }

        Err(AuthError::InvalidToken)
    }

    /// Staff-only surfaces: ticket listing and status updates.
    pub fn authorize_staff(&self, bearer: Option<&str>) -> Result<Sender, AuthError> {
        let bearer = bearer.ok_or(AuthError::MissingToken)?;
        if bearer.is_empty() {
            return Err(AuthError::MissingToken);
        }

        self.verify_staff(bearer)
            .map(|email| Sender::Admin { id: email })
            .ok_or(AuthError::InvalidToken)
    }

    /// Mint a ticket-scoped token for an emailed conversation link.
    pub fn issue_ticket_token(&self, ticket_id: Uuid, email: &str) -> String {
        TicketToken::issue(&self.signing_key, ticket_id, email.to_string(), self.token_ttl).encode()
    }

    fn verify_staff(&self, bearer: &str) -> Option<String> {
        // No configured provider key means the staff surface is disabled.
        let key = VerifyingKey::from_bytes(&self.staff_provider_pubkey?).ok()?;
        let token = StaffToken::decode(bearer).ok()?;
        token.verify(&key).ok()?;
        Some(token.payload.email)
    }
}

/// Constant-time email comparison for the ownership check on user replies.
pub fn emails_match(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn test_authorizer() -> (Authorizer, SigningKey) {
        let provider_key = SigningKey::generate(&mut OsRng);
        let authorizer = Authorizer::new(
            Some(provider_key.verifying_key().to_bytes()),
            &[7u8; 32],
            Duration::days(7),
        );
        (authorizer, provider_key)
    }

    #[test]
    fn test_staff_token_authorizes_any_ticket() {
        let (authorizer, provider_key) = test_authorizer();
        let bearer =
            StaffToken::issue(&provider_key, "staff@example.com".to_string(), Duration::hours(8))
                .encode();

        for _ in 0..2 {
            let sender = authorizer
                .authorize(Some(&bearer), Uuid::new_v4())
                .unwrap();
            assert!(matches!(sender, Sender::Admin { ref id } if id == "staff@example.com"));
        }

        let sender = authorizer.authorize_staff(Some(&bearer)).unwrap();
        assert!(matches!(sender, Sender::Admin { .. }));
    }

    #[test]
    fn test_ticket_token_scoped_to_its_ticket() {
        let (authorizer, _) = test_authorizer();
        let ticket_id = Uuid::new_v4();
        let bearer = authorizer.issue_ticket_token(ticket_id, "user@example.com");

        let sender = authorizer.authorize(Some(&bearer), ticket_id).unwrap();
        assert!(matches!(sender, Sender::User { ref email } if email == "user@example.com"));

        // The same token opens no other ticket.
        assert!(authorizer
            .authorize(Some(&bearer), Uuid::new_v4())
            .is_err());
    }

    #[test]
    fn test_ticket_token_rejected_on_staff_surface() {
        let (authorizer, _) = test_authorizer();
        let bearer = authorizer.issue_ticket_token(Uuid::new_v4(), "user@example.com");
        assert!(authorizer.authorize_staff(Some(&bearer)).is_err());
    }

    #[test]
    fn test_missing_or_garbage_bearer() {
        let (authorizer, _) = test_authorizer();
        let ticket_id = Uuid::new_v4();

        assert!(matches!(
            authorizer.authorize(None, ticket_id),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            authorizer.authorize(Some(""), ticket_id),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            authorizer.authorize(Some("not-a-token"), ticket_id),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_ticket_token_rejected() {
        let (authorizer, _) = test_authorizer();
        let ticket_id = Uuid::new_v4();
        let expired = Authorizer::new(
            authorizer.staff_provider_pubkey,
            &[7u8; 32],
            Duration::seconds(-60),
        );

        let bearer = expired.issue_ticket_token(ticket_id, "user@example.com");
        assert!(authorizer.authorize(Some(&bearer), ticket_id).is_err());
    }

    #[test]
    fn test_foreign_staff_token_rejected() {
        let (authorizer, _) = test_authorizer();
        let other_provider = SigningKey::generate(&mut OsRng);
        let bearer =
            StaffToken::issue(&other_provider, "staff@example.com".to_string(), Duration::hours(8))
                .encode();

        assert!(authorizer.authorize_staff(Some(&bearer)).is_err());
        assert!(authorizer.authorize(Some(&bearer), Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_unconfigured_provider_key_rejects_staff() {
        let provider_key = SigningKey::generate(&mut OsRng);
        let authorizer = Authorizer::new(None, &[7u8; 32], Duration::days(7));
        let bearer =
            StaffToken::issue(&provider_key, "staff@example.com".to_string(), Duration::hours(8))
                .encode();

        assert!(authorizer.authorize_staff(Some(&bearer)).is_err());
        assert!(authorizer.authorize(Some(&bearer), Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_small_order_forgery_rejected() {
        // A signature with s = 0 and R drawn from the curve's small-order
        // subgroup verifies under cofactored verification when the public
        // key is itself a small-order point such as all-zeros.  Strict
        // verification must reject it, with or without a configured key.
        let low_order_points: [[u8; 32]; 4] = [
            [0u8; 32],
            {
                let mut p = [0u8; 32];
                p[31] = 0x80;
                p
            },
            {
                let mut p = [0u8; 32];
                p[0] = 0x01;
                p
            },
            {
                let mut p = [0xffu8; 32];
                p[0] = 0xec;
                p[31] = 0x7f;
                p
            },
        ];

        for authorizer in [
            Authorizer::new(Some([0u8; 32]), &[7u8; 32], Duration::days(7)),
            Authorizer::new(None, &[7u8; 32], Duration::days(7)),
        ] {
            for r in &low_order_points {
                let now = chrono::Utc::now();
                let mut signature = [0u8; 64];
                signature[..32].copy_from_slice(r);
                let bearer = StaffToken {
                    payload: helpline_shared::token::StaffTokenPayload {
                        email: "attacker@evil.example".to_string(),
                        issued_at: now,
                        expires_at: now + Duration::hours(8),
                    },
                    signature: signature.to_vec(),
                }
                .encode();

                assert!(authorizer.authorize_staff(Some(&bearer)).is_err());
                assert!(authorizer.authorize(Some(&bearer), Uuid::new_v4()).is_err());
            }
        }
    }

    #[test]
    fn test_emails_match() {
        assert!(emails_match("user@example.com", "user@example.com"));
        assert!(!emails_match("user@example.com", "other@example.com"));
        assert!(!emails_match("user@example.com", "user@example.com2"));
        assert!(emails_match("", ""));
    }
}
