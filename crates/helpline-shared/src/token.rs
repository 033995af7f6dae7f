use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared purpose embedded in every ticket-scoped token payload.
pub const TICKET_TOKEN_PURPOSE: &str = "ticket-access";

/// Payload of a ticket-scoped access token. Signed by the server's own key
/// and delivered to the end user inside an emailed conversation link; the
/// `ticket_id` scope is the only thing preventing a leaked link from
/// granting access to a different ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketTokenPayload {
    pub purpose: String,
    pub ticket_id: Uuid,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketToken {
    pub payload: TicketTokenPayload,
    pub signature: Vec<u8>,
}

impl TicketToken {
    /// Mint a new signed token scoped to one ticket and one email.
    pub fn issue(signing_key: &SigningKey, ticket_id: Uuid, email: String, ttl: Duration) -> Self {
        let now = Utc::now();
        let payload = TicketTokenPayload {
            purpose: TICKET_TOKEN_PURPOSE.to_string(),
            ticket_id,
            email,
            issued_at: now,
            expires_at: now + ttl,
        };

        let payload_bytes = bincode::serialize(&payload).expect("payload serialization");
        let signature = signing_key.sign(&payload_bytes);

        Self {
            payload,
            signature: signature.to_bytes().to_vec(),
        }
    }

    /// Encode the token as a base64url string (URL- and header-safe).
    pub fn encode(&self) -> String {
        let bytes = bincode::serialize(self).expect("token serialization");
        base64_url_encode(&bytes)
    }

    /// Decode a base64url string back into a TicketToken.
    pub fn decode(code: &str) -> Result<Self, TokenError> {
        let bytes = base64_url_decode(code)?;
        bincode::deserialize(&bytes).map_err(|_| TokenError::InvalidFormat)
    }

    /// Verify signature, expiry, purpose and ticket scope against the
    /// server's verifying key and the ticket the caller is acting on.
    pub fn verify_for_ticket(
        &self,
        server_key: &VerifyingKey,
        ticket_id: Uuid,
    ) -> Result<(), TokenError> {
        if Utc::now() > self.payload.expires_at {
            return Err(TokenError::Expired);
        }

        let payload_bytes =
            bincode::serialize(&self.payload).map_err(|_| TokenError::InvalidFormat)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| TokenError::InvalidSignature)?;
        server_key
            .verify_strict(&payload_bytes, &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        if self.payload.purpose != TICKET_TOKEN_PURPOSE {
            return Err(TokenError::PurposeMismatch);
        }
        if self.payload.ticket_id != ticket_id {
            return Err(TokenError::WrongTicket);
        }
        if self.payload.email.is_empty() {
            return Err(TokenError::MissingEmail);
        }

        Ok(())
    }
}

/// Payload of a staff credential issued by the staff identity provider.
/// Trusted for any ticket; carries no scope beyond the operator's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffTokenPayload {
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffToken {
    pub payload: StaffTokenPayload,
    pub signature: Vec<u8>,
}

impl StaffToken {
    /// Sign a staff credential with the identity provider's key. Used by
    /// provider-side tooling and by tests.
    pub fn issue(provider_key: &SigningKey, email: String, ttl: Duration) -> Self {
        let now = Utc::now();
        let payload = StaffTokenPayload {
            email,
            issued_at: now,
            expires_at: now + ttl,
        };

        let payload_bytes = bincode::serialize(&payload).expect("payload serialization");
        let signature = provider_key.sign(&payload_bytes);

        Self {
            payload,
            signature: signature.to_bytes().to_vec(),
        }
    }

    pub fn encode(&self) -> String {
        let bytes = bincode::serialize(self).expect("token serialization");
        base64_url_encode(&bytes)
    }

    pub fn decode(code: &str) -> Result<Self, TokenError> {
        let bytes = base64_url_decode(code)?;
        bincode::deserialize(&bytes).map_err(|_| TokenError::InvalidFormat)
    }

    /// Verify signature and expiry against the identity provider's key.
    /// Strict verification, so small-order keys and nonces never pass.
    pub fn verify(&self, provider_key: &VerifyingKey) -> Result<(), TokenError> {
        if Utc::now() > self.payload.expires_at {
            return Err(TokenError::Expired);
        }

        let payload_bytes =
            bincode::serialize(&self.payload).map_err(|_| TokenError::InvalidFormat)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| TokenError::InvalidSignature)?;
        provider_key
            .verify_strict(&payload_bytes, &signature)
            .map_err(|_| TokenError::InvalidSignature)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token purpose mismatch")]
    PurposeMismatch,

    #[error("Token is scoped to a different ticket")]
    WrongTicket,

    #[error("Token carries no email")]
    MissingEmail,

    #[error("Base64 decode error")]
    Base64Decode,
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, TokenError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|_| TokenError::Base64Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_ticket_token_roundtrip() {
        let server_key = SigningKey::generate(&mut OsRng);
        let ticket_id = Uuid::new_v4();

        let token = TicketToken::issue(
            &server_key,
            ticket_id,
            "owner@example.com".to_string(),
            Duration::days(7),
        );

        let code = token.encode();
        let decoded = TicketToken::decode(&code).expect("decode should work");
        decoded
            .verify_for_ticket(&server_key.verifying_key(), ticket_id)
            .expect("verify should pass");

        assert_eq!(decoded.payload.ticket_id, ticket_id);
        assert_eq!(decoded.payload.email, "owner@example.com");
        assert_eq!(decoded.payload.purpose, TICKET_TOKEN_PURPOSE);
    }

    #[test]
    fn test_ticket_token_rejected_for_other_ticket() {
        let server_key = SigningKey::generate(&mut OsRng);
        let token = TicketToken::issue(
            &server_key,
            Uuid::new_v4(),
            "owner@example.com".to_string(),
            Duration::days(7),
        );

        let result = token.verify_for_ticket(&server_key.verifying_key(), Uuid::new_v4());
        assert!(matches!(result, Err(TokenError::WrongTicket)));
    }

    #[test]
    fn test_ticket_token_expired() {
        let server_key = SigningKey::generate(&mut OsRng);
        let ticket_id = Uuid::new_v4();
        let token = TicketToken::issue(
            &server_key,
            ticket_id,
            "owner@example.com".to_string(),
            Duration::seconds(-60),
        );

        let result = token.verify_for_ticket(&server_key.verifying_key(), ticket_id);
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_ticket_token_tampered_fails() {
        let server_key = SigningKey::generate(&mut OsRng);
        let ticket_id = Uuid::new_v4();
        let mut token = TicketToken::issue(
            &server_key,
            ticket_id,
            "owner@example.com".to_string(),
            Duration::days(7),
        );

        token.payload.email = "attacker@example.com".to_string();
        let result = token.verify_for_ticket(&server_key.verifying_key(), ticket_id);
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_ticket_token_wrong_server_key() {
        let server_key = SigningKey::generate(&mut OsRng);
        let other_key = SigningKey::generate(&mut OsRng);
        let ticket_id = Uuid::new_v4();
        let token = TicketToken::issue(
            &server_key,
            ticket_id,
            "owner@example.com".to_string(),
            Duration::days(7),
        );

        let result = token.verify_for_ticket(&other_key.verifying_key(), ticket_id);
        assert!(result.is_err());
    }

    #[test]
    fn test_ticket_token_purpose_is_checked() {
        // A correctly signed payload with a foreign purpose string must not
        // pass, even though the signature is genuine.
        let server_key = SigningKey::generate(&mut OsRng);
        let ticket_id = Uuid::new_v4();
        let now = Utc::now();
        let payload = TicketTokenPayload {
            purpose: "password-reset".to_string(),
            ticket_id,
            email: "owner@example.com".to_string(),
            issued_at: now,
            expires_at: now + Duration::days(7),
        };
        let payload_bytes = bincode::serialize(&payload).unwrap();
        let signature = server_key.sign(&payload_bytes);
        let token = TicketToken {
            payload,
            signature: signature.to_bytes().to_vec(),
        };

        let result = token.verify_for_ticket(&server_key.verifying_key(), ticket_id);
        assert!(matches!(result, Err(TokenError::PurposeMismatch)));
    }

    #[test]
    fn test_ticket_token_empty_email_rejected() {
        let server_key = SigningKey::generate(&mut OsRng);
        let ticket_id = Uuid::new_v4();
        let token = TicketToken::issue(&server_key, ticket_id, String::new(), Duration::days(7));

        let result = token.verify_for_ticket(&server_key.verifying_key(), ticket_id);
        assert!(matches!(result, Err(TokenError::MissingEmail)));
    }

    #[test]
    fn test_staff_token_roundtrip() {
        let provider_key = SigningKey::generate(&mut OsRng);
        let token = StaffToken::issue(
            &provider_key,
            "staff@helpline.dev".to_string(),
            Duration::hours(8),
        );

        let decoded = StaffToken::decode(&token.encode()).expect("decode should work");
        decoded
            .verify(&provider_key.verifying_key())
            .expect("verify should pass");
        assert_eq!(decoded.payload.email, "staff@helpline.dev");
    }

    #[test]
    fn test_staff_token_wrong_provider_key() {
        let provider_key = SigningKey::generate(&mut OsRng);
        let wrong_key = SigningKey::generate(&mut OsRng);
        let token = StaffToken::issue(
            &provider_key,
            "staff@helpline.dev".to_string(),
            Duration::hours(8),
        );

        assert!(token.verify(&wrong_key.verifying_key()).is_err());
    }

    #[test]
    fn test_staff_token_expired() {
        let provider_key = SigningKey::generate(&mut OsRng);
        let token = StaffToken::issue(
            &provider_key,
            "staff@helpline.dev".to_string(),
            Duration::seconds(-1),
        );

        let result = token.verify(&provider_key.verifying_key());
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_garbage_code_rejected() {
        assert!(TicketToken::decode("not base64url!!!").is_err());
        assert!(StaffToken::decode("").is_err());
    }
}
