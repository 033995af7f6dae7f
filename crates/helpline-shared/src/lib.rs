//! # helpline-shared
//!
//! Domain and wire types shared by the helpline server and client: the
//! ticket aggregate with its ordered message log, the sender union, the
//! message content envelope, and the two signed access-token formats
//! (staff credential, ticket-scoped link token).

pub mod constants;
pub mod envelope;
pub mod token;
pub mod types;

pub use envelope::MessageEnvelope;
pub use token::{StaffToken, TicketToken, TokenError};
pub use types::{Attachment, Message, Sender, Ticket, TicketStatus};
