//! Client library for the Helpline ticket API.
//!
//! Embedding frontends use [`TicketApi`] for requests, keep per-conversation
//! state in a [`ConversationView`] and let [`spawn_poller`] refresh open
//! conversations in the background.

pub mod api;
pub mod error;
pub mod events;
pub mod poller;
pub mod view;

pub use api::{CreateTicketResponse, FilePart, NewTicketForm, ServerInfo, TicketApi};
pub use error::ClientError;
pub use events::ConversationEvent;
pub use poller::{spawn_poller, PollerHandle, TicketFeed};
pub use view::{ConversationView, Draft, PollOutcome};
