//! A self-contained real-time chat relay: named pub/sub channels over
//! websockets, capability-token authentication, per-channel transcripts and
//! history backfill, plus the client-side session state machine and view
//! model a chat surface builds on.

pub mod api;
pub mod auth;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod identity;
pub mod naming;
pub mod session;
pub mod store;
pub mod view;

pub use api::AppState;
pub use auth::{TokenRequest, TokenSigner};
pub use envelope::Envelope;
pub use error::{ChatError, Result};
pub use hub::{Channel, ChannelRegistry, Subscribers};
pub use identity::{Identity, ProfileStore};
pub use naming::{pairwise_channel_name, resolve_channel_name, ChannelMode, ROOM_CHANNEL};
pub use session::{ChatSession, SessionPhase};
pub use store::MessageStore;
