//! Conversation client: a local cache kept in sync with a relay server.

pub mod cache;
pub mod chat_client;

pub use cache::{ClientState, ConversationCache};
pub use chat_client::{ChatClient, ClientError};
