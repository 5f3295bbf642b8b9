pub mod conversation;
pub mod event;
pub mod message;
pub mod payload;
