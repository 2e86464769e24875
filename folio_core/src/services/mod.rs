pub mod message_service;

pub use message_service::{InboxMessage, MessageService, SenderInfo};
