pub mod handler;
pub mod manager;
pub mod messages;

pub use handler::live_handler;
pub use manager::{WebSocketConnection, WebSocketManager};
pub use messages::WebSocketMessage;
