pub mod admin;
pub mod health;
pub mod messages;
pub mod public;
pub mod routes;

pub use routes::create_routes;
