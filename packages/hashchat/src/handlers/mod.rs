pub mod health;
pub mod users;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use users::{list_users_handler, public_key_handler, register_handler};
pub use websocket::relay_websocket_handler;
