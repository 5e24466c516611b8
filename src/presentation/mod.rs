// Presentation layer - HTTP and live channel boundary
pub mod app_state;
pub mod error;
pub mod handlers;
pub mod live;
pub mod router;
