// Application layer - Use cases and the seams adapters plug into
pub mod dashboard_service;
pub mod provider_registry;
pub mod schema_store;
pub mod session_manager;
