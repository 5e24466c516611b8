// Infrastructure layer - External dependencies and adapters
pub mod chunked_frames;
pub mod config;
pub mod file_store;
pub mod memory_store;
pub mod providers;
