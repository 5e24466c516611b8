// Application state for HTTP handlers
use crate::application::dashboard_service::DashboardService;
use crate::application::provider_registry::ProviderRegistry;
use crate::application::session_manager::SessionManager;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub dashboard_service: DashboardService,
    pub registry: Arc<ProviderRegistry>,
    pub sessions: SessionManager,
    /// Bound on a single poll request's provider call
    pub provider_timeout: Duration,
}
