//! Shared state across all handlers.

use std::sync::Arc;

use homeserv_config::Settings;
use homeserv_dialogue::{DialogueOrchestrator, StubUploadService};
use homeserv_scheduling::{SchedulingEngine, SchedulingStore};
use homeserv_session::SessionManager;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub engine: SchedulingEngine,
    pub orchestrator: Arc<DialogueOrchestrator>,
}

impl AppState {
    pub fn new(config: Settings, store: Arc<dyn SchedulingStore>) -> Self {
        let sessions = Arc::new(SessionManager::new(config.session.clone()));
        let engine = SchedulingEngine::new(store, config.scheduling.clone());
        let uploads = Arc::new(StubUploadService::new());
        let orchestrator = Arc::new(DialogueOrchestrator::new(
            sessions.clone(),
            engine.clone(),
            uploads.clone(),
            uploads,
        ));
        Self {
            config: Arc::new(config),
            sessions,
            engine,
            orchestrator,
        }
    }
}
