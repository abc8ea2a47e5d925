use std::sync::Arc;

use parley_ai::LlmRouter;
use parley_confirmation::ConfirmationCoordinator;
use parley_domain::config::Config;
use parley_engine::Engine;
use parley_mcp::McpManager;
use parley_planner::Planner;
use parley_registry::ToolRegistry;
use parley_sessions::SessionRepository;

/// Shared application state passed to every HTTP handler and CLI command.
///
/// Every field is a handle the engine needs to run one session end to
/// end; none of it is session-specific — that lives in
/// [`parley_domain::react::Session`] and is persisted through
/// `session_repo`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<LlmRouter>,
    pub mcp: Arc<McpManager>,
    pub registry: Arc<ToolRegistry>,
    pub planner: Arc<Planner>,
    pub confirmation: Arc<ConfirmationCoordinator>,
    pub session_repo: Arc<SessionRepository>,
    pub engine: Arc<Engine>,
}
