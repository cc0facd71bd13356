//! Wiring of the production collaborators

use crew_core::{
    CrewConfig, CrewError, FileSessionStore, HttpToolInvoker, InMemorySessionStore, OllamaBackend,
    Orchestrator, Roster, SessionStore,
};
use crew_tools::ToolClient;
use std::path::PathBuf;
use std::sync::Arc;

/// Orchestrator backed by Ollama, the remote tool service and the chosen
/// session store (file-backed when `session_dir` is set)
///
/// # Errors
/// `Session` when the session directory cannot be created
pub async fn build_orchestrator(
    config: &CrewConfig,
    session_dir: Option<PathBuf>,
) -> Result<Orchestrator, CrewError> {
    let backend = Arc::new(OllamaBackend::from_config(config));
    let client = ToolClient::new(&config.tools_url);
    let tools = Arc::new(
        HttpToolInvoker::new(client, &config.test_command)
            .with_test_timeout(config.test_timeout_secs),
    );

    let sessions: Arc<dyn SessionStore> = match session_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "using file session store");
            Arc::new(FileSessionStore::open(dir).await?)
        }
        None => {
            tracing::info!("using in-memory session store");
            Arc::new(InMemorySessionStore::new())
        }
    };

    tracing::info!(
        backend = %config.ollama_base_url,
        model = %config.model,
        tools = %config.tools_url,
        "crew configured"
    );
    let roster = Roster::standard(backend, config.max_iterations);
    Ok(Orchestrator::new(config.clone(), roster, tools, sessions))
}
