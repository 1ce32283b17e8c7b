//! Shared application state for the diagnosis server.

use std::sync::Arc;

use anyhow::Result;
use diagnose::core::state::DiagnosticState;
use diagnose::engine::ReasoningEngine;
use diagnose::io::config::DiagnoseConfig;
use diagnose::io::repo::{RepoLocator, RepoPreparer};
use diagnose::session::DiagnosticSession;
use diagnose::stream;
use diagnose::tools::ToolSet;
use tokio::sync::mpsc;
use tracing::{Instrument, info, info_span};

/// Shared state accessible from all request handlers.
///
/// Nothing here changes per request; every diagnosis gets a fresh session.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DiagnoseConfig>,
    pub tools: Arc<ToolSet>,
    pub engine: Arc<dyn ReasoningEngine>,
    pub preparer: Arc<dyn RepoPreparer>,
}

impl AppState {
    pub fn new(
        config: DiagnoseConfig,
        engine: Arc<dyn ReasoningEngine>,
        preparer: Arc<dyn RepoPreparer>,
    ) -> Result<Self> {
        let tools = ToolSet::new(config.max_file_bytes)?;
        Ok(Self {
            config: Arc::new(config),
            tools: Arc::new(tools),
            engine,
            preparer,
        })
    }

    /// Spawn a diagnosis for `locator` and return the stream its snapshots
    /// arrive on. The session keeps running if the receiver is dropped.
    pub fn start_session(&self, locator: RepoLocator) -> mpsc::Receiver<DiagnosticState> {
        let (streamer, rx) = stream::channel(self.config.channel_capacity);
        let session = DiagnosticSession::new(
            &self.config,
            Arc::clone(&self.tools),
            Arc::clone(&self.engine),
            streamer,
        );
        let preparer = Arc::clone(&self.preparer);
        let span = info_span!("diagnosis", org = %locator.org, name = %locator.name);

        tokio::spawn(
            async move {
                let prepared = preparer.prepare(&locator).await;
                let outcome = session.run(prepared).await;
                info!(phase = %outcome.phase, success = outcome.state.success, "session finished");
            }
            .instrument(span),
        );
        rx
    }
}
