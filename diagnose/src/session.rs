//! One diagnosis of one repository, from preparation result to terminal push.
//!
//! The session drives the engine turn by turn, routes tool calls through the
//! [`ToolSet`], and streams every state change. It ends in exactly one of two
//! terminal phases: `Complete` after a valid `final_answer`, or `Errored`.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};

use crate::core::guard::{StepGuard, TurnDirective, TurnProgress};
use crate::core::phase::{SessionPhase, transition};
use crate::core::state::{DiagnosticCell, DiagnosticState, Verdict};
use crate::engine::{Conversation, ReasoningEngine, ToolChoice, ToolInvocation, TurnRequest};
use crate::io::config::DiagnoseConfig;
use crate::io::file_index::FileIndex;
use crate::io::prompt::PromptEngine;
use crate::io::repo::Prepared;
use crate::stream::SessionStreamer;
use crate::tools::{FINAL_ANSWER, ToolCall, ToolSet};

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub phase: SessionPhase,
    pub state: DiagnosticState,
}

pub struct DiagnosticSession {
    phase: SessionPhase,
    cell: DiagnosticCell,
    guard: StepGuard,
    task_message: String,
    tools: Arc<ToolSet>,
    engine: Arc<dyn ReasoningEngine>,
    streamer: SessionStreamer,
}

impl DiagnosticSession {
    pub fn new(
        config: &DiagnoseConfig,
        tools: Arc<ToolSet>,
        engine: Arc<dyn ReasoningEngine>,
        streamer: SessionStreamer,
    ) -> Self {
        Self {
            phase: SessionPhase::Initializing,
            cell: DiagnosticCell::new(),
            guard: StepGuard::new(config.step_ceiling, config.forced_turn_limit),
            task_message: config.task_message.clone(),
            tools,
            engine,
            streamer,
        }
    }

    /// Run to a terminal phase. Failures never escape: they become the
    /// terminal `Errored` state pushed to the subscriber.
    #[instrument(skip_all, fields(root = ?prepared.root_path))]
    pub async fn run(mut self, prepared: Prepared) -> SessionOutcome {
        if let Err(err) = self.drive(prepared).await {
            self.abort(&err).await;
        }
        SessionOutcome {
            phase: self.phase,
            state: self.cell.current().clone(),
        }
    }

    async fn drive(&mut self, prepared: Prepared) -> Result<()> {
        let root = match prepared {
            Prepared {
                success: true,
                root_path: Some(root),
            } => root,
            _ => return Err(anyhow!("repository preparation failed")),
        };

        let index = tokio::task::spawn_blocking(move || FileIndex::build(&root))
            .await
            .context("join file index task")??;
        info!(
            session = %index.session_tag(),
            entries = index.len(),
            "file index ready"
        );

        let instructions = PromptEngine::new().render_instructions(&index, self.tools.catalog())?;
        let mut conversation = Conversation::new(instructions);
        conversation.push_user(self.task_message.clone());
        self.enter(SessionPhase::Reasoning)?;

        let mut progress = TurnProgress::default();
        loop {
            let directive = self.guard.evaluate(&progress)?;
            let tool_choice = match directive {
                TurnDirective::Free => ToolChoice::Auto,
                TurnDirective::ForceFinalAnswer(reason) => {
                    warn!(
                        ?reason,
                        step_count = progress.step_count,
                        forced_turns = progress.forced_turns,
                        "forcing final_answer"
                    );
                    ToolChoice::Force(FINAL_ANSWER.to_string())
                }
            };

            let messages = conversation.request_messages();
            let turn = self
                .engine
                .complete(TurnRequest {
                    messages: &messages,
                    tools: self.tools.catalog(),
                    tool_choice: &tool_choice,
                })
                .await
                .context("reasoning engine turn")?;
            conversation.record_turn(&turn);
            debug!(
                step_count = conversation.step_count(),
                tool_calls = turn.tool_calls.len(),
                "turn recorded"
            );
            self.publish_progress(&conversation).await;

            progress.step_count = conversation.step_count();
            progress.yielded = turn.tool_calls.is_empty();
            progress.forced_turns = match directive {
                TurnDirective::Free => 0,
                TurnDirective::ForceFinalAnswer(_) => progress.forced_turns + 1,
            };

            if turn.tool_calls.is_empty() {
                self.enter(SessionPhase::Reasoning)?;
                continue;
            }

            self.enter(SessionPhase::ToolDispatch)?;
            if let Some(verdict) = self
                .dispatch(&index, &mut conversation, &turn.tool_calls)
                .await
            {
                return self.conclude(verdict, &mut conversation).await;
            }
            self.publish_progress(&conversation).await;
            self.enter(SessionPhase::Reasoning)?;
        }
    }

    /// Route each call in order. Returns the verdict of the first valid
    /// `final_answer`; calls after it are not executed.
    async fn dispatch(
        &self,
        index: &FileIndex,
        conversation: &mut Conversation,
        calls: &[ToolInvocation],
    ) -> Option<Verdict> {
        for (pos, invocation) in calls.iter().enumerate() {
            match self.tools.parse(invocation) {
                Ok(ToolCall::ListFiles) => {
                    debug!(tool = %invocation.name, "dispatching tool");
                    conversation.push_tool_result(&invocation.id, self.tools.list_files(index));
                }
                Ok(ToolCall::ReadFileById { id }) => {
                    debug!(tool = %invocation.name, file = %id, "dispatching tool");
                    let content = self.tools.read_file(index, &id).await;
                    conversation.push_tool_result(&invocation.id, content);
                }
                Ok(ToolCall::FinalAnswer(verdict)) => {
                    let ignored = calls.len() - pos - 1;
                    if ignored > 0 {
                        debug!(ignored, "tool calls after final_answer ignored");
                    }
                    return Some(verdict);
                }
                Ok(ToolCall::Unrecognized { name }) => {
                    debug!(tool = %name, "skipping unrecognized tool");
                }
                Err(err) => {
                    warn!(tool = %invocation.name, error = %err, "tool arguments rejected");
                    conversation.push_tool_result(&invocation.id, err.to_string());
                }
            }
        }
        None
    }

    async fn conclude(&mut self, verdict: Verdict, conversation: &mut Conversation) -> Result<()> {
        self.enter(SessionPhase::Completing)?;
        conversation.stop();
        debug_assert!(conversation.is_stopped());
        let success = verdict.success;
        self.cell.complete(verdict, conversation.snapshot());
        conversation.reset();

        self.streamer.push(self.cell.current().clone(), true).await;
        self.enter(SessionPhase::Complete)?;
        info!(success, "diagnosis complete");
        Ok(())
    }

    async fn abort(&mut self, err: &anyhow::Error) {
        let reason = format!("{err:#}");
        error!(phase = %self.phase, error = %reason, "diagnosis failed");
        if let Err(err) = transition(&mut self.phase, SessionPhase::Errored) {
            debug!(error = %err, "session already terminal");
        }
        if self.cell.fail(reason) {
            self.streamer.push(self.cell.current().clone(), true).await;
        }
    }

    async fn publish_progress(&mut self, conversation: &Conversation) {
        if self.cell.record_progress(conversation.snapshot()) {
            self.streamer.push(self.cell.current().clone(), false).await;
        }
    }

    fn enter(&mut self, next: SessionPhase) -> Result<()> {
        transition(&mut self.phase, next)?;
        debug!(phase = %next, "session phase");
        Ok(())
    }
}
