//! Test-only helpers: temp repositories, a scripted engine, stream collection.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::core::state::DiagnosticState;
use crate::engine::{ChatMessage, ReasoningEngine, ToolChoice, Turn, TurnRequest};
use crate::tools::FINAL_ANSWER;

/// Temporary repository directory that is removed on drop.
pub struct TestTree {
    dir: TempDir,
}

impl TestTree {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repository")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn mkdir(&self, rel: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
        Ok(path)
    }
}

/// One request observed by [`ScriptedEngine`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tool_choice: ToolChoice,
}

impl RecordedRequest {
    pub fn forced_final_answer(&self) -> bool {
        self.tool_choice == ToolChoice::Force(FINAL_ANSWER.to_string())
    }

    /// Content of the tool result answering `call_id`, if present.
    pub fn tool_result(&self, call_id: &str) -> Option<&str> {
        self.messages.iter().find_map(|message| match message {
            ChatMessage::Tool {
                tool_call_id,
                content,
            } if tool_call_id == call_id => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Engine that replays queued turns and records every request.
///
/// Once the queue is empty it answers with the fallback turn, narration only
/// unless overridden.
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<Result<Turn, String>>>,
    fallback: Turn,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedEngine {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            replies: Mutex::new(turns.into_iter().map(Ok).collect()),
            fallback: Turn::narration("Nothing more to add."),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failing reply after the turns already queued.
    pub fn then_fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(message.to_string()));
        self
    }

    pub fn with_fallback(mut self, turn: Turn) -> Self {
        self.fallback = turn;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn complete(&self, request: TurnRequest<'_>) -> Result<Turn> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                messages: request.messages.to_vec(),
                tool_choice: request.tool_choice.clone(),
            });
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

type Responder = Box<dyn FnMut(&RecordedRequest) -> Result<Turn> + Send>;

/// Engine that computes each turn from the request it receives.
pub struct ReactiveEngine {
    respond: Mutex<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ReactiveEngine {
    pub fn new<F>(respond: F) -> Self
    where
        F: FnMut(&RecordedRequest) -> Result<Turn> + Send + 'static,
    {
        Self {
            respond: Mutex::new(Box::new(respond)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReasoningEngine for ReactiveEngine {
    async fn complete(&self, request: TurnRequest<'_>) -> Result<Turn> {
        let recorded = RecordedRequest {
            messages: request.messages.to_vec(),
            tool_choice: request.tool_choice.clone(),
        };
        let turn = {
            let mut respond = self.respond.lock().unwrap_or_else(PoisonError::into_inner);
            respond(&recorded)
        };
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recorded);
        turn
    }
}

/// Id the system prompt's project tree assigns to the entry called `name`.
pub fn file_id(messages: &[ChatMessage], name: &str) -> Option<String> {
    let prompt = messages.iter().find_map(|message| match message {
        ChatMessage::System { content } => Some(content.as_str()),
        _ => None,
    })?;
    let start = prompt.find("```json")? + "```json".len();
    let len = prompt[start..].find("```")?;
    let tree: Value = serde_json::from_str(prompt[start..start + len].trim()).ok()?;
    find_id(&tree, name)
}

fn find_id(node: &Value, name: &str) -> Option<String> {
    if node.get("name").and_then(Value::as_str) == Some(name) {
        return node.get("id").and_then(Value::as_str).map(ToString::to_string);
    }
    node.get("children")?
        .as_array()?
        .iter()
        .find_map(|child| find_id(child, name))
}

/// Arguments for a well-formed `final_answer` call.
pub fn verdict_arguments(success: bool, summary: &str) -> String {
    json!({
        "success": success,
        "projectSummary": summary,
        "missingConfig": false,
        "missingScripts": {"missing": false},
    })
    .to_string()
}

/// Turn that narrates and calls `final_answer`.
pub fn final_answer_turn(call_id: &str, success: bool, summary: &str) -> Turn {
    Turn::narration("Writing the final diagnostic.").with_call(
        call_id,
        FINAL_ANSWER,
        verdict_arguments(success, summary),
    )
}

/// Drain a session stream until the streamer closes it.
pub async fn collect_states(mut rx: mpsc::Receiver<DiagnosticState>) -> Vec<DiagnosticState> {
    let mut states = Vec::new();
    while let Some(state) = rx.recv().await {
        states.push(state);
    }
    states
}
