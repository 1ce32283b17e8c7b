//! Reasoning engine boundary and per-session conversation state.
//!
//! The [`ReasoningEngine`] trait decouples the session loop from the actual model
//! backend. Engines are stateless: everything that grows during a diagnosis lives
//! in the session-owned [`Conversation`], so one engine can be shared by any
//! number of sessions. Tests use scripted engines that return predetermined
//! turns without network access.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::ToolSpec;

/// One request from the engine to call a named tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned call id, echoed back with the tool result.
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments, validated before dispatch.
    pub arguments: String,
}

/// A message in the engine conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// What the engine produced for one turn: narration, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Turn {
    pub narration: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl Turn {
    pub fn narration(text: impl Into<String>) -> Self {
        Self {
            narration: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_call(mut self, id: &str, name: &str, arguments: impl Into<String>) -> Self {
        self.tool_calls.push(ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.into(),
        });
        self
    }
}

/// Tool selection constraint for the next turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    /// The engine must call exactly this tool.
    Force(String),
}

/// Everything an engine needs to produce the next turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolSpec],
    pub tool_choice: &'a ToolChoice,
}

/// Abstraction over model backends.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Produce the next turn for the given conversation.
    async fn complete(&self, request: TurnRequest<'_>) -> Result<Turn>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Serializable view of a conversation, streamed as `engineState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub step_count: u32,
    pub status: ConversationStatus,
    pub conversation: Vec<ChatMessage>,
}

impl EngineSnapshot {
    /// Most recent non-empty assistant narration, if any.
    pub fn last_narration(&self) -> Option<&str> {
        self.conversation.iter().rev().find_map(|message| match message {
            ChatMessage::Assistant {
                content: Some(content),
                ..
            } if !content.trim().is_empty() => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Conversation state owned by exactly one session.
#[derive(Debug, Clone)]
pub struct Conversation {
    instructions: String,
    messages: Vec<ChatMessage>,
    step_count: u32,
    status: ConversationStatus,
}

impl Conversation {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            messages: Vec::new(),
            step_count: 0,
            status: ConversationStatus::Idle,
        }
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn is_stopped(&self) -> bool {
        self.status == ConversationStatus::Stopped
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::User {
            content: content.into(),
        });
        self.status = ConversationStatus::Running;
    }

    /// Record an engine turn and advance the step counter.
    pub fn record_turn(&mut self, turn: &Turn) {
        self.messages.push(ChatMessage::Assistant {
            content: turn.narration.clone(),
            tool_calls: turn.tool_calls.clone(),
        });
        self.step_count += 1;
    }

    pub fn push_tool_result(&mut self, tool_call_id: &str, content: impl Into<String>) {
        self.messages.push(ChatMessage::Tool {
            tool_call_id: tool_call_id.to_string(),
            content: content.into(),
        });
    }

    /// Refuse further turns.
    pub fn stop(&mut self) {
        self.status = ConversationStatus::Stopped;
    }

    /// Clear history and counters; the instructions are kept.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.step_count = 0;
        self.status = ConversationStatus::Idle;
    }

    /// Messages to send to the engine: instructions first, then history.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(ChatMessage::System {
            content: self.instructions.clone(),
        });
        messages.extend(self.messages.iter().cloned());
        messages
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            step_count: self.step_count,
            status: self.status,
            conversation: self.messages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_turn_counts_steps_and_keeps_calls() {
        let mut conversation = Conversation::new("instructions");
        conversation.push_user("check this project");
        conversation.record_turn(
            &Turn::narration("reading the manifest").with_call("c1", "read_file_by_id", "{}"),
        );
        conversation.push_tool_result("c1", "contents");

        assert_eq!(conversation.step_count(), 1);
        assert_eq!(conversation.status(), ConversationStatus::Running);
        let messages = conversation.request_messages();
        assert_eq!(messages.len(), 4);
        assert!(matches!(&messages[0], ChatMessage::System { content } if content == "instructions"));
        assert_eq!(
            conversation.snapshot().last_narration(),
            Some("reading the manifest")
        );
    }

    #[test]
    fn reset_clears_history_and_counter() {
        let mut conversation = Conversation::new("instructions");
        conversation.push_user("go");
        conversation.record_turn(&Turn::narration("thinking"));
        conversation.stop();
        assert!(conversation.is_stopped());

        conversation.reset();
        assert_eq!(conversation.step_count(), 0);
        assert_eq!(conversation.status(), ConversationStatus::Idle);
        assert_eq!(conversation.request_messages().len(), 1);
    }

    #[test]
    fn messages_serialize_with_role_tag() {
        let message = ChatMessage::Assistant {
            content: None,
            tool_calls: vec![ToolInvocation {
                id: "c1".to_string(),
                name: "list_files".to_string(),
                arguments: "{}".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({
                "role": "assistant",
                "tool_calls": [{"id": "c1", "name": "list_files", "arguments": "{}"}]
            })
        );
    }
}
