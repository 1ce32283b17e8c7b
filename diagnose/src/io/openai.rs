//! Reasoning engine backed by an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::engine::{ChatMessage, ReasoningEngine, ToolChoice, ToolInvocation, Turn, TurnRequest};
use crate::io::config::EngineConfig;

/// Content sent for assistant tool calls that never received a result.
const SKIPPED_TOOL_RESULT: &str = "This tool is not available. No result was produced.";

/// Longest error body echoed into error messages.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: Option<f32>,
    client: Client,
}

impl OpenAiEngine {
    /// Build an engine from config. The API key is read from `api_key_env`;
    /// a missing key is allowed for local endpoints.
    pub fn new(cfg: &EngineConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(env = %cfg.api_key_env, "no API key set, sending unauthenticated requests");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key,
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            client,
        })
    }

    fn build_payload(&self, request: TurnRequest<'_>) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": encode_messages(request.messages),
            "max_tokens": self.max_tokens,
            "stream": false,
        });
        if let Some(temperature) = self.temperature {
            payload["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|spec| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": spec.name,
                            "description": spec.description,
                            "parameters": strip_schema_keywords(&spec.parameters),
                        }
                    })
                })
                .collect();
            payload["tools"] = json!(tools);
            payload["tool_choice"] = match request.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Force(name) => json!({
                    "type": "function",
                    "function": {"name": name}
                }),
            };
        }
        payload
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: TurnRequest<'_>) -> Result<Turn> {
        let payload = self.build_payload(request);
        let mut http = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .with_context(|| format!("send chat request to {}", self.endpoint))?;
        let status = response.status();
        let body = response.text().await.context("read chat response body")?;
        if !status.is_success() {
            let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(anyhow!("chat request failed with status {status}: {snippet}"));
        }

        let turn = parse_turn(&body)?;
        debug!(
            tool_calls = turn.tool_calls.len(),
            narrated = turn.narration.is_some(),
            "engine turn received"
        );
        Ok(turn)
    }
}

/// Encode the conversation, answering any dangling tool call so the provider
/// accepts the history.
fn encode_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    let mut pending: Vec<String> = Vec::new();

    for message in messages {
        if !matches!(message, ChatMessage::Tool { .. }) {
            flush_pending(&mut out, &mut pending);
        }
        match message {
            ChatMessage::System { content } => out.push(json!({"role": "system", "content": content})),
            ChatMessage::User { content } => out.push(json!({"role": "user", "content": content})),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut msg = json!({"role": "assistant", "content": content});
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {"name": call.name, "arguments": call.arguments}
                            })
                        })
                        .collect();
                    msg["tool_calls"] = json!(calls);
                    pending = tool_calls.iter().map(|call| call.id.clone()).collect();
                }
                out.push(msg);
            }
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => {
                pending.retain(|id| id != tool_call_id);
                out.push(json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}));
            }
        }
    }
    flush_pending(&mut out, &mut pending);
    out
}

fn flush_pending(out: &mut Vec<Value>, pending: &mut Vec<String>) {
    for id in pending.drain(..) {
        out.push(json!({"role": "tool", "tool_call_id": id, "content": SKIPPED_TOOL_RESULT}));
    }
}

/// Drop JSON Schema meta keywords providers reject in function parameters.
fn strip_schema_keywords(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}

fn parse_turn(body: &str) -> Result<Turn> {
    let value: Value = serde_json::from_str(body).context("parse chat response")?;
    let message = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("unexpected chat payload: missing choices[0].message"))?;

    let narration = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string);
    let tool_calls = message
        .get("tool_calls")
        .map(parse_tool_calls)
        .unwrap_or_default();

    Ok(Turn {
        narration,
        tool_calls,
    })
}

fn parse_tool_calls(value: &Value) -> Vec<ToolInvocation> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let function = item.get("function")?;
            let name = function.get("name").and_then(Value::as_str)?.trim();
            if name.is_empty() {
                return None;
            }
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) => raw.clone(),
                Some(other) => other.to_string(),
                None => "{}".to_string(),
            };
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.trim().is_empty())
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("tool_call_{}", idx + 1));
            Some(ToolInvocation {
                id,
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}
