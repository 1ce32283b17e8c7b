//! System prompt rendering for diagnostic sessions.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::io::file_index::FileIndex;
use crate::tools::{FINAL_ANSWER, ToolSpec};

const DIAGNOSE_TEMPLATE: &str = include_str!("prompts/diagnose.md");

#[derive(Debug, Clone, Serialize)]
struct ToolContext {
    name: &'static str,
    description: &'static str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("diagnose", DIAGNOSE_TEMPLATE)
            .expect("diagnose template should be valid");
        Self { env }
    }

    /// Render the engine instructions: project tree, task, tool list, rules.
    pub fn render_instructions(&self, index: &FileIndex, tools: &[ToolSpec]) -> Result<String> {
        let tree = index.serialize()?;
        let tree_json = serde_json::to_string(&tree).context("encode project tree")?;
        let tools = tools
            .iter()
            .map(|spec| ToolContext {
                name: spec.name,
                description: spec.description,
            })
            .collect::<Vec<_>>();

        let template = self.env.get_template("diagnose")?;
        let rendered = template.render(context! {
            tree => tree_json,
            tools => tools,
            final_tool => FINAL_ANSWER,
        })?;
        debug!(bytes = rendered.len(), "rendered diagnose instructions");
        Ok(rendered)
    }
}
