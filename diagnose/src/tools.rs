//! Fixed tool vocabulary exposed to the reasoning engine.
//!
//! Every invocation is parsed into a closed [`ToolCall`] before anything runs:
//! arguments are checked against the tool's JSON Schema, and failures come back
//! as [`ToolError`] text the session feeds into the conversation so the engine
//! can correct itself.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

use anyhow::{Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::core::state::Verdict;
use crate::engine::ToolInvocation;
use crate::io::file_index::FileIndex;

pub const LIST_FILES: &str = "list_files";
pub const READ_FILE_BY_ID: &str = "read_file_by_id";
pub const FINAL_ANSWER: &str = "final_answer";

const LIST_FILES_SCHEMA: &str = include_str!("../schemas/list_files.schema.json");
const READ_FILE_BY_ID_SCHEMA: &str = include_str!("../schemas/read_file_by_id.schema.json");
const FINAL_ANSWER_SCHEMA: &str = include_str!("../schemas/final_answer.schema.json");

/// Declared shape of one tool, as advertised to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// A validated invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListFiles,
    ReadFileById { id: String },
    FinalAnswer(Verdict),
    /// Name outside the vocabulary; dispatch skips it.
    Unrecognized { name: String },
}

/// Invocation rejected before the tool body ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    InvalidJson { tool: String, message: String },
    SchemaViolation { tool: String, errors: Vec<String> },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::InvalidJson { tool, message } => {
                write!(f, "Invalid arguments for `{tool}`: not valid JSON ({message}).")
            }
            ToolError::SchemaViolation { tool, errors } => write!(
                f,
                "Invalid arguments for `{tool}`: {}. Fix the arguments and call the tool again.",
                errors.join("; ")
            ),
        }
    }
}

impl std::error::Error for ToolError {}

/// Tool catalog plus compiled argument validators.
pub struct ToolSet {
    specs: Vec<ToolSpec>,
    validators: HashMap<&'static str, Validator>,
    max_file_bytes: usize,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.specs.iter().map(|s| s.name).collect::<Vec<_>>())
            .field("max_file_bytes", &self.max_file_bytes)
            .finish()
    }
}

impl ToolSet {
    pub fn new(max_file_bytes: usize) -> Result<Self> {
        let definitions = [
            (
                LIST_FILES,
                "Returns the project tree: every file and directory with its id.",
                LIST_FILES_SCHEMA,
            ),
            (
                READ_FILE_BY_ID,
                "Use this tool to get the content of a file in the project. Provide the id of the file.",
                READ_FILE_BY_ID_SCHEMA,
            ),
            (
                FINAL_ANSWER,
                "Give your final diagnostic. Calling this tool ends the analysis.",
                FINAL_ANSWER_SCHEMA,
            ),
        ];

        let mut specs = Vec::with_capacity(definitions.len());
        let mut validators = HashMap::with_capacity(definitions.len());
        for (name, description, raw) in definitions {
            let parameters: Value = serde_json::from_str(raw)
                .map_err(|err| anyhow!("parse {name} schema: {err}"))?;
            let validator = validator_for(&parameters)
                .map_err(|err| anyhow!("invalid {name} schema: {err}"))?;
            validators.insert(name, validator);
            specs.push(ToolSpec {
                name,
                description,
                parameters,
            });
        }

        Ok(Self {
            specs,
            validators,
            max_file_bytes,
        })
    }

    pub fn catalog(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Validate an invocation and map it onto the closed vocabulary.
    pub fn parse(&self, invocation: &ToolInvocation) -> Result<ToolCall, ToolError> {
        let name = invocation.name.as_str();
        let Some(validator) = self.validators.get(name) else {
            return Ok(ToolCall::Unrecognized {
                name: invocation.name.clone(),
            });
        };

        let raw = invocation.arguments.trim();
        let args: Value = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).map_err(|err| ToolError::InvalidJson {
                tool: name.to_string(),
                message: err.to_string(),
            })?
        };

        if !validator.is_valid(&args) {
            let errors = validator
                .iter_errors(&args)
                .map(|err| err.to_string())
                .collect::<Vec<_>>();
            debug!(tool = name, ?errors, "tool arguments rejected");
            return Err(ToolError::SchemaViolation {
                tool: name.to_string(),
                errors,
            });
        }

        match name {
            LIST_FILES => Ok(ToolCall::ListFiles),
            READ_FILE_BY_ID => {
                let id = args
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(ToolCall::ReadFileById { id })
            }
            FINAL_ANSWER => serde_json::from_value::<Verdict>(args)
                .map(ToolCall::FinalAnswer)
                .map_err(|err| ToolError::SchemaViolation {
                    tool: name.to_string(),
                    errors: vec![err.to_string()],
                }),
            _ => Ok(ToolCall::Unrecognized {
                name: invocation.name.clone(),
            }),
        }
    }

    /// Body of `list_files`.
    pub fn list_files(&self, index: &FileIndex) -> String {
        match index.serialize() {
            Ok(tree) => tree.to_string(),
            Err(err) => format!("The project tree could not be listed: {err:#}"),
        }
    }

    /// Body of `read_file_by_id`. Failures are returned as text, never raised.
    ///
    /// Only regular files are read; symlinks and special files are leaves.
    pub async fn read_file(&self, index: &FileIndex, id: &str) -> String {
        let path = match index.resolve(id) {
            Ok(path) => path,
            Err(_) => return format!("No file with id {id} seems to exist."),
        };
        match read_bounded(path, self.max_file_bytes).await {
            Ok(text) => text,
            Err(err) => format!("The file with id {id} exists but failed to open: {err}"),
        }
    }
}

async fn read_bounded(path: &Path, limit: usize) -> io::Result<String> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if !metadata.is_file() {
        return Err(io::Error::other("not a regular file"));
    }

    let file = tokio::fs::File::open(path).await?;
    let expected = usize::try_from(metadata.len()).unwrap_or(limit);
    let mut bytes = Vec::with_capacity(limit.min(expected) + 1);
    file.take(limit as u64 + 1).read_to_end(&mut bytes).await?;
    Ok(render_file(bytes, limit, metadata.len()))
}

fn render_file(mut bytes: Vec<u8>, limit: usize, total: u64) -> String {
    if bytes.len() <= limit {
        return String::from_utf8_lossy(&bytes).into_owned();
    }
    bytes.truncate(limit);
    let dropped = total.saturating_sub(limit as u64).max(1);
    format!(
        "{}\n[truncated {} bytes]\n",
        String::from_utf8_lossy(&bytes),
        dropped
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::MissingScripts;
    use crate::test_support::TestTree;

    fn invocation(name: &str, arguments: &str) -> ToolInvocation {
        ToolInvocation {
            id: "call-1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn tools() -> ToolSet {
        ToolSet::new(1024).expect("tool set")
    }

    #[test]
    fn catalog_lists_the_fixed_vocabulary() {
        let names: Vec<_> = tools().catalog().iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec![LIST_FILES, READ_FILE_BY_ID, FINAL_ANSWER]);
    }

    #[test]
    fn parses_read_file_by_id() {
        let call = tools()
            .parse(&invocation(READ_FILE_BY_ID, r#"{"id":"f1"}"#))
            .expect("parse");
        assert_eq!(call, ToolCall::ReadFileById { id: "f1".to_string() });
    }

    #[test]
    fn list_files_accepts_empty_arguments() {
        assert_eq!(
            tools().parse(&invocation(LIST_FILES, "")).expect("parse"),
            ToolCall::ListFiles
        );
    }

    #[test]
    fn rejects_wrongly_typed_arguments() {
        let err = tools()
            .parse(&invocation(READ_FILE_BY_ID, r#"{"id":7}"#))
            .expect_err("schema violation");
        assert!(matches!(err, ToolError::SchemaViolation { ref tool, .. } if tool == READ_FILE_BY_ID));
        assert!(err.to_string().starts_with("Invalid arguments for `read_file_by_id`"));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = tools()
            .parse(&invocation(READ_FILE_BY_ID, "{id:"))
            .expect_err("invalid json");
        assert!(matches!(err, ToolError::InvalidJson { .. }));
    }

    #[test]
    fn unknown_tool_is_unrecognized_not_an_error() {
        let call = tools()
            .parse(&invocation("run_shell", "not even json"))
            .expect("parse");
        assert_eq!(
            call,
            ToolCall::Unrecognized {
                name: "run_shell".to_string()
            }
        );
    }

    #[test]
    fn final_answer_requires_exact_shape() {
        let set = tools();
        let ok = set
            .parse(&invocation(
                FINAL_ANSWER,
                r#"{"success":true,"projectSummary":"a CLI tool","missingConfig":false,"missingScripts":{"missing":true,"what":"build","explanation":"no build script"}}"#,
            ))
            .expect("valid verdict");
        let ToolCall::FinalAnswer(verdict) = ok else {
            panic!("expected final answer");
        };
        assert_eq!(
            verdict.missing_scripts,
            MissingScripts::Missing {
                what: "build".to_string(),
                explanation: "no build script".to_string()
            }
        );

        let extra = set.parse(&invocation(
            FINAL_ANSWER,
            r#"{"success":true,"projectSummary":"x","missingConfig":false,"missingScripts":{"missing":false},"complete":true}"#,
        ));
        assert!(extra.is_err());

        let incomplete = set.parse(&invocation(
            FINAL_ANSWER,
            r#"{"success":true,"projectSummary":"x","missingConfig":false,"missingScripts":{"missing":true}}"#,
        ));
        assert!(incomplete.is_err());
    }

    #[tokio::test]
    async fn read_file_returns_contents_or_explanations() {
        let tree = TestTree::new().expect("tree");
        tree.write("a.ts", "export const a = 1;\n").expect("write");
        tree.mkdir("src").expect("mkdir");
        let index = FileIndex::build(tree.path()).expect("index");
        let set = tools();

        let a_id = index.root().find(&["a.ts"]).expect("a.ts").id.clone();
        assert_eq!(
            set.read_file(&index, a_id.as_str()).await,
            "export const a = 1;\n"
        );

        assert_eq!(
            set.read_file(&index, "zzz").await,
            "No file with id zzz seems to exist."
        );

        let dir_id = index.root().find(&["src"]).expect("src").id.clone();
        let message = set.read_file(&index, dir_id.as_str()).await;
        assert!(message.contains("exists but failed to open"), "{message}");
    }

    #[tokio::test]
    async fn read_file_truncates_large_files() {
        let tree = TestTree::new().expect("tree");
        tree.write("big.txt", &"x".repeat(40)).expect("write");
        let index = FileIndex::build(tree.path()).expect("index");
        let set = ToolSet::new(10).expect("tool set");

        let id = index.root().find(&["big.txt"]).expect("big").id.clone();
        let text = set.read_file(&index, id.as_str()).await;
        assert_eq!(text, format!("{}\n[truncated 30 bytes]\n", "x".repeat(10)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn special_files_and_symlinks_are_not_read() {
        let tree = TestTree::new().expect("tree");
        let outside = TestTree::new().expect("outside");
        let secret = outside.write("secret.txt", "TOP SECRET").expect("write");
        std::os::unix::fs::symlink(&secret, tree.path().join("link")).expect("symlink");
        std::os::unix::fs::symlink("/dev/zero", tree.path().join("zero")).expect("symlink");
        let status = std::process::Command::new("mkfifo")
            .arg(tree.path().join("pipe"))
            .status()
            .expect("mkfifo");
        assert!(status.success());

        let index = FileIndex::build(tree.path()).expect("index");
        let set = tools();
        for name in ["link", "zero", "pipe"] {
            let id = index.root().find(&[name]).expect(name).id.clone();
            let text = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                set.read_file(&index, id.as_str()),
            )
            .await
            .expect("read must not block");
            assert_eq!(
                text,
                format!("The file with id {id} exists but failed to open: not a regular file")
            );
        }
    }

    #[test]
    fn list_files_returns_tree_json() {
        let tree = TestTree::new().expect("tree");
        tree.write("package.json", "{}").expect("write");
        let index = FileIndex::build(tree.path()).expect("index");

        let listed: Value = serde_json::from_str(&tools().list_files(&index)).expect("json");
        assert_eq!(listed["kind"], "directory");
        assert_eq!(listed["children"][0]["name"], "package.json");
    }
}
