//! The accumulating diagnostic verdict and its monotonic update rules.
//!
//! [`DiagnosticCell`] is the only place a [`DiagnosticState`] changes. Once a
//! state is marked `complete`, every later update is refused, regardless of
//! which code path attempts it.

use serde::{Deserialize, Serialize};

use crate::engine::EngineSnapshot;

/// Whether the repository lacks the scripts needed to install/build/run it.
///
/// Serialized as `{"missing": false}` or
/// `{"missing": true, "what": "...", "explanation": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MissingScriptsRepr", into = "MissingScriptsRepr")]
pub enum MissingScripts {
    None,
    Missing { what: String, explanation: String },
}

#[derive(Serialize, Deserialize)]
struct MissingScriptsRepr {
    missing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    what: Option<String>,
    #[serde(default, alias = "explaination", skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
}

impl TryFrom<MissingScriptsRepr> for MissingScripts {
    type Error = String;

    fn try_from(repr: MissingScriptsRepr) -> Result<Self, Self::Error> {
        if !repr.missing {
            return Ok(Self::None);
        }
        match (repr.what, repr.explanation) {
            (Some(what), Some(explanation)) => Ok(Self::Missing { what, explanation }),
            _ => Err("missingScripts with missing=true requires `what` and `explanation`".into()),
        }
    }
}

impl From<MissingScripts> for MissingScriptsRepr {
    fn from(value: MissingScripts) -> Self {
        match value {
            MissingScripts::None => Self {
                missing: false,
                what: None,
                explanation: None,
            },
            MissingScripts::Missing { what, explanation } => Self {
                missing: true,
                what: Some(what),
                explanation: Some(explanation),
            },
        }
    }
}

/// Arguments of the terminal `final_answer` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Verdict {
    pub success: bool,
    pub project_summary: String,
    pub missing_config: bool,
    pub missing_scripts: MissingScripts,
}

/// Snapshot streamed to the client on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticState {
    pub success: bool,
    pub project_summary: String,
    pub missing_config: bool,
    pub missing_scripts: MissingScripts,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_state: Option<EngineSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for DiagnosticState {
    /// The "not yet diagnosed" value.
    fn default() -> Self {
        Self {
            success: false,
            project_summary: String::new(),
            missing_config: false,
            missing_scripts: MissingScripts::None,
            complete: false,
            engine_state: None,
            error: None,
        }
    }
}

impl DiagnosticState {
    /// Terminal state reported when a session cannot produce a verdict.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            complete: true,
            error: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Owner of the session's [`DiagnosticState`].
///
/// All mutators return `true` when the update was applied and `false` when it
/// was refused because the state is already complete.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCell {
    current: DiagnosticState,
}

impl DiagnosticCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &DiagnosticState {
        &self.current
    }

    /// Replace the engine snapshot wholesale (turn boundary or tool dispatch).
    pub fn record_progress(&mut self, snapshot: EngineSnapshot) -> bool {
        if self.current.complete {
            return false;
        }
        self.current.engine_state = Some(snapshot);
        true
    }

    /// Merge the verdict fields and freeze the state.
    pub fn complete(&mut self, verdict: Verdict, snapshot: EngineSnapshot) -> bool {
        if self.current.complete {
            return false;
        }
        self.current = DiagnosticState {
            success: verdict.success,
            project_summary: verdict.project_summary,
            missing_config: verdict.missing_config,
            missing_scripts: verdict.missing_scripts,
            complete: true,
            engine_state: Some(snapshot),
            error: None,
        };
        true
    }

    /// Replace the state with a terminal failure.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.current.complete {
            return false;
        }
        self.current = DiagnosticState::failed(reason);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verdict() -> Verdict {
        Verdict {
            success: true,
            project_summary: "a CLI tool".to_string(),
            missing_config: false,
            missing_scripts: MissingScripts::None,
        }
    }

    #[test]
    fn missing_scripts_uses_boolean_discriminant() {
        let none = serde_json::to_value(MissingScripts::None).expect("serialize");
        assert_eq!(none, json!({"missing": false}));

        let missing = serde_json::to_value(MissingScripts::Missing {
            what: "build".to_string(),
            explanation: "no build script in package.json".to_string(),
        })
        .expect("serialize");
        assert_eq!(
            missing,
            json!({"missing": true, "what": "build", "explanation": "no build script in package.json"})
        );
    }

    #[test]
    fn missing_scripts_accepts_legacy_spelling() {
        let parsed: MissingScripts = serde_json::from_value(
            json!({"missing": true, "what": "start", "explaination": "no start script"}),
        )
        .expect("parse");
        assert_eq!(
            parsed,
            MissingScripts::Missing {
                what: "start".to_string(),
                explanation: "no start script".to_string()
            }
        );
    }

    #[test]
    fn missing_scripts_rejects_incomplete_missing_variant() {
        let err = serde_json::from_value::<MissingScripts>(json!({"missing": true}))
            .expect_err("should reject");
        assert!(err.to_string().contains("requires `what`"));
    }

    #[test]
    fn default_state_serializes_camel_case_without_engine_state() {
        let value = serde_json::to_value(DiagnosticState::default()).expect("serialize");
        assert_eq!(
            value,
            json!({
                "success": false,
                "projectSummary": "",
                "missingConfig": false,
                "missingScripts": {"missing": false},
                "complete": false
            })
        );
    }

    #[test]
    fn complete_freezes_state() {
        let mut cell = DiagnosticCell::new();
        assert!(cell.record_progress(EngineSnapshot::default()));
        assert!(cell.complete(verdict(), EngineSnapshot::default()));

        let frozen = cell.current().clone();
        assert!(frozen.complete);
        assert!(frozen.success);

        assert!(!cell.record_progress(EngineSnapshot {
            step_count: 42,
            ..EngineSnapshot::default()
        }));
        assert!(!cell.fail("late failure"));
        assert!(!cell.complete(
            Verdict {
                success: false,
                ..verdict()
            },
            EngineSnapshot::default()
        ));
        assert_eq!(cell.current(), &frozen);
    }

    #[test]
    fn fail_resets_to_defaults() {
        let mut cell = DiagnosticCell::new();
        cell.record_progress(EngineSnapshot::default());
        assert!(cell.fail("engine unreachable"));
        let state = cell.current();
        assert!(state.complete);
        assert!(!state.success);
        assert!(state.engine_state.is_none());
        assert_eq!(state.error.as_deref(), Some("engine unreachable"));
    }
}
