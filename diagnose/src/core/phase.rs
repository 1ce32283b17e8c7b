//! Session lifecycle phases and the allowed transitions between them.

use std::fmt;

/// Where a diagnostic session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Reasoning,
    ToolDispatch,
    Completing,
    Complete,
    Errored,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Initializing => "initializing",
            SessionPhase::Reasoning => "reasoning",
            SessionPhase::ToolDispatch => "tool_dispatch",
            SessionPhase::Completing => "completing",
            SessionPhase::Complete => "complete",
            SessionPhase::Errored => "errored",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Complete | SessionPhase::Errored)
    }

    /// True if `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::{Complete, Completing, Errored, Initializing, Reasoning, ToolDispatch};

        if next == Errored {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Initializing, Reasoning)
                | (Reasoning, ToolDispatch)
                | (Reasoning, Reasoning)
                | (ToolDispatch, Reasoning)
                | (ToolDispatch, Completing)
                | (Completing, Complete)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected phase change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid session transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Validate and apply a phase change.
pub fn transition(current: &mut SessionPhase, next: SessionPhase) -> Result<(), InvalidTransition> {
    if !current.can_transition_to(next) {
        return Err(InvalidTransition {
            from: *current,
            to: next,
        });
    }
    *current = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let mut phase = SessionPhase::Initializing;
        for next in [
            SessionPhase::Reasoning,
            SessionPhase::ToolDispatch,
            SessionPhase::Reasoning,
            SessionPhase::ToolDispatch,
            SessionPhase::Completing,
            SessionPhase::Complete,
        ] {
            transition(&mut phase, next).expect("transition");
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn errored_reachable_from_every_non_terminal_phase() {
        for phase in [
            SessionPhase::Initializing,
            SessionPhase::Reasoning,
            SessionPhase::ToolDispatch,
            SessionPhase::Completing,
        ] {
            assert!(phase.can_transition_to(SessionPhase::Errored), "{phase}");
        }
    }

    #[test]
    fn terminal_phases_are_sticky() {
        for phase in [SessionPhase::Complete, SessionPhase::Errored] {
            for next in [
                SessionPhase::Reasoning,
                SessionPhase::Errored,
                SessionPhase::Completing,
            ] {
                assert!(!phase.can_transition_to(next));
            }
        }
    }

    #[test]
    fn cannot_skip_completing() {
        let mut phase = SessionPhase::ToolDispatch;
        let err = transition(&mut phase, SessionPhase::Complete).expect_err("should fail");
        assert_eq!(err.to_string(), "invalid session transition tool_dispatch -> complete");
        assert_eq!(phase, SessionPhase::ToolDispatch);
    }
}
