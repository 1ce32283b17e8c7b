//! Step guard evaluated before every engine invocation.
//!
//! The guard is the session's only liveness mechanism: once the step ceiling is
//! exceeded (or the engine yields a turn without calling any tool) the next
//! invocation is constrained to `final_answer`, and a bounded number of ignored
//! forced turns ends the session.

use std::fmt;

/// Why the next turn was constrained to `final_answer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReason {
    /// `step_count` exceeded the configured ceiling.
    StepCeiling,
    /// The previous turn produced narration only.
    EngineYielded,
}

/// What the next engine invocation is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirective {
    /// The engine picks tools freely.
    Free,
    /// The engine must call `final_answer`.
    ForceFinalAnswer(ForceReason),
}

/// Loop counters the guard needs, owned by the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnProgress {
    /// Completed engine turns.
    pub step_count: u32,
    /// Previous turn ended without any tool invocation.
    pub yielded: bool,
    /// Consecutive forced turns that did not conclude the session.
    pub forced_turns: u32,
}

/// Raised when the engine ignores every forced `final_answer` turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardExhausted {
    pub step_count: u32,
    pub forced_turns: u32,
}

impl fmt::Display for GuardExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "engine did not call final_answer after {} forced turns ({} steps)",
            self.forced_turns, self.step_count
        )
    }
}

impl std::error::Error for GuardExhausted {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepGuard {
    step_ceiling: u32,
    forced_turn_limit: u32,
}

impl StepGuard {
    pub fn new(step_ceiling: u32, forced_turn_limit: u32) -> Self {
        Self {
            step_ceiling,
            forced_turn_limit,
        }
    }

    pub fn evaluate(&self, progress: &TurnProgress) -> Result<TurnDirective, GuardExhausted> {
        if progress.forced_turns >= self.forced_turn_limit {
            return Err(GuardExhausted {
                step_count: progress.step_count,
                forced_turns: progress.forced_turns,
            });
        }
        if progress.step_count > self.step_ceiling {
            return Ok(TurnDirective::ForceFinalAnswer(ForceReason::StepCeiling));
        }
        if progress.yielded {
            return Ok(TurnDirective::ForceFinalAnswer(ForceReason::EngineYielded));
        }
        Ok(TurnDirective::Free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_until_ceiling_is_exceeded() {
        let guard = StepGuard::new(3, 2);
        for step_count in 0..=3 {
            let progress = TurnProgress {
                step_count,
                ..TurnProgress::default()
            };
            assert_eq!(guard.evaluate(&progress), Ok(TurnDirective::Free));
        }
        let progress = TurnProgress {
            step_count: 4,
            ..TurnProgress::default()
        };
        assert_eq!(
            guard.evaluate(&progress),
            Ok(TurnDirective::ForceFinalAnswer(ForceReason::StepCeiling))
        );
    }

    #[test]
    fn yielded_turn_forces_final_answer() {
        let guard = StepGuard::new(100, 2);
        let progress = TurnProgress {
            step_count: 1,
            yielded: true,
            forced_turns: 0,
        };
        assert_eq!(
            guard.evaluate(&progress),
            Ok(TurnDirective::ForceFinalAnswer(ForceReason::EngineYielded))
        );
    }

    #[test]
    fn ignored_forced_turns_exhaust_the_guard() {
        let guard = StepGuard::new(1, 2);
        let progress = TurnProgress {
            step_count: 4,
            yielded: false,
            forced_turns: 2,
        };
        let err = guard.evaluate(&progress).expect_err("exhausted");
        assert_eq!(err.forced_turns, 2);
        assert!(err.to_string().contains("did not call final_answer"));
    }
}
