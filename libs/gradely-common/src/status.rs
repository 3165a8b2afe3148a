//! Solution status lifecycle.
//!
//! The status field is the one piece of shared mutable state in the
//! grading pipeline; every write goes through [`check_transition`] plus an
//! atomic compare-and-set in the repository. Out-of-order deliveries (a
//! stale `running` callback after `ok` was recorded, a duplicate terminal
//! result) are rejected here instead of corrupting the persisted state.

use serde::{Deserialize, Serialize};

use crate::error::GradingError;

/// Lifecycle states of a [`crate::types::Solution`].
///
/// Transition table:
///
/// | from      | allowed to   | trigger                                  |
/// |-----------|--------------|------------------------------------------|
/// | pending   | running      | grader acknowledged asynchronously       |
/// | pending   | ok / not_ok  | grader returned a synchronous verdict    |
/// | pending   | missing      | dispatch retries exhausted               |
/// | running   | ok / not_ok  | poll / callback reported a verdict       |
/// | running   | missing      | polling exhausted, grader lost the job   |
/// | any       | pending      | explicit re-submission                   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    Pending,
    Running,
    Ok,
    NotOk,
    /// Gradable, but grading was bypassed (manual override). Terminal.
    Submitted,
    /// Grading infrastructure was unreachable. Terminal, and deliberately
    /// distinct from `not_ok`: it says nothing about the learner's code.
    Missing,
    /// Initial and terminal state for non-gradable tasks.
    SubmittedWithoutGrading,
}

impl SolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolutionStatus::Pending => "pending",
            SolutionStatus::Running => "running",
            SolutionStatus::Ok => "ok",
            SolutionStatus::NotOk => "not_ok",
            SolutionStatus::Submitted => "submitted",
            SolutionStatus::Missing => "missing",
            SolutionStatus::SubmittedWithoutGrading => "submitted_without_grading",
        }
    }

    /// No further automatic transition leaves this state; only an explicit
    /// re-submission does.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SolutionStatus::Ok
                | SolutionStatus::NotOk
                | SolutionStatus::Submitted
                | SolutionStatus::Missing
                | SolutionStatus::SubmittedWithoutGrading
        )
    }

    /// Whether the transition `self -> to` appears in the table above.
    pub fn allows(&self, to: SolutionStatus) -> bool {
        // Re-submission resets any state back to pending.
        if to == SolutionStatus::Pending {
            return true;
        }
        match self {
            SolutionStatus::Pending => matches!(
                to,
                SolutionStatus::Running
                    | SolutionStatus::Ok
                    | SolutionStatus::NotOk
                    | SolutionStatus::Missing
            ),
            SolutionStatus::Running => matches!(
                to,
                SolutionStatus::Ok | SolutionStatus::NotOk | SolutionStatus::Missing
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a status transition, returning the illegal pair otherwise.
pub fn check_transition(from: SolutionStatus, to: SolutionStatus) -> Result<(), GradingError> {
    if from.allows(to) {
        Ok(())
    } else {
        Err(GradingError::IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    const ALL: [SolutionStatus; 7] = [
        SolutionStatus::Pending,
        SolutionStatus::Running,
        SolutionStatus::Ok,
        SolutionStatus::NotOk,
        SolutionStatus::Submitted,
        SolutionStatus::Missing,
        SolutionStatus::SubmittedWithoutGrading,
    ];

    /// The full table, spelled out pair by pair.
    fn legal(from: SolutionStatus, to: SolutionStatus) -> bool {
        use SolutionStatus::*;
        matches!(
            (from, to),
            (Pending, Running)
                | (Pending, Ok)
                | (Pending, NotOk)
                | (Pending, Missing)
                | (Running, Ok)
                | (Running, NotOk)
                | (Running, Missing)
                | (_, Pending)
        )
    }

    #[test]
    fn test_transition_table_exhaustive() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.allows(to),
                    legal(from, to),
                    "disagreement on {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_only_accept_resubmission() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                if to == SolutionStatus::Pending {
                    assert!(from.allows(to));
                } else {
                    assert!(!from.allows(to), "{} -> {} should be rejected", from, to);
                }
            }
        }
    }

    /// Random transition sequences: walk the machine, attempting a random
    /// target each step. Illegal attempts must error and leave the current
    /// state untouched; legal ones advance it.
    #[test]
    fn test_random_sequences_never_escape_the_table() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let mut current = SolutionStatus::Pending;
            for _ in 0..rng.gen_range(1..30) {
                let target = *ALL.choose(&mut rng).unwrap();
                match check_transition(current, target) {
                    Ok(()) => {
                        assert!(legal(current, target));
                        current = target;
                    }
                    Err(GradingError::IllegalTransition { from, to }) => {
                        assert_eq!(from, current);
                        assert_eq!(to, target);
                        // state unchanged, keep walking
                    }
                    Err(other) => panic!("unexpected error: {}", other),
                }
            }
        }
    }

    #[test]
    fn test_wire_names_match_storage_format() {
        assert_eq!(SolutionStatus::NotOk.as_str(), "not_ok");
        assert_eq!(
            SolutionStatus::SubmittedWithoutGrading.as_str(),
            "submitted_without_grading"
        );
        let json = serde_json::to_string(&SolutionStatus::NotOk).unwrap();
        assert_eq!(json, "\"not_ok\"");
    }
}
