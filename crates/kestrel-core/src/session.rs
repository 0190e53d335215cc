use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::observation::Observation;

/// Why a session ended in failure.
///
/// Kept distinct because they are different operational problems: a
/// blocker means the page could not be proceeded past, an exhausted
/// budget means the goal was not reached in time, a decision timeout
/// means the decision-maker never responded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unresolvable obstacle or unrecoverable step failure
    Blocker,
    /// Max-step budget reached with no terminal decision
    BudgetExhausted,
    /// The decision-maker did not respond in time
    DecisionTimeout,
    /// The decision-maker declared stuck or abort
    Declared,
}

/// Session lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed { kind: FailureKind, reason: String },
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// A decision as recorded in session history, keyed to its checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub step: u32,
    pub received_at: DateTime<Utc>,
    pub decision: Decision,
}

/// Aggregate record of one exploration run.
///
/// Histories are append-only; the session orchestrator is the only
/// writer. The record is persisted, never destroyed, at the end of the
/// run so it can be audited or replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationSession {
    pub id: String,
    pub goal: String,
    pub start_url: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub steps_taken: u32,
    pub obstacles_cleared: u32,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
}

impl ExplorationSession {
    pub fn new(goal: impl Into<String>, start_url: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            id: format!("session-{}", started_at.format("%Y%m%d-%H%M%S%.3f")),
            goal: goal.into(),
            start_url: start_url.into(),
            status: SessionStatus::Running,
            started_at,
            ended_at: None,
            steps_taken: 0,
            obstacles_cleared: 0,
            observations: Vec::new(),
            decisions: Vec::new(),
        }
    }

    pub fn record_observation(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub fn record_decision(&mut self, step: u32, decision: Decision) {
        self.decisions.push(DecisionRecord {
            step,
            received_at: Utc::now(),
            decision,
        });
    }

    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, kind: FailureKind, reason: impl Into<String>) {
        self.status = SessionStatus::Failed {
            kind,
            reason: reason.into(),
        };
        self.ended_at = Some(Utc::now());
    }

    /// Latest recorded observation, if any
    pub fn last_observation(&self) -> Option<&Observation> {
        self.observations.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_running() {
        let session = ExplorationSession::new("find pricing", "https://example.com");
        assert_eq!(session.status, SessionStatus::Running);
        assert!(!session.status.is_terminal());
        assert!(session.id.starts_with("session-"));
    }

    #[test]
    fn test_complete_sets_terminal_state() {
        let mut session = ExplorationSession::new("goal", "https://example.com");
        session.complete();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_failure_kinds_stay_distinct_in_serialized_form() {
        let mut timeout = ExplorationSession::new("goal", "https://example.com");
        timeout.fail(FailureKind::DecisionTimeout, "no decision within 300s");

        let mut budget = ExplorationSession::new("goal", "https://example.com");
        budget.fail(FailureKind::BudgetExhausted, "10 steps spent");

        let timeout_json = serde_json::to_string(&timeout.status).unwrap();
        let budget_json = serde_json::to_string(&budget.status).unwrap();
        assert!(timeout_json.contains("decision_timeout"));
        assert!(budget_json.contains("budget_exhausted"));
    }
}
