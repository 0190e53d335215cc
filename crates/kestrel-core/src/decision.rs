use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::Result;

/// Continuation tag returned by the decision-maker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTag {
    Continue,
    GoalAchieved,
    Stuck,
    Abort,
}

/// Defect evidence attached to a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugReport {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// The decision-maker's response to an observation.
///
/// Either a single `action` or an ordered `actions` batch may be given;
/// `batch()` flattens both into one list executed before the next
/// checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: DecisionTag,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,

    /// Halt remaining batch actions on the first failure
    #[serde(default = "default_stop_on_error")]
    pub stop_on_error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_report: Option<BugReport>,
}

fn default_stop_on_error() -> bool {
    true
}

impl Decision {
    /// The ordered action batch this decision asks for
    pub fn batch(&self) -> Vec<Action> {
        let mut out = Vec::with_capacity(self.actions.len() + 1);
        if let Some(action) = &self.action {
            out.push(action.clone());
        }
        out.extend(self.actions.iter().cloned());
        out
    }

    /// Validate every action in the batch; a continue decision with no
    /// actions is also malformed.
    pub fn validate(&self) -> Result<()> {
        for action in self.batch() {
            action.validate()?;
        }
        if self.decision == DecisionTag::Continue && self.action.is_none() && self.actions.is_empty()
        {
            return Err(crate::Error::Validation(
                "continue decision carries no actions".to_string(),
            ));
        }
        Ok(())
    }
}
