use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wait::WaitCondition;

/// The closed set of interface operations kestrel can perform.
///
/// Decision payloads arrive from an external decision-maker and are only
/// loosely typed on their side; deserializing into this enum is the
/// validation boundary. Unknown kinds fail deserialization and are never
/// executed speculatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    #[serde(alias = "select_option")]
    Select,
    FillDate,
    Upload,
    Wait,
    Scroll,
    Hover,
    Assert,
    FillField,
    Toggle,
    Clear,
    Focus,
    Blur,
    PressKey,
    Screenshot,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::FillDate => "fill_date",
            ActionKind::Upload => "upload",
            ActionKind::Wait => "wait",
            ActionKind::Scroll => "scroll",
            ActionKind::Hover => "hover",
            ActionKind::Assert => "assert",
            ActionKind::FillField => "fill_field",
            ActionKind::Toggle => "toggle",
            ActionKind::Clear => "clear",
            ActionKind::Focus => "focus",
            ActionKind::Blur => "blur",
            ActionKind::PressKey => "press_key",
            ActionKind::Screenshot => "screenshot",
        }
    }
}

/// Retry policy for a single action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first try
    pub max_attempts: u32,
    /// Fixed delay between attempts
    #[serde(default)]
    pub backoff_ms: u64,
}

/// One discrete interface operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,

    /// Target locator; may be a comma-separated fallback chain of
    /// alternative selectors tried in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Value payload (text to type, URL to open, option to select, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// File paths for upload actions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Per-action timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Conditions to await after the action completes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for: Vec<WaitCondition>,

    /// Retry policy; absent means a single attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Request a screenshot with the observation following this action
    #[serde(default)]
    pub observe: bool,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            value: None,
            files: Vec::new(),
            timeout_ms: None,
            wait_for: Vec::new(),
            retry: None,
            observe: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.retry = Some(RetryPolicy {
            max_attempts,
            backoff_ms,
        });
        self
    }

    pub fn with_wait(mut self, cond: WaitCondition) -> Self {
        self.wait_for.push(cond);
        self
    }

    /// Identity used by the repetition guard: kind, target and value.
    ///
    /// Two actions with the same fingerprint are "the same attempt" from
    /// the loop-breaker's point of view, whatever else differs.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}",
            self.kind.as_str(),
            self.target.as_deref().unwrap_or(""),
            self.value.as_deref().unwrap_or("")
        )
    }

    /// Split the target locator into its fallback-chain alternatives
    pub fn target_chain(&self) -> Vec<String> {
        split_targets(self.target.as_deref().unwrap_or(""))
    }

    /// Check per-kind required fields.
    ///
    /// This runs at the boundary, right after deserialization, so a
    /// malformed action is rejected before anything touches the browser.
    pub fn validate(&self) -> Result<()> {
        let need_target = |field: &Option<String>| -> Result<()> {
            match field {
                Some(t) if !t.trim().is_empty() => Ok(()),
                _ => Err(Error::Validation(format!(
                    "action '{}' requires a target",
                    self.kind.as_str()
                ))),
            }
        };
        let need_value = |field: &Option<String>| -> Result<()> {
            match field {
                Some(v) if !v.is_empty() => Ok(()),
                _ => Err(Error::Validation(format!(
                    "action '{}' requires a value",
                    self.kind.as_str()
                ))),
            }
        };

        match self.kind {
            ActionKind::Navigate => {
                let url = self
                    .value
                    .as_deref()
                    .or(self.target.as_deref())
                    .unwrap_or("");
                if url.trim().is_empty() {
                    return Err(Error::Validation(
                        "action 'navigate' requires a URL in value or target".to_string(),
                    ));
                }
                Ok(())
            }
            ActionKind::Click
            | ActionKind::Hover
            | ActionKind::Focus
            | ActionKind::Blur
            | ActionKind::Clear
            | ActionKind::Toggle
            | ActionKind::Assert => need_target(&self.target),
            ActionKind::Type
            | ActionKind::Select
            | ActionKind::FillDate
            | ActionKind::FillField => {
                need_target(&self.target)?;
                need_value(&self.value)
            }
            ActionKind::Upload => {
                need_target(&self.target)?;
                if self.files.is_empty() {
                    return Err(Error::Validation(
                        "action 'upload' requires at least one file".to_string(),
                    ));
                }
                Ok(())
            }
            ActionKind::PressKey => need_value(&self.value),
            ActionKind::Wait => {
                if self.wait_for.is_empty() && self.value.is_none() && self.timeout_ms.is_none() {
                    return Err(Error::Validation(
                        "action 'wait' requires wait_for conditions or a duration".to_string(),
                    ));
                }
                Ok(())
            }
            ActionKind::Scroll | ActionKind::Screenshot => Ok(()),
        }
    }
}

/// Parse a comma-separated fallback chain of selectors.
///
/// Empty alternatives are dropped; order is preserved because the
/// executor tries alternatives strictly in order.
pub fn split_targets(target: &str) -> Vec<String> {
    target
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
