use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::ClassifiedEvent;

/// Per-category caps keeping observations bounded and comparable
pub const MAX_BUTTONS: usize = 25;
pub const MAX_INPUTS: usize = 30;
pub const MAX_LINKS: usize = 20;
pub const MAX_TEXTS: usize = 50;
pub const MAX_DROPDOWNS: usize = 10;

/// Coarse form-completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    NoForm,
    Empty,
    PartiallyFilled,
    Complete,
}

impl FormStatus {
    /// Derive the status from filled/required input counters
    pub fn from_counts(total_inputs: usize, filled: usize, required: usize, required_filled: usize) -> Self {
        if total_inputs == 0 {
            FormStatus::NoForm
        } else if filled == 0 {
            FormStatus::Empty
        } else if required > 0 && required_filled >= required {
            FormStatus::Complete
        } else if required == 0 && filled >= total_inputs {
            FormStatus::Complete
        } else {
            FormStatus::PartiallyFilled
        }
    }
}

/// Summary of one visible input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSummary {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default)]
    pub filled: bool,
    #[serde(default)]
    pub required: bool,
}

/// Summary of one visible link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Summary of one select/dropdown and its choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownSummary {
    pub selector: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

/// Bounded summary of the interactive page surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    #[serde(default)]
    pub buttons: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<InputSummary>,
    #[serde(default)]
    pub links: Vec<LinkSummary>,
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub dropdowns: Vec<DropdownSummary>,
    #[serde(default)]
    pub modal_present: bool,
}

impl PageSummary {
    /// Apply the per-category caps and de-duplicate, preserving first
    /// occurrence order.
    pub fn bounded(mut self) -> Self {
        self.buttons = dedup_capped(self.buttons, MAX_BUTTONS);
        self.texts = dedup_capped(self.texts, MAX_TEXTS);
        self.inputs.truncate(MAX_INPUTS);
        self.dropdowns.truncate(MAX_DROPDOWNS);

        let mut seen = std::collections::HashSet::new();
        self.links.retain(|l| seen.insert(l.text.clone()));
        self.links.truncate(MAX_LINKS);
        self
    }
}

fn dedup_capped(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let trimmed = item.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.clone()) {
            out.push(trimmed);
            if out.len() >= cap {
                break;
            }
        }
    }
    out
}

/// Immutable snapshot of page state at a checkpoint.
///
/// The event lists hold only events that have not appeared in any prior
/// observation; the engine enforces this with a monotonic cursor into the
/// session event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub step: u32,
    pub captured_at: DateTime<Utc>,
    pub url: String,
    pub title: String,
    pub url_changed: bool,
    pub summary: PageSummary,
    pub form_status: FormStatus,
    #[serde(default)]
    pub new_console_events: Vec<ClassifiedEvent>,
    #[serde(default)]
    pub new_network_events: Vec<ClassifiedEvent>,
    /// Failures from the batch that preceded this checkpoint
    #[serde(default)]
    pub action_errors: Vec<String>,
    /// Sections that degraded during capture
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Path to a screenshot file, when one was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}
