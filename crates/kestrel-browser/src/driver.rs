use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use kestrel_core::events::PageEvent;

/// Reported state of a resolved element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl ElementInfo {
    /// True for plain text-entry widgets (clear-then-set fill applies)
    pub fn is_text_entry(&self) -> bool {
        if self.tag == "textarea" {
            return true;
        }
        if self.tag != "input" {
            return false;
        }
        matches!(
            self.input_type.as_deref(),
            None | Some("text")
                | Some("email")
                | Some("password")
                | Some("search")
                | Some("number")
                | Some("tel")
                | Some("url")
        )
    }

    pub fn is_select(&self) -> bool {
        self.tag == "select"
    }

    pub fn is_checkbox(&self) -> bool {
        self.tag == "input"
            && matches!(self.input_type.as_deref(), Some("checkbox") | Some("radio"))
    }

    pub fn is_date(&self) -> bool {
        self.tag == "input"
            && matches!(
                self.input_type.as_deref(),
                Some("date") | Some("datetime-local")
            )
    }
}

/// One choice inside a select element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectChoice {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub selected: bool,
}

/// Selector states waitable via [`Driver::wait_for_selector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Attached,
    Visible,
    Hidden,
}

/// The browser-automation collaborator consumed by the engine.
///
/// Implementations are assumed reliable at the single-operation level;
/// retries, fallbacks and loop-breaking live above this seam. The
/// in-crate [`CdpDriver`](crate::CdpDriver) talks to Chrome; tests use
/// scripted fakes.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Resolve a single selector and report element state; `None` when
    /// nothing matches.
    async fn inspect(&self, selector: &str) -> Result<Option<ElementInfo>>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear the field, then set the value via keystrokes
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Type into the element without clearing it first
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Raw keyboard insertion at the current focus, bypassing selectors
    async fn keyboard_type(&self, text: &str) -> Result<()>;

    async fn press_key(&self, selector: &str, key: &str) -> Result<()>;

    async fn hover(&self, selector: &str) -> Result<()>;

    async fn focus(&self, selector: &str) -> Result<()>;

    async fn blur(&self, selector: &str) -> Result<()>;

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()>;

    /// Select an option by its `value` attribute; false when no option
    /// carries that value.
    async fn select_value(&self, selector: &str, value: &str) -> Result<bool>;

    async fn options(&self, selector: &str) -> Result<Vec<SelectChoice>>;

    async fn upload(&self, selector: &str, files: &[PathBuf]) -> Result<()>;

    async fn scroll_into_view(&self, selector: &str) -> Result<()>;

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<()>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: SelectorState,
        timeout: Duration,
    ) -> Result<()>;

    async fn wait_for_load(&self, timeout: Duration) -> Result<()>;

    /// Number of network requests currently in flight
    fn pending_requests(&self) -> usize;

    /// Drain console/network events observed since the previous drain
    fn take_events(&self) -> Vec<PageEvent>;
}
