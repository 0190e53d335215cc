use serde::{Deserialize, Serialize};

/// Default per-condition timeout when a condition does not declare one
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// What a wait condition is waiting for
///
/// Each kind carries its own completion predicate; the selector/fragment
/// payloads are interpreted by the engine's waiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitKind {
    /// No in-flight network requests for a short quiet window
    NetworkIdle,
    /// An element matching the selector is visible
    ElementVisible { selector: String },
    /// No visible element matches the selector
    ElementHidden { selector: String },
    /// The current URL contains the fragment
    UrlContains { fragment: String },
    /// The given text appears in the visible page text
    TextVisible { text: String },
    /// No common loading indicator (spinner, skeleton) is visible
    NoLoadingIndicator,
    /// A form is present and all of its inputs are enabled
    FormReady,
}

/// A post-action wait condition with its own timeout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitCondition {
    #[serde(flatten)]
    pub kind: WaitKind,

    /// Per-condition timeout; defaults to [`DEFAULT_WAIT_TIMEOUT_MS`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// When true, a timeout on this condition fails the whole action.
    /// When false (default) a timeout degrades to a warning.
    #[serde(default)]
    pub required: bool,
}

impl WaitCondition {
    pub fn new(kind: WaitKind) -> Self {
        Self {
            kind,
            timeout_ms: None,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Effective timeout for this condition
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS)
    }

    /// Short human-readable label used in warnings and logs
    pub fn describe(&self) -> String {
        match &self.kind {
            WaitKind::NetworkIdle => "network_idle".to_string(),
            WaitKind::ElementVisible { selector } => format!("element_visible({})", selector),
            WaitKind::ElementHidden { selector } => format!("element_hidden({})", selector),
            WaitKind::UrlContains { fragment } => format!("url_contains({})", fragment),
            WaitKind::TextVisible { text } => format!("text_visible({})", text),
            WaitKind::NoLoadingIndicator => "no_loading_indicator".to_string(),
            WaitKind::FormReady => "form_ready".to_string(),
        }
    }
}
