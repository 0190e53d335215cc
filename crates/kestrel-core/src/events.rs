use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A raw page event as surfaced by the browser driver
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Console {
        level: String,
        text: String,
    },
    Network {
        method: String,
        url: String,
        status: u16,
    },
}

/// Severity assigned by the classification rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Debug,
}

/// Where an event originated, inferred from its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Script,
    Network,
    Security,
    Framework,
    Browser,
}

/// A classified, timestamped event in the session log.
///
/// `seq` is assigned by the event log when the event is appended and is
/// the only thing delta computation looks at; two events sharing a
/// timestamp never collide on `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub severity: Severity,
    pub source: EventSource,
    /// Short machine-readable category (server_error, console_error, ...)
    pub category: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ClassifiedEvent {
    pub fn is_console(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_network(&self) -> bool {
        self.status.is_some()
    }
}

lazy_static! {
    static ref SECURITY_PATTERN: Regex = Regex::new(
        r"(?i)(CORS|cross-origin|Content.Security.Policy|CSP|mixed content|insecure|blocked:|refused to (load|connect|frame))"
    )
    .unwrap();
    static ref FRAMEWORK_PATTERN: Regex = Regex::new(
        r"(?i)(react|vue|angular|webpack|next\.js|nuxt|svelte|hydration)"
    )
    .unwrap();
    static ref BROWSER_PATTERN: Regex =
        Regex::new(r"(?i)(deprecat|\[violation\]|feature policy|permissions policy)").unwrap();
}

/// Classify a raw event with lightweight pattern rules.
///
/// The ordering matters: security patterns win over framework signatures,
/// which win over generic browser notices.
pub fn classify(event: &PageEvent, seq: u64, at: DateTime<Utc>) -> ClassifiedEvent {
    match event {
        PageEvent::Network {
            method,
            url,
            status,
        } => {
            let (severity, category) = match status {
                s if *s >= 500 => (Severity::Critical, "server_error"),
                s if *s >= 400 => (Severity::Warning, "client_error"),
                s if *s >= 300 => (Severity::Info, "redirect"),
                _ => (Severity::Debug, "ok"),
            };
            ClassifiedEvent {
                seq,
                at,
                severity,
                source: EventSource::Network,
                category: category.to_string(),
                text: format!("{} {} -> {}", method, url, status),
                url: Some(url.clone()),
                status: Some(*status),
            }
        }
        PageEvent::Console { level, text } => {
            let source = if SECURITY_PATTERN.is_match(text) {
                EventSource::Security
            } else if FRAMEWORK_PATTERN.is_match(text) {
                EventSource::Framework
            } else if BROWSER_PATTERN.is_match(text) {
                EventSource::Browser
            } else {
                EventSource::Script
            };

            let (severity, category) = match level.as_str() {
                "error" => (Severity::Critical, "console_error"),
                "warning" | "warn" => (Severity::Warning, "console_warning"),
                "debug" | "verbose" => (Severity::Debug, "console_debug"),
                _ => (Severity::Info, "console_log"),
            };

            ClassifiedEvent {
                seq,
                at,
                severity,
                source,
                category: category.to_string(),
                text: text.clone(),
                url: None,
                status: None,
            }
        }
    }
}
