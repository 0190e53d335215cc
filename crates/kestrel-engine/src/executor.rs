use std::sync::Arc;
use std::time::Duration;

use crate::waiter::await_conditions;
use crate::{Error, Result};
use kestrel_browser::{Driver, ElementInfo};
use kestrel_core::action::{Action, ActionKind};

/// How many consecutive identical actions are tolerated before the
/// loop-breaker fires
const REPEAT_LIMIT: u32 = 3;

/// Executor tuning knobs
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Default per-action timeout when the action declares none
    pub default_timeout: Duration,
    /// Budget for each alternative in a fallback chain during target
    /// resolution
    pub per_alternative_timeout: Duration,
    pub resolve_poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            per_alternative_timeout: Duration::from_millis(1500),
            resolve_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Post-execution notes surfaced to the next observation
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub warnings: Vec<String>,
}

/// Executes one action at a time against the browser driver.
///
/// Actions within a session run strictly sequentially; the executor also
/// carries the session's repetition guard, so the loop-breaker fires no
/// matter which decision-maker produced the batch.
pub struct ActionExecutor {
    driver: Arc<dyn Driver>,
    config: ExecutorConfig,
    last_fingerprint: Option<String>,
    repeat_count: u32,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_config(driver, ExecutorConfig::default())
    }

    pub fn with_config(driver: Arc<dyn Driver>, config: ExecutorConfig) -> Self {
        Self {
            driver,
            config,
            last_fingerprint: None,
            repeat_count: 0,
        }
    }

    /// Execute one action: repetition guard, retry policy, target
    /// resolution, the operation itself, then any declared wait
    /// conditions.
    pub async fn execute(&mut self, action: &Action) -> Result<ActionOutcome> {
        action.validate()?;
        self.guard_repetition(action)?;

        let attempts = action
            .retry
            .map(|r| r.max_attempts.max(1))
            .unwrap_or(1);
        let backoff = action
            .retry
            .map(|r| Duration::from_millis(r.backoff_ms))
            .unwrap_or_default();

        let mut last_error: Option<Error> = None;
        for attempt in 1..=attempts {
            match self.perform(action).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        action = action.kind.as_str(),
                        attempt,
                        "Action attempt failed: {}",
                        e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        if let Some(e) = last_error {
            if attempts > 1 {
                return Err(Error::RetriesExhausted {
                    attempts,
                    last_error: e.to_string(),
                });
            }
            return Err(e);
        }

        let mut outcome = ActionOutcome::default();
        if !action.wait_for.is_empty() {
            let results = await_conditions(&self.driver, &action.wait_for).await?;
            for result in results {
                if !result.satisfied {
                    outcome
                        .warnings
                        .push(format!("wait condition not met: {}", result.condition));
                }
            }
        }
        Ok(outcome)
    }

    /// The primary infinite-loop breaker: the third consecutive action
    /// with an identical (kind, target, value) fingerprint fails before
    /// the driver is invoked again.
    fn guard_repetition(&mut self, action: &Action) -> Result<()> {
        let fingerprint = action.fingerprint();
        if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            self.repeat_count += 1;
        } else {
            self.last_fingerprint = Some(fingerprint.clone());
            self.repeat_count = 1;
        }
        if self.repeat_count >= REPEAT_LIMIT {
            return Err(Error::RepeatedActionLimit(fingerprint));
        }
        Ok(())
    }

    async fn perform(&self, action: &Action) -> Result<()> {
        let timeout = Duration::from_millis(
            action
                .timeout_ms
                .unwrap_or(self.config.default_timeout.as_millis() as u64),
        );

        match action.kind {
            ActionKind::Navigate => {
                let raw = action
                    .value
                    .as_deref()
                    .or(action.target.as_deref())
                    .unwrap_or_default();
                let url = normalize_url(raw);
                self.driver
                    .navigate(&url, timeout)
                    .await
                    .map_err(|e| match e {
                        kestrel_browser::Error::Timeout(ms) => Error::ActionTimeout {
                            action: "navigate".to_string(),
                            timeout_ms: ms,
                        },
                        other => Error::Driver(other),
                    })
            }
            ActionKind::Click => {
                let selector = self.resolve_target(action).await?;
                Ok(self.driver.click(&selector).await?)
            }
            ActionKind::Type => {
                let selector = self.resolve_target(action).await?;
                let text = action.value.as_deref().unwrap_or_default();
                Ok(self.driver.type_text(&selector, text).await?)
            }
            ActionKind::Select => {
                let selector = self.resolve_target(action).await?;
                let value = action.value.as_deref().unwrap_or_default();
                self.select_with_strategies(&selector, value).await
            }
            ActionKind::FillDate => {
                let selector = self.resolve_target(action).await?;
                let raw = action.value.as_deref().unwrap_or_default();
                let canonical = canonicalize_date(raw).unwrap_or_else(|| {
                    tracing::warn!("Could not canonicalize date '{}', using as-is", raw);
                    raw.to_string()
                });
                Ok(self.driver.fill(&selector, &canonical).await?)
            }
            ActionKind::Upload => {
                let selector = self.resolve_target(action).await?;
                let files: Vec<std::path::PathBuf> =
                    action.files.iter().map(std::path::PathBuf::from).collect();
                Ok(self.driver.upload(&selector, &files).await?)
            }
            ActionKind::Wait => {
                let sleep_ms = action
                    .timeout_ms
                    .or_else(|| action.value.as_deref().and_then(|v| v.parse().ok()));
                if let Some(ms) = sleep_ms {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                Ok(())
            }
            ActionKind::Scroll => {
                if action.target.is_some() {
                    let selector = self.resolve_target(action).await?;
                    Ok(self.driver.scroll_into_view(&selector).await?)
                } else {
                    let dy = match action.value.as_deref() {
                        Some("up") => -600,
                        Some("down") | None => 600,
                        Some(n) => n.parse().unwrap_or(600),
                    };
                    Ok(self.driver.scroll_by(0, dy).await?)
                }
            }
            ActionKind::Hover => {
                let selector = self.resolve_target(action).await?;
                Ok(self.driver.hover(&selector).await?)
            }
            ActionKind::Assert => self.assert_element(action).await,
            ActionKind::FillField => {
                let selector = self.resolve_target(action).await?;
                let value = action.value.as_deref().unwrap_or_default();
                self.fill_field(&selector, value).await
            }
            ActionKind::Toggle => {
                let selector = self.resolve_target(action).await?;
                match action.value.as_deref() {
                    Some(v) => Ok(self.driver.set_checked(&selector, parse_bool(v)).await?),
                    // No desired state given: flip whatever is there
                    None => Ok(self.driver.click(&selector).await?),
                }
            }
            ActionKind::Clear => {
                let selector = self.resolve_target(action).await?;
                Ok(self.driver.fill(&selector, "").await?)
            }
            ActionKind::Focus => {
                let selector = self.resolve_target(action).await?;
                Ok(self.driver.focus(&selector).await?)
            }
            ActionKind::Blur => {
                let selector = self.resolve_target(action).await?;
                Ok(self.driver.blur(&selector).await?)
            }
            ActionKind::PressKey => {
                let key = action.value.as_deref().unwrap_or_default();
                match &action.target {
                    Some(_) => {
                        let selector = self.resolve_target(action).await?;
                        Ok(self.driver.press_key(&selector, key).await?)
                    }
                    None => Ok(self.driver.press_key("body", key).await?),
                }
            }
            // The observation engine handles the capture itself
            ActionKind::Screenshot => Ok(()),
        }
    }

    /// Resolve a fallback chain: try each alternative in order and use
    /// the first that shows up visible and enabled within the
    /// per-alternative budget. Nothing is mutated through alternatives
    /// that failed to resolve.
    async fn resolve_target(&self, action: &Action) -> Result<String> {
        let chain = action.target_chain();
        if chain.is_empty() {
            return Err(Error::Validation(format!(
                "action '{}' has no usable target",
                action.kind.as_str()
            )));
        }

        let mut saw_disabled = false;
        for alternative in &chain {
            let deadline =
                tokio::time::Instant::now() + self.config.per_alternative_timeout;
            loop {
                match self.driver.inspect(alternative).await? {
                    Some(info) if info.visible && info.enabled => {
                        if chain.len() > 1 {
                            tracing::debug!("Resolved '{}' via '{}'", action.fingerprint(), alternative);
                        }
                        return Ok(alternative.clone());
                    }
                    Some(info) if info.visible => saw_disabled = true,
                    _ => {}
                }
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(self.config.resolve_poll_interval).await;
            }
        }

        let target = action.target.clone().unwrap_or_default();
        if saw_disabled {
            Err(Error::ElementDisabled(target))
        } else {
            Err(Error::ElementNotFound(target))
        }
    }

    async fn assert_element(&self, action: &Action) -> Result<()> {
        let selector = self.resolve_target(action).await?;
        if let Some(expected) = action.value.as_deref() {
            let info = self
                .driver
                .inspect(&selector)
                .await?
                .ok_or_else(|| Error::ElementNotFound(selector.clone()))?;
            let haystack = format!(
                "{} {}",
                info.text,
                info.value.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            if !haystack.contains(&expected.to_lowercase()) {
                return Err(Error::AssertionFailed(format!(
                    "element '{}' does not contain '{}'",
                    selector, expected
                )));
            }
        }
        Ok(())
    }

    /// Select strategies in order: exact label, exact value, substring
    /// label. Each strategy is tried fully before the next; the first
    /// success short-circuits the rest.
    async fn select_with_strategies(&self, selector: &str, wanted: &str) -> Result<()> {
        let choices = self.driver.options(selector).await?;
        let wanted_lower = wanted.trim().to_lowercase();

        let by_label = choices
            .iter()
            .find(|c| c.label.trim().to_lowercase() == wanted_lower);
        let by_value = choices.iter().find(|c| c.value == wanted);
        let by_substring = choices
            .iter()
            .find(|c| c.label.to_lowercase().contains(&wanted_lower));

        for candidate in [by_label, by_value, by_substring].into_iter().flatten() {
            if self.driver.select_value(selector, &candidate.value).await? {
                return Ok(());
            }
        }

        Err(Error::ElementNotFound(format!(
            "option matching '{}' in '{}'",
            wanted, selector
        )))
    }

    /// Type-directed fill dispatch for loosely specified fields
    async fn fill_field(&self, selector: &str, value: &str) -> Result<()> {
        let info = self
            .driver
            .inspect(selector)
            .await?
            .ok_or_else(|| Error::ElementNotFound(selector.to_string()))?;

        if info.is_text_entry() {
            return Ok(self.driver.fill(selector, value).await?);
        }
        if info.is_select() {
            return self.select_with_strategies(selector, value).await;
        }
        if info.is_checkbox() {
            let desired = parse_bool(value);
            if info.checked != Some(desired) {
                self.driver.set_checked(selector, desired).await?;
            }
            return Ok(());
        }
        if info.is_date() {
            let canonical = canonicalize_date(value).unwrap_or_else(|| value.to_string());
            return Ok(self.driver.fill(selector, &canonical).await?);
        }

        self.fill_custom_widget(selector, value, &info).await
    }

    /// Last-resort chain for custom widgets: click-then-type, then a
    /// nested input probe, then raw keyboard insertion. Ordered by how
    /// faithfully each mimics a real user; first success wins.
    async fn fill_custom_widget(
        &self,
        selector: &str,
        value: &str,
        _info: &ElementInfo,
    ) -> Result<()> {
        match self.click_then_type(selector, value).await {
            Ok(()) => return Ok(()),
            Err(e) => tracing::debug!("click-then-type on '{}' failed: {}", selector, e),
        }

        let nested = format!("{} input", selector);
        match self.driver.inspect(&nested).await {
            Ok(Some(inner)) if inner.visible && inner.enabled => {
                match self.driver.fill(&nested, value).await {
                    Ok(()) => return Ok(()),
                    Err(e) => tracing::debug!("nested input fill on '{}' failed: {}", nested, e),
                }
            }
            _ => {}
        }

        self.driver.focus(selector).await?;
        self.driver.keyboard_type(value).await?;
        Ok(())
    }

    async fn click_then_type(&self, selector: &str, value: &str) -> Result<()> {
        self.driver.click(selector).await?;
        self.driver.type_text(selector, value).await?;
        Ok(())
    }
}

fn normalize_url(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("about:") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "on" | "1" | "checked"
    )
}

/// Reformat common date spellings to the canonical YYYY-MM-DD form that
/// date inputs accept.
pub fn canonicalize_date(raw: &str) -> Option<String> {
    const FORMATS: [&str; 6] = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d.%m.%Y",
        "%B %d, %Y",
        "%d %B %Y",
    ];
    let trimmed = raw.trim();
    for format in FORMATS {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}
