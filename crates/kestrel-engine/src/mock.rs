//! Scripted in-memory [`Driver`] used by engine unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use kestrel_browser::{Driver, ElementInfo, Error, Result, SelectChoice, SelectorState};
use kestrel_core::events::PageEvent;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Direct access to a mock field's mutex from test bodies
pub fn lock_for_tests<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    lock(mutex)
}

#[derive(Default)]
pub struct MockDriver {
    pub url: Mutex<String>,
    pub title: Mutex<String>,
    pub elements: Mutex<HashMap<String, ElementInfo>>,
    pub choices: Mutex<HashMap<String, Vec<SelectChoice>>>,
    /// Every driver invocation, recorded as "op:selector[:value]"
    pub calls: Mutex<Vec<String>>,
    /// Values returned by `evaluate`, in order; Null once exhausted
    pub eval_queue: Mutex<VecDeque<serde_json::Value>>,
    /// Remaining injected failures per selector for mutating operations
    pub failures: Mutex<HashMap<String, u32>>,
    /// Selector -> URL the page "navigates" to when that selector is
    /// clicked
    pub redirects: Mutex<HashMap<String, String>>,
    pub events: Mutex<Vec<PageEvent>>,
    pub pending: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(self, url: &str) -> Self {
        *lock(&self.url) = url.to_string();
        self
    }

    pub fn with_element(self, selector: &str, info: ElementInfo) -> Self {
        lock(&self.elements).insert(selector.to_string(), info);
        self
    }

    pub fn with_choices(self, selector: &str, choices: Vec<SelectChoice>) -> Self {
        lock(&self.choices).insert(selector.to_string(), choices);
        self
    }

    pub fn with_eval_results(self, values: Vec<serde_json::Value>) -> Self {
        lock(&self.eval_queue).extend(values);
        self
    }

    /// Make the next `count` mutating operations on `selector` fail
    pub fn with_failures(self, selector: &str, count: u32) -> Self {
        lock(&self.failures).insert(selector.to_string(), count);
        self
    }

    /// Simulate a page transition triggered by clicking `selector`
    pub fn with_redirect(self, selector: &str, url: &str) -> Self {
        lock(&self.redirects).insert(selector.to_string(), url.to_string());
        self
    }

    pub fn push_event(&self, event: PageEvent) {
        lock(&self.events).push(event);
    }

    pub fn push_eval_result(&self, value: serde_json::Value) {
        lock(&self.eval_queue).push_back(value);
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Driver invocations that touched the given selector
    pub fn calls_touching(&self, selector: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.contains(selector))
            .cloned()
            .collect()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }

    fn check_failure(&self, selector: &str) -> Result<()> {
        let mut failures = lock(&self.failures);
        if let Some(remaining) = failures.get_mut(selector) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Browser(format!("injected failure on {}", selector)));
            }
        }
        Ok(())
    }

    fn require_element(&self, selector: &str) -> Result<ElementInfo> {
        lock(&self.elements)
            .get(selector)
            .cloned()
            .ok_or_else(|| Error::Browser(format!("no element matching '{}'", selector)))
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("navigate:{}", url));
        self.check_failure(url)?;
        *lock(&self.url) = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(lock(&self.url).clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(lock(&self.title).clone())
    }

    async fn inspect(&self, selector: &str) -> Result<Option<ElementInfo>> {
        Ok(lock(&self.elements).get(selector).cloned())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click:{}", selector));
        self.check_failure(selector)?;
        self.require_element(selector)?;
        if let Some(url) = lock(&self.redirects).get(selector).cloned() {
            *lock(&self.url) = url;
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("fill:{}:{}", selector, value));
        self.check_failure(selector)?;
        let mut elements = lock(&self.elements);
        let info = elements
            .get_mut(selector)
            .ok_or_else(|| Error::Browser(format!("no element matching '{}'", selector)))?;
        info.value = Some(value.to_string());
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.record(format!("type:{}:{}", selector, text));
        self.check_failure(selector)?;
        let mut elements = lock(&self.elements);
        let info = elements
            .get_mut(selector)
            .ok_or_else(|| Error::Browser(format!("no element matching '{}'", selector)))?;
        let existing = info.value.take().unwrap_or_default();
        info.value = Some(format!("{}{}", existing, text));
        Ok(())
    }

    async fn keyboard_type(&self, text: &str) -> Result<()> {
        self.record(format!("keyboard_type:{}", text));
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        self.record(format!("press_key:{}:{}", selector, key));
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.record(format!("hover:{}", selector));
        self.require_element(selector)?;
        Ok(())
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        self.record(format!("focus:{}", selector));
        self.require_element(selector)?;
        Ok(())
    }

    async fn blur(&self, selector: &str) -> Result<()> {
        self.record(format!("blur:{}", selector));
        Ok(())
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<()> {
        self.record(format!("set_checked:{}:{}", selector, checked));
        let mut elements = lock(&self.elements);
        let info = elements
            .get_mut(selector)
            .ok_or_else(|| Error::Browser(format!("no element matching '{}'", selector)))?;
        info.checked = Some(checked);
        Ok(())
    }

    async fn select_value(&self, selector: &str, value: &str) -> Result<bool> {
        self.record(format!("select:{}:{}", selector, value));
        let matched = lock(&self.choices)
            .get(selector)
            .map(|choices| choices.iter().any(|c| c.value == value))
            .unwrap_or(false);
        Ok(matched)
    }

    async fn options(&self, selector: &str) -> Result<Vec<SelectChoice>> {
        Ok(lock(&self.choices).get(selector).cloned().unwrap_or_default())
    }

    async fn upload(&self, selector: &str, files: &[PathBuf]) -> Result<()> {
        self.record(format!("upload:{}:{}", selector, files.len()));
        self.require_element(selector)?;
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        self.record(format!("scroll_into_view:{}", selector));
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<()> {
        self.record(format!("scroll_by:{}:{}", dx, dy));
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        self.record("evaluate".to_string());
        Ok(lock(&self.eval_queue)
            .pop_front()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot".to_string());
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: SelectorState,
        timeout: Duration,
    ) -> Result<()> {
        self.record(format!("wait_for_selector:{}", selector));
        let info = lock(&self.elements).get(selector).cloned();
        let satisfied = match state {
            SelectorState::Attached => info.is_some(),
            SelectorState::Visible => info.map(|i| i.visible).unwrap_or(false),
            SelectorState::Hidden => !info.map(|i| i.visible).unwrap_or(false),
        };
        if satisfied {
            Ok(())
        } else {
            Err(Error::Timeout(timeout.as_millis() as u64))
        }
    }

    async fn wait_for_load(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn pending_requests(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn take_events(&self) -> Vec<PageEvent> {
        std::mem::take(&mut *lock(&self.events))
    }
}
