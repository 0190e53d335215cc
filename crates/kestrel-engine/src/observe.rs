use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::event_log::EventLog;
use kestrel_browser::Driver;
use kestrel_core::observation::{
    DropdownSummary, FormStatus, InputSummary, LinkSummary, Observation, PageSummary,
};

/// Single JS probe collecting the interactive page surface in one round
/// trip. Pre-cap limits are generous; the hard caps are applied on the
/// Rust side where they are testable.
const SUMMARY_JS: &str = r#"(() => {
    const vis = el => {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0 && getComputedStyle(el).visibility !== 'hidden';
    };
    const sel = el => {
        if (el.id) return '#' + CSS.escape(el.id);
        if (el.name) return `${el.tagName.toLowerCase()}[name="${el.name}"]`;
        const cls = (el.className || '').toString().trim().split(/\s+/)[0];
        return el.tagName.toLowerCase() + (cls ? '.' + CSS.escape(cls) : '');
    };
    const labelFor = el => {
        if (el.labels && el.labels.length) return el.labels[0].innerText.trim();
        return el.getAttribute('aria-label') || el.placeholder || null;
    };

    const buttons = Array.from(document.querySelectorAll(
        'button, input[type=submit], input[type=button], [role=button]'))
        .filter(vis).slice(0, 80)
        .map(el => (el.innerText || el.value || '').trim());

    const inputs = Array.from(document.querySelectorAll('input, textarea'))
        .filter(el => vis(el) && !['submit','button','hidden'].includes(el.type))
        .slice(0, 80)
        .map(el => ({
            selector: sel(el),
            label: labelFor(el),
            input_type: el.type || null,
            filled: el.type === 'checkbox' || el.type === 'radio'
                ? el.checked : (el.value || '').trim().length > 0,
            required: el.required || el.getAttribute('aria-required') === 'true',
        }));

    const links = Array.from(document.querySelectorAll('a[href]'))
        .filter(vis).slice(0, 60)
        .map(el => ({ text: el.innerText.trim(), href: el.getAttribute('href') }));

    const texts = Array.from(document.querySelectorAll(
        'h1, h2, h3, p, label, [role=alert], .error, .alert, .message'))
        .filter(vis).slice(0, 150)
        .map(el => el.innerText.trim().slice(0, 200));

    const dropdowns = Array.from(document.querySelectorAll('select'))
        .filter(vis).slice(0, 20)
        .map(el => ({
            selector: sel(el),
            options: Array.from(el.options).slice(0, 30).map(o => o.label || o.value),
            selected: el.selectedIndex >= 0
                ? (el.options[el.selectedIndex].label || el.options[el.selectedIndex].value)
                : null,
        }));

    const modal_present = Array.from(document.querySelectorAll(
        '[role=dialog], [aria-modal="true"], .modal'))
        .some(vis);

    const formInputs = inputs;
    const form = {
        total: formInputs.length,
        filled: formInputs.filter(i => i.filled).length,
        required: formInputs.filter(i => i.required).length,
        required_filled: formInputs.filter(i => i.required && i.filled).length,
    };

    return { buttons, inputs, links, texts, dropdowns, modal_present, form };
})()"#;

#[derive(Debug, Default, Deserialize)]
struct FormCounters {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    filled: usize,
    #[serde(default)]
    required: usize,
    #[serde(default)]
    required_filled: usize,
}

#[derive(Debug, Default, Deserialize)]
struct RawSummary {
    #[serde(default)]
    buttons: Vec<String>,
    #[serde(default)]
    inputs: Vec<InputSummary>,
    #[serde(default)]
    links: Vec<LinkSummary>,
    #[serde(default)]
    texts: Vec<String>,
    #[serde(default)]
    dropdowns: Vec<DropdownSummary>,
    #[serde(default)]
    modal_present: bool,
    #[serde(default)]
    form: FormCounters,
}

/// Captures bounded page snapshots between action batches.
///
/// Capture never fails: a section that cannot be collected is replaced by
/// its empty value and noted in the observation's warnings, so the
/// decision-maker always receives a checkpoint to reason over.
pub struct ObservationEngine {
    driver: Arc<dyn Driver>,
    log: EventLog,
    cursor: u64,
    last_url: Option<String>,
    artifacts_dir: PathBuf,
}

impl ObservationEngine {
    pub fn new(driver: Arc<dyn Driver>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            log: EventLog::new(),
            cursor: 0,
            last_url: None,
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// Snapshot the page for the checkpoint after batch `step`.
    ///
    /// `action_errors` are the failures from the preceding batch and are
    /// embedded verbatim so the decision-maker sees what went wrong.
    pub async fn capture(
        &mut self,
        step: u32,
        want_screenshot: bool,
        action_errors: Vec<String>,
        mut warnings: Vec<String>,
    ) -> Observation {
        self.drain_events();

        let url = match self.driver.current_url().await {
            Ok(url) => url,
            Err(e) => {
                warnings.push(format!("url unavailable: {}", e));
                String::new()
            }
        };
        let title = match self.driver.title().await {
            Ok(title) => title,
            Err(e) => {
                warnings.push(format!("title unavailable: {}", e));
                String::new()
            }
        };

        let url_changed = match &self.last_url {
            Some(previous) => *previous != url,
            // The first checkpoint always reports a fresh URL
            None => true,
        };
        self.last_url = Some(url.clone());

        let (summary, form_status) = match self.probe_summary().await {
            Ok(parsed) => parsed,
            Err(reason) => {
                warnings.push(format!("page summary degraded: {}", reason));
                (PageSummary::default(), FormStatus::NoForm)
            }
        };

        self.drain_events();
        let delta = self.log.delta(&mut self.cursor);
        let (new_network_events, new_console_events) =
            delta.into_iter().partition(|e| e.is_network());

        let screenshot = if want_screenshot {
            match self.write_screenshot(step).await {
                Ok(path) => Some(path),
                Err(reason) => {
                    warnings.push(format!("screenshot failed: {}", reason));
                    None
                }
            }
        } else {
            None
        };

        Observation {
            step,
            captured_at: Utc::now(),
            url,
            title,
            url_changed,
            summary,
            form_status,
            new_console_events,
            new_network_events,
            action_errors,
            warnings,
            screenshot,
        }
    }

    /// Pull raw driver events into the session log
    pub fn drain_events(&mut self) {
        for event in self.driver.take_events() {
            self.log.append(event);
        }
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    async fn probe_summary(&self) -> std::result::Result<(PageSummary, FormStatus), String> {
        let value = self
            .driver
            .evaluate(SUMMARY_JS)
            .await
            .map_err(|e| e.to_string())?;
        if value.is_null() {
            return Err("probe returned nothing".to_string());
        }
        let raw: RawSummary = serde_json::from_value(value).map_err(|e| e.to_string())?;
        let form_status = FormStatus::from_counts(
            raw.form.total,
            raw.form.filled,
            raw.form.required,
            raw.form.required_filled,
        );
        let summary = PageSummary {
            buttons: raw.buttons,
            inputs: raw.inputs,
            links: raw.links,
            texts: raw.texts,
            dropdowns: raw.dropdowns,
            modal_present: raw.modal_present,
        }
        .bounded();
        Ok((summary, form_status))
    }

    async fn write_screenshot(&self, step: u32) -> std::result::Result<String, String> {
        let bytes = self.driver.screenshot().await.map_err(|e| e.to_string())?;
        std::fs::create_dir_all(&self.artifacts_dir).map_err(|e| e.to_string())?;
        let path = self.artifacts_dir.join(format!("step-{}.png", step));
        std::fs::write(&path, bytes).map_err(|e| e.to_string())?;
        Ok(path.to_string_lossy().into_owned())
    }
}
