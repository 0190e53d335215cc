use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::{Error, Result};
use kestrel_browser::Driver;
use kestrel_core::wait::{WaitCondition, WaitKind};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Quiet window that must pass with no in-flight requests before the
/// network counts as idle
const NETWORK_QUIET: Duration = Duration::from_millis(500);

/// Result of evaluating one wait condition
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    pub condition: String,
    pub satisfied: bool,
    pub required: bool,
}

/// Evaluate all conditions concurrently.
///
/// Returns an outcome per condition; a timed-out `required` condition is
/// an error, other timeouts are reported for the caller to surface as
/// warnings.
pub async fn await_conditions(
    driver: &Arc<dyn Driver>,
    conditions: &[WaitCondition],
) -> Result<Vec<WaitOutcome>> {
    if conditions.is_empty() {
        return Ok(Vec::new());
    }

    let futures = conditions
        .iter()
        .map(|cond| evaluate_one(driver.clone(), cond.clone()));
    let outcomes = join_all(futures).await;

    for outcome in &outcomes {
        if outcome.required && !outcome.satisfied {
            return Err(Error::ActionTimeout {
                action: format!("wait_for {}", outcome.condition),
                timeout_ms: conditions
                    .iter()
                    .find(|c| c.describe() == outcome.condition)
                    .map(|c| c.timeout_ms())
                    .unwrap_or_default(),
            });
        }
    }
    Ok(outcomes)
}

async fn evaluate_one(driver: Arc<dyn Driver>, condition: WaitCondition) -> WaitOutcome {
    let timeout = Duration::from_millis(condition.timeout_ms());
    let label = condition.describe();

    let satisfied = tokio::time::timeout(timeout, async {
        loop {
            if holds(&driver, &condition.kind).await {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .is_ok();

    if !satisfied {
        tracing::debug!("Wait condition {} timed out", label);
    }

    WaitOutcome {
        condition: label,
        satisfied,
        required: condition.required,
    }
}

/// One check of a condition's completion predicate.
///
/// Transient driver errors count as "does not hold yet"; the poll loop
/// retries until the condition's own timeout expires.
async fn holds(driver: &Arc<dyn Driver>, kind: &WaitKind) -> bool {
    match kind {
        WaitKind::NetworkIdle => {
            if driver.pending_requests() != 0 {
                return false;
            }
            tokio::time::sleep(NETWORK_QUIET).await;
            driver.pending_requests() == 0
        }
        WaitKind::ElementVisible { selector } => matches!(
            driver.inspect(selector).await,
            Ok(Some(info)) if info.visible
        ),
        WaitKind::ElementHidden { selector } => match driver.inspect(selector).await {
            Ok(Some(info)) => !info.visible,
            Ok(None) => true,
            Err(_) => false,
        },
        WaitKind::UrlContains { fragment } => driver
            .current_url()
            .await
            .map(|url| url.contains(fragment.as_str()))
            .unwrap_or(false),
        WaitKind::TextVisible { text } => {
            let script = format!(
                "document.body ? document.body.innerText.includes({}) : false",
                serde_json::Value::String(text.clone())
            );
            driver
                .evaluate(&script)
                .await
                .map(|v| v.as_bool().unwrap_or(false))
                .unwrap_or(false)
        }
        WaitKind::NoLoadingIndicator => {
            const SCRIPT: &str = r#"(() => {
                const sels = ['.spinner', '.loading', '.loader', '[class*="skeleton"]',
                              '[aria-busy="true"]', '[class*="progress-bar"]'];
                return !sels.some(s => Array.from(document.querySelectorAll(s)).some(el => {
                    const r = el.getBoundingClientRect();
                    return r.width > 0 && r.height > 0;
                }));
            })()"#;
            driver
                .evaluate(SCRIPT)
                .await
                .map(|v| v.as_bool().unwrap_or(false))
                .unwrap_or(false)
        }
        WaitKind::FormReady => {
            const SCRIPT: &str = r#"(() => {
                const form = document.querySelector('form');
                if (!form) return false;
                return Array.from(form.querySelectorAll('input, select, textarea, button'))
                    .every(el => !el.disabled);
            })()"#;
            driver
                .evaluate(SCRIPT)
                .await
                .map(|v| v.as_bool().unwrap_or(false))
                .unwrap_or(false)
        }
    }
}
