use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::ActionExecutor;
use crate::obstacles::ObstacleResolver;
use crate::waiter::await_conditions;
use crate::{Error, Result};
use kestrel_browser::Driver;
use kestrel_core::action::{Action, ActionKind};
use kestrel_core::scenario::Scenario;

/// Outcome of one scenario step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Not executed because an earlier step failed
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Full report of a scripted run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    /// Post-run expectations and whether each held
    pub expectations: Vec<ExpectationReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationReport {
    pub condition: String,
    pub satisfied: bool,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Passed)
            && self.expectations.iter().all(|e| e.satisfied)
    }

    pub fn failed_steps(&self) -> Vec<&StepReport> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .collect()
    }
}

/// Runs a fixed scenario step by step, no decision-maker involved.
///
/// A failed step marks the remaining steps skipped when the scenario
/// stops on first failure; post-run expectations are still evaluated so
/// the report shows how far the page got.
pub struct ScenarioRunner {
    driver: Arc<dyn Driver>,
}

impl ScenarioRunner {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        scenario.validate()?;
        let started_at = Utc::now();
        tracing::info!(scenario = %scenario.name, steps = scenario.steps.len(), "Running scenario");

        let mut executor = ActionExecutor::new(self.driver.clone());
        let opening = Action::new(ActionKind::Navigate).with_value(&scenario.start_url);
        executor.execute(&opening).await?;

        let mut resolver = ObstacleResolver::new(self.driver.clone(), None);
        if !resolver.clear_obstacles().await? {
            return Err(Error::ObstacleUnresolved(
                resolver
                    .blocker_reason()
                    .unwrap_or("page is blocked")
                    .to_string(),
            ));
        }

        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut halted = false;
        for step in &scenario.steps {
            let name = step.display_name();
            if halted {
                steps.push(StepReport {
                    name,
                    status: StepStatus::Skipped,
                    error: None,
                    duration_ms: 0,
                });
                continue;
            }

            let begun = std::time::Instant::now();
            let report = match executor.execute(&step.action).await {
                Ok(_) => StepReport {
                    name: name.clone(),
                    status: StepStatus::Passed,
                    error: None,
                    duration_ms: begun.elapsed().as_millis() as u64,
                },
                Err(e) => {
                    tracing::warn!(step = %name, "Scenario step failed: {}", e);
                    if scenario.stop_on_first_failure {
                        halted = true;
                    }
                    StepReport {
                        name: name.clone(),
                        status: StepStatus::Failed,
                        error: Some(e.to_string()),
                        duration_ms: begun.elapsed().as_millis() as u64,
                    }
                }
            };
            steps.push(report);
        }

        let expectations = self.check_expectations(scenario).await;

        Ok(ScenarioReport {
            scenario: scenario.name.clone(),
            started_at,
            finished_at: Utc::now(),
            steps,
            expectations,
        })
    }

    async fn check_expectations(&self, scenario: &Scenario) -> Vec<ExpectationReport> {
        if scenario.expect.is_empty() {
            return Vec::new();
        }
        // Expectations are read-only conditions; a required one timing
        // out is reported, not escalated
        let relaxed: Vec<_> = scenario
            .expect
            .iter()
            .cloned()
            .map(|mut c| {
                c.required = false;
                c
            })
            .collect();
        match await_conditions(&self.driver, &relaxed).await {
            Ok(outcomes) => outcomes
                .into_iter()
                .map(|o| ExpectationReport {
                    condition: o.condition,
                    satisfied: o.satisfied,
                })
                .collect(),
            Err(e) => vec![ExpectationReport {
                condition: format!("expectations unavailable: {}", e),
                satisfied: false,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use kestrel_browser::ElementInfo;

    fn visible(tag: &str) -> ElementInfo {
        ElementInfo {
            tag: tag.to_string(),
            visible: true,
            enabled: true,
            ..Default::default()
        }
    }

    fn scenario(yaml: &str) -> Scenario {
        serde_yaml::from_str(yaml).unwrap()
    }

    const LOGIN_YAML: &str = r##"
name: login flow
start_url: https://example.com/login
steps:
  - name: enter email
    action:
      type: type
      target: "#email"
      value: user@example.com
  - name: submit
    action:
      type: click
      target: "#submit"
  - name: open profile
    action:
      type: click
      target: "#profile"
"##;

    #[tokio::test]
    async fn test_all_steps_pass() {
        let mock = Arc::new(
            MockDriver::new()
                .with_element("#email", visible("input"))
                .with_element("#submit", visible("button"))
                .with_element("#profile", visible("a")),
        );
        let runner = ScenarioRunner::new(mock.clone());

        let report = runner.run(&scenario(LOGIN_YAML)).await.unwrap();
        assert!(report.passed());
        assert_eq!(report.steps.len(), 3);
        assert!(report.steps.iter().all(|s| s.status == StepStatus::Passed));
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_steps() {
        // "#submit" is missing: step 2 fails, step 3 is skipped
        let mock = Arc::new(
            MockDriver::new()
                .with_element("#email", visible("input"))
                .with_element("#profile", visible("a")),
        );
        let runner = ScenarioRunner::new(mock.clone());

        let report = runner.run(&scenario(LOGIN_YAML)).await.unwrap();
        assert!(!report.passed());
        assert_eq!(report.steps[0].status, StepStatus::Passed);
        assert_eq!(report.steps[1].status, StepStatus::Failed);
        assert_eq!(report.steps[2].status, StepStatus::Skipped);
        assert!(mock.calls_touching("#profile").is_empty());
    }

    #[tokio::test]
    async fn test_tolerant_scenario_runs_every_step() {
        let yaml = format!("{}stop_on_first_failure: false\n", LOGIN_YAML);
        let mock = Arc::new(
            MockDriver::new()
                .with_element("#email", visible("input"))
                .with_element("#profile", visible("a")),
        );
        let runner = ScenarioRunner::new(mock.clone());

        let report = runner.run(&scenario(&yaml)).await.unwrap();
        assert_eq!(report.steps[1].status, StepStatus::Failed);
        assert_eq!(report.steps[2].status, StepStatus::Passed);
    }

    #[tokio::test]
    async fn test_expectations_evaluated_after_run() {
        let yaml = r##"
name: landing
start_url: https://example.com/
steps:
  - action:
      type: click
      target: "#go"
expect:
  - kind: url_contains
    fragment: example.com
    timeout_ms: 100
  - kind: element_visible
    selector: "#missing"
    timeout_ms: 100
"##;
        let mock = Arc::new(MockDriver::new().with_element("#go", visible("button")));
        let runner = ScenarioRunner::new(mock.clone());

        let report = runner.run(&scenario(yaml)).await.unwrap();
        assert_eq!(report.expectations.len(), 2);
        assert!(report.expectations[0].satisfied);
        assert!(!report.expectations[1].satisfied);
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn test_invalid_scenario_rejected_before_navigation() {
        let bad = scenario("name: bad\nstart_url: https://example.com\nsteps:\n  - action:\n      type: click\n");
        let mock = Arc::new(MockDriver::new());
        let runner = ScenarioRunner::new(mock.clone());

        assert!(runner.run(&bad).await.is_err());
        assert!(mock.recorded_calls().is_empty());
    }
}
