use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::exchange::DecisionSource;
use crate::executor::ActionExecutor;
use crate::obstacles::{Credentials, ObstacleResolver};
use crate::observe::ObservationEngine;
use crate::{Error, Result};
use kestrel_browser::Driver;
use kestrel_core::action::{Action, ActionKind};
use kestrel_core::decision::DecisionTag;
use kestrel_core::session::{ExplorationSession, FailureKind, SessionStatus};

/// Configuration for one exploration run
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    pub start_url: String,
    pub goal: String,
    /// Decision cycles allowed before the session fails as exhausted
    pub max_steps: u32,
    /// How long to wait for each decision
    pub decision_timeout: Duration,
    pub credentials: Option<Credentials>,
    pub artifacts_dir: PathBuf,
}

impl ExploreConfig {
    pub fn new(start_url: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            goal: goal.into(),
            max_steps: 20,
            decision_timeout: Duration::from_secs(300),
            credentials: None,
            artifacts_dir: PathBuf::from("kestrel-artifacts"),
        }
    }
}

/// Drives the observe/decide/act loop for one session.
///
/// Every decision cycle produces exactly one checkpoint observation, no
/// matter how many actions the decision batched or how many of them
/// failed; the decision-maker reasons over checkpoints, never over
/// intermediate states.
pub struct SessionOrchestrator {
    driver: Arc<dyn Driver>,
    source: Arc<dyn DecisionSource>,
    config: ExploreConfig,
}

impl SessionOrchestrator {
    pub fn new(
        driver: Arc<dyn Driver>,
        source: Arc<dyn DecisionSource>,
        config: ExploreConfig,
    ) -> Self {
        Self {
            driver,
            source,
            config,
        }
    }

    /// Run the session to a terminal state.
    ///
    /// Operational failures (blockers, exhausted budgets, decision
    /// timeouts) end the session but are not errors of the run itself:
    /// the returned record carries the failed status and the full
    /// history. Only infrastructure faults surface as `Err`.
    pub async fn run(&self) -> Result<ExplorationSession> {
        let mut session =
            ExplorationSession::new(self.config.goal.clone(), self.config.start_url.clone());
        tracing::info!(id = %session.id, goal = %session.goal, "Starting exploration session");

        let mut executor = ActionExecutor::new(self.driver.clone());
        let mut observer = ObservationEngine::new(self.driver.clone(), &self.config.artifacts_dir);
        let mut resolver =
            ObstacleResolver::new(self.driver.clone(), self.config.credentials.clone());

        let opening = Action::new(ActionKind::Navigate).with_value(&self.config.start_url);
        if let Err(e) = executor.execute(&opening).await {
            session.fail(FailureKind::Blocker, format!("could not open start URL: {}", e));
            return self.finish(session).await;
        }

        // Errors and warnings from the previous batch, embedded in the
        // next checkpoint
        let mut action_errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut want_screenshot = false;

        for step in 1..=self.config.max_steps {
            match resolver.clear_obstacles().await {
                Ok(true) => {}
                Ok(false) => {
                    let reason = resolver
                        .blocker_reason()
                        .unwrap_or("unresolvable obstacle")
                        .to_string();
                    session.obstacles_cleared = resolver.cleared();
                    session.fail(FailureKind::Blocker, reason);
                    return self.finish(session).await;
                }
                Err(e) => return Err(e),
            }
            session.obstacles_cleared = resolver.cleared();

            let observation = observer
                .capture(
                    step,
                    want_screenshot,
                    std::mem::take(&mut action_errors),
                    std::mem::take(&mut warnings),
                )
                .await;
            want_screenshot = false;
            session.record_observation(observation.clone());
            self.source.publish_observation(&observation).await?;
            // Checkpoint persistence: the record survives a crash of
            // either side of the exchange
            self.source.publish_session(&session).await?;

            let decision = match self.source.await_decision(self.config.decision_timeout).await {
                Ok(decision) => decision,
                Err(Error::ExchangeTimeout { waited_ms, .. }) => {
                    session.fail(
                        FailureKind::DecisionTimeout,
                        format!("no decision within {} ms", waited_ms),
                    );
                    return self.finish(session).await;
                }
                Err(e) => {
                    session.fail(
                        FailureKind::Blocker,
                        format!("decision could not be read: {}", e),
                    );
                    return self.finish(session).await;
                }
            };

            session.steps_taken = step;
            session.record_decision(step, decision.clone());
            if let Some(report) = &decision.bug_report {
                self.source.record_bug_report(report).await?;
            }

            match decision.decision {
                DecisionTag::GoalAchieved => {
                    tracing::info!(step, "Goal achieved");
                    session.complete();
                    return self.finish(session).await;
                }
                DecisionTag::Stuck | DecisionTag::Abort => {
                    session.fail(
                        FailureKind::Declared,
                        if decision.reasoning.is_empty() {
                            "decision-maker declared the session over".to_string()
                        } else {
                            decision.reasoning.clone()
                        },
                    );
                    return self.finish(session).await;
                }
                DecisionTag::Continue => {}
            }

            for action in decision.batch() {
                want_screenshot |= action.observe || action.kind == ActionKind::Screenshot;
                match executor.execute(&action).await {
                    Ok(outcome) => warnings.extend(outcome.warnings),
                    Err(e) => {
                        tracing::warn!(action = action.kind.as_str(), "Action failed: {}", e);
                        action_errors.push(format!("{}: {}", action.fingerprint(), e));
                        if decision.stop_on_error {
                            break;
                        }
                    }
                }
            }
        }

        // The last batch already ran; close the record with the state it
        // left behind so the audit trail covers the whole session. This
        // capture is recorded only, never published for a decision.
        let closing = observer
            .capture(
                self.config.max_steps + 1,
                want_screenshot,
                std::mem::take(&mut action_errors),
                std::mem::take(&mut warnings),
            )
            .await;
        session.record_observation(closing);

        session.fail(
            FailureKind::BudgetExhausted,
            Error::BudgetExceeded {
                limit: self.config.max_steps,
            }
            .to_string(),
        );
        self.finish(session).await
    }

    async fn finish(&self, session: ExplorationSession) -> Result<ExplorationSession> {
        self.source.publish_session(&session).await?;
        match &session.status {
            SessionStatus::Completed => {
                tracing::info!(id = %session.id, steps = session.steps_taken, "Session completed")
            }
            SessionStatus::Failed { kind, reason } => {
                tracing::warn!(id = %session.id, ?kind, %reason, "Session failed")
            }
            SessionStatus::Running => {}
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use async_trait::async_trait;
    use kestrel_browser::ElementInfo;
    use kestrel_core::decision::Decision;
    use kestrel_core::observation::Observation;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Decision source scripted with a fixed sequence of decisions
    #[derive(Default)]
    struct ScriptedSource {
        decisions: Mutex<VecDeque<Decision>>,
        observations: Mutex<Vec<Observation>>,
        sessions: Mutex<Vec<ExplorationSession>>,
        bug_reports: Mutex<Vec<kestrel_core::decision::BugReport>>,
    }

    impl ScriptedSource {
        fn new(decisions: Vec<Decision>) -> Self {
            Self {
                decisions: Mutex::new(decisions.into()),
                ..Default::default()
            }
        }

        fn observations(&self) -> Vec<Observation> {
            self.observations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DecisionSource for ScriptedSource {
        async fn publish_observation(&self, observation: &Observation) -> Result<()> {
            self.observations.lock().unwrap().push(observation.clone());
            Ok(())
        }

        async fn await_decision(&self, timeout: Duration) -> Result<Decision> {
            self.decisions.lock().unwrap().pop_front().ok_or_else(|| {
                Error::ExchangeTimeout {
                    waited_ms: timeout.as_millis() as u64,
                    expected: "action.json".to_string(),
                }
            })
        }

        async fn publish_session(&self, session: &ExplorationSession) -> Result<()> {
            self.sessions.lock().unwrap().push(session.clone());
            Ok(())
        }

        async fn record_bug_report(
            &self,
            report: &kestrel_core::decision::BugReport,
        ) -> Result<()> {
            self.bug_reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    fn visible(tag: &str) -> ElementInfo {
        ElementInfo {
            tag: tag.to_string(),
            visible: true,
            enabled: true,
            ..Default::default()
        }
    }

    fn decision(json: serde_json::Value) -> Decision {
        serde_json::from_value(json).unwrap()
    }

    fn config() -> ExploreConfig {
        let mut config = ExploreConfig::new("https://example.com", "reach the dashboard");
        config.max_steps = 5;
        config.decision_timeout = Duration::from_millis(50);
        config.artifacts_dir = std::env::temp_dir();
        config
    }

    #[tokio::test]
    async fn test_goal_achieved_completes_session() {
        let mock = Arc::new(MockDriver::new().with_element("#go", visible("button")));
        let source = Arc::new(ScriptedSource::new(vec![
            decision(json!({"decision": "continue",
                            "action": {"type": "click", "target": "#go"}})),
            decision(json!({"decision": "goal_achieved", "reasoning": "dashboard visible"})),
        ]));

        let orchestrator =
            SessionOrchestrator::new(mock.clone(), source.clone(), config());
        let session = orchestrator.run().await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.steps_taken, 2);
        // One checkpoint per decision cycle
        assert_eq!(source.observations().len(), 2);
        assert_eq!(session.observations.len(), 2);
    }

    #[tokio::test]
    async fn test_login_batch_lands_on_dashboard() {
        let mock = Arc::new(
            MockDriver::new()
                .with_element("#email", visible("input"))
                .with_element("#password", visible("input"))
                .with_element("#submit", visible("button"))
                .with_redirect("#submit", "https://example.com/dashboard"),
        );
        let source = Arc::new(ScriptedSource::new(vec![
            decision(json!({
                "decision": "continue",
                "actions": [
                    {"type": "type", "target": "#email", "value": "qa@example.com"},
                    {"type": "type", "target": "#password", "value": "hunter2"},
                    {"type": "click", "target": "#submit"}
                ]
            })),
            decision(json!({"decision": "goal_achieved", "reasoning": "dashboard reached"})),
        ]));

        let orchestrator =
            SessionOrchestrator::new(mock.clone(), source.clone(), config());
        let session = orchestrator.run().await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        let observations = source.observations();
        // The checkpoint after the batch sees the post-login page
        assert!(observations[1].url.contains("/dashboard"));
        assert!(observations[1].url_changed);
        assert!(observations[1].action_errors.is_empty());
        // The session record ends on the same checkpoint
        let last = session.last_observation().unwrap();
        assert!(last.url.contains("/dashboard"));
    }

    #[tokio::test]
    async fn test_stop_on_error_halts_batch_before_next_checkpoint() {
        let mock = Arc::new(
            MockDriver::new()
                .with_element("#a", visible("button"))
                .with_element("#c", visible("button")),
        );
        let source = Arc::new(ScriptedSource::new(vec![
            decision(json!({
                "decision": "continue",
                "actions": [
                    {"type": "click", "target": "#a"},
                    {"type": "click", "target": "#missing"},
                    {"type": "click", "target": "#c"}
                ]
            })),
            decision(json!({"decision": "goal_achieved"})),
        ]));

        let orchestrator =
            SessionOrchestrator::new(mock.clone(), source.clone(), config());
        let session = orchestrator.run().await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        // The failing action halted the batch: #c was never touched
        assert!(mock.calls_touching("#c").is_empty());
        // The failure surfaced in the following checkpoint, not earlier
        let observations = source.observations();
        assert!(observations[0].action_errors.is_empty());
        assert_eq!(observations[1].action_errors.len(), 1);
        assert!(observations[1].action_errors[0].contains("#missing"));
    }

    #[tokio::test]
    async fn test_batch_continues_past_failure_when_tolerated() {
        let mock = Arc::new(
            MockDriver::new()
                .with_element("#a", visible("button"))
                .with_element("#c", visible("button")),
        );
        let source = Arc::new(ScriptedSource::new(vec![
            decision(json!({
                "decision": "continue",
                "stop_on_error": false,
                "actions": [
                    {"type": "click", "target": "#a"},
                    {"type": "click", "target": "#missing"},
                    {"type": "click", "target": "#c"}
                ]
            })),
            decision(json!({"decision": "goal_achieved"})),
        ]));

        let orchestrator =
            SessionOrchestrator::new(mock.clone(), source.clone(), config());
        orchestrator.run().await.unwrap();

        assert_eq!(mock.calls_touching("#c"), vec!["click:#c"]);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_distinct_failure() {
        let mock = Arc::new(MockDriver::new().with_element("#go", visible("button")));
        let keep_going = decision(json!({"decision": "continue",
                                         "action": {"type": "scroll", "value": "down"}}));
        let source = Arc::new(ScriptedSource::new(vec![keep_going; 10]));

        let orchestrator = SessionOrchestrator::new(mock.clone(), source.clone(), config());
        let session = orchestrator.run().await.unwrap();

        assert!(matches!(
            session.status,
            SessionStatus::Failed {
                kind: FailureKind::BudgetExhausted,
                ..
            }
        ));
        assert_eq!(session.steps_taken, 5);
        // Five checkpoints plus a closing capture of the final batch's
        // effects; only the checkpoints were published for decisions
        assert_eq!(session.observations.len(), 6);
        assert_eq!(session.last_observation().map(|o| o.step), Some(6));
        assert_eq!(source.observations().len(), 5);
    }

    #[tokio::test]
    async fn test_declared_stuck_is_distinct_failure() {
        let mock = Arc::new(MockDriver::new());
        let source = Arc::new(ScriptedSource::new(vec![decision(
            json!({"decision": "stuck", "reasoning": "no path to the dashboard"}),
        )]));

        let orchestrator = SessionOrchestrator::new(mock.clone(), source, config());
        let session = orchestrator.run().await.unwrap();

        match session.status {
            SessionStatus::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::Declared);
                assert_eq!(reason, "no path to the dashboard");
            }
            other => panic!("expected declared failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decision_timeout_is_distinct_failure() {
        let mock = Arc::new(MockDriver::new());
        let source = Arc::new(ScriptedSource::new(Vec::new()));

        let orchestrator = SessionOrchestrator::new(mock.clone(), source.clone(), config());
        let session = orchestrator.run().await.unwrap();

        assert!(matches!(
            session.status,
            SessionStatus::Failed {
                kind: FailureKind::DecisionTimeout,
                ..
            }
        ));
        // Persisted at the checkpoint and again with the terminal status
        let sessions = source.sessions.lock().unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.last().unwrap().status.is_terminal());
    }

    #[tokio::test]
    async fn test_captcha_blocker_fails_session_before_checkpoint() {
        let mock = Arc::new(
            MockDriver::new().with_eval_results(vec![json!({"kind": "captcha"})]),
        );
        let source = Arc::new(ScriptedSource::new(Vec::new()));

        let orchestrator = SessionOrchestrator::new(mock.clone(), source.clone(), config());
        let session = orchestrator.run().await.unwrap();

        match session.status {
            SessionStatus::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::Blocker);
                assert!(reason.contains("CAPTCHA"));
            }
            other => panic!("expected blocker failure, got {:?}", other),
        }
        assert!(source.observations().is_empty());
    }

    #[tokio::test]
    async fn test_bug_reports_forwarded_to_source() {
        let mock = Arc::new(MockDriver::new());
        let source = Arc::new(ScriptedSource::new(vec![decision(json!({
            "decision": "goal_achieved",
            "bug_report": {
                "title": "500 on save",
                "evidence": ["POST /save -> 500"]
            }
        }))]));

        let orchestrator = SessionOrchestrator::new(mock.clone(), source.clone(), config());
        orchestrator.run().await.unwrap();

        let reports = source.bug_reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].title, "500 on save");
    }
}
