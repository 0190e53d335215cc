use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{Error, Result};
use kestrel_core::decision::{BugReport, Decision};
use kestrel_core::observation::Observation;
use kestrel_core::session::ExplorationSession;

pub const OBSERVATION_FILE: &str = "observation.json";
pub const DECISION_FILE: &str = "action.json";
pub const STATUS_FILE: &str = "status.txt";
pub const SESSION_FILE: &str = "session.json";
pub const BUG_REPORT_FILE: &str = "bug-report.json";

const STATUS_RUNNING: &str = "RUNNING";
const STATUS_WAITING: &str = "WAITING_FOR_AI";

/// Where decisions come from.
///
/// The orchestrator only sees this seam; the file mailbox below is the
/// production implementation and tests script their own.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Publish a checkpoint and signal that a decision is awaited
    async fn publish_observation(&self, observation: &Observation) -> Result<()>;

    /// Block until the decision answering the last published observation
    /// arrives, or until `timeout` expires.
    async fn await_decision(&self, timeout: Duration) -> Result<Decision>;

    /// Persist the current session record
    async fn publish_session(&self, session: &ExplorationSession) -> Result<()>;

    /// Append defect evidence to the accumulated report
    async fn record_bug_report(&self, report: &BugReport) -> Result<()>;
}

/// File-based polling mailbox shared with an external decision-maker.
///
/// The engine writes `observation.json` and flips `status.txt` to
/// WAITING_FOR_AI; the decision-maker answers by dropping `action.json`,
/// which is consumed exactly once (read then deleted) so a stale decision
/// can never be replayed against a later observation. On timeout the
/// status stays WAITING_FOR_AI so an operator can see where the exchange
/// stalled.
pub struct FileExchange {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileExchange {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            poll_interval: Duration::from_secs(1),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_status(&self, status: &str) -> Result<()> {
        std::fs::write(self.path(STATUS_FILE), status)?;
        Ok(())
    }
}

#[async_trait]
impl DecisionSource for FileExchange {
    async fn publish_observation(&self, observation: &Observation) -> Result<()> {
        let json = serde_json::to_string_pretty(observation)?;
        std::fs::write(self.path(OBSERVATION_FILE), json)?;
        self.write_status(STATUS_WAITING)?;
        tracing::debug!(step = observation.step, "Published observation, awaiting decision");
        Ok(())
    }

    async fn await_decision(&self, timeout: Duration) -> Result<Decision> {
        let deadline = Instant::now() + timeout;
        let decision_path = self.path(DECISION_FILE);
        // A half-written file parses as garbage once; identical garbage on
        // the next poll means the writer is done and the payload is bad
        let mut last_bad: Option<String> = None;

        loop {
            if decision_path.exists() {
                let content = std::fs::read_to_string(&decision_path)?;
                match serde_json::from_str::<Decision>(&content) {
                    Ok(decision) => {
                        std::fs::remove_file(&decision_path)?;
                        self.write_status(STATUS_RUNNING)?;
                        decision.validate().map_err(Error::Core)?;
                        return Ok(decision);
                    }
                    Err(e) => {
                        if last_bad.as_deref() == Some(content.as_str()) {
                            std::fs::remove_file(&decision_path)?;
                            return Err(Error::Json(e));
                        }
                        last_bad = Some(content);
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::ExchangeTimeout {
                    waited_ms: timeout.as_millis() as u64,
                    expected: DECISION_FILE.to_string(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn publish_session(&self, session: &ExplorationSession) -> Result<()> {
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(self.path(SESSION_FILE), json)?;
        Ok(())
    }

    async fn record_bug_report(&self, report: &BugReport) -> Result<()> {
        let path = self.path(BUG_REPORT_FILE);
        let mut reports: Vec<BugReport> = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(_) => Vec::new(),
        };
        reports.push(report.clone());
        std::fs::write(&path, serde_json::to_string_pretty(&reports)?)?;
        tracing::info!(title = %report.title, "Recorded bug report");
        Ok(())
    }
}
