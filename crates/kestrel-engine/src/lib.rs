//! The exploration engine: action execution, page observation, obstacle
//! clearing, the decision exchange and the session loop that ties them
//! together.

pub mod error;
pub mod event_log;
pub mod exchange;
pub mod executor;
pub mod observe;
pub mod obstacles;
pub mod orchestrator;
pub mod scenario_runner;
pub mod waiter;

#[cfg(test)]
pub mod mock;

pub use error::{Error, Result};
pub use event_log::EventLog;
pub use exchange::{DecisionSource, FileExchange};
pub use executor::{ActionExecutor, ActionOutcome, ExecutorConfig};
pub use observe::ObservationEngine;
pub use obstacles::{Credentials, ObstacleResolver};
pub use orchestrator::{ExploreConfig, SessionOrchestrator};
pub use scenario_runner::{ScenarioReport, ScenarioRunner, StepReport, StepStatus};
