use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{Error, Result};
use crate::wait::WaitCondition;

/// One named step in a fixed scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub action: Action,
}

impl ScenarioStep {
    /// Display name for reports: explicit name or the action kind
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.action.kind.as_str().to_string())
    }
}

/// A deterministic scripted run loaded from a YAML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub start_url: String,
    #[serde(default = "default_stop_on_first_failure")]
    pub stop_on_first_failure: bool,
    pub steps: Vec<ScenarioStep>,
    /// Read-only assertions evaluated after the last step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<WaitCondition>,
}

fn default_stop_on_first_failure() -> bool {
    true
}

impl Scenario {
    /// Load and validate a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let scenario: Scenario = serde_yaml::from_str(&raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("scenario has no name".to_string()));
        }
        if self.start_url.trim().is_empty() {
            return Err(Error::Validation(format!(
                "scenario '{}' has no start_url",
                self.name
            )));
        }
        url::Url::parse(&self.start_url).map_err(|e| {
            Error::Validation(format!(
                "scenario '{}' start_url is not a valid URL: {}",
                self.name, e
            ))
        })?;
        if self.steps.is_empty() {
            return Err(Error::Validation(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.action.validate().map_err(|e| {
                Error::Validation(format!(
                    "scenario '{}' step {} ({}): {}",
                    self.name,
                    index + 1,
                    step.display_name(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
