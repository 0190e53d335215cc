use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Action '{action}' timed out after {timeout_ms} ms")]
    ActionTimeout { action: String, timeout_ms: u64 },

    #[error("Element disabled: {0}")]
    ElementDisabled(String),

    #[error("Repeated action limit reached: {0} executed 3 times in a row")]
    RepeatedActionLimit(String),

    #[error("Action failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Obstacle could not be resolved: {0}")]
    ObstacleUnresolved(String),

    #[error("CAPTCHA blocks the page")]
    CaptchaBlocker,

    #[error("Decision-maker did not respond within {waited_ms} ms; expected {expected}")]
    ExchangeTimeout { waited_ms: u64, expected: String },

    #[error("Step budget of {limit} exhausted without a terminal decision")]
    BudgetExceeded { limit: u32 },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Core(#[from] kestrel_core::Error),

    #[error("Driver error: {0}")]
    Driver(#[from] kestrel_browser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
