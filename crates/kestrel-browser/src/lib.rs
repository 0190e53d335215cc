mod cdp;
mod chrome;
mod driver;
mod error;

pub use cdp::CdpDriver;
pub use chrome::{ChromeConfig, ChromeSession, find_chrome};
pub use driver::{Driver, ElementInfo, SelectChoice, SelectorState};
pub use error::{Error, Result};
