pub mod action;
pub mod decision;
pub mod error;
pub mod events;
pub mod observation;
pub mod scenario;
pub mod session;
pub mod wait;

pub use error::{Error, Result};
