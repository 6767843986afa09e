pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{BackendError, CaseScoutError};
pub use types::*;
