pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ColloquyConfig;
pub use error::{ColloquyError, Result};
pub use events::{ClientEvent, ClientOperation};
pub use types::*;
