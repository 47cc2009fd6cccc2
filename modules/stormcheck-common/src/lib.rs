pub mod config;
pub mod error;
pub mod geo;
pub mod types;

pub use config::Config;
pub use error::StormcheckError;
pub use types::*;
