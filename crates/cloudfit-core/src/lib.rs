//! cloudfit-core: domain types and configuration shared by every
//! cloudfit crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::CloudfitConfig;
pub use error::ValidationError;
pub use types::*;
