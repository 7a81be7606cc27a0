pub mod config;
pub mod error;
pub mod stats;
pub mod time_value;
pub mod types;

pub mod blend;
pub mod dcf;
pub mod financials;
pub mod peers;
pub mod pipeline;
pub mod relative;
pub mod scenarios;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use config::EngineConfig;
pub use error::ValuationError;
pub use types::*;

/// Standard result type for all valuation-engine operations
pub type IntrinsicResult<T> = Result<T, ValuationError>;
