pub mod engine;
pub mod inputs;
pub mod sensitivity;
pub mod wacc;

pub use engine::{DcfEngine, DcfSettings, DcfValuation, DcfYearProjection};
pub use inputs::DcfInputs;
pub use sensitivity::{SensitivityGrid, SweepRange};
pub use wacc::{calculate_wacc, WaccInput, WaccOutput};
