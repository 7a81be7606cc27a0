pub mod engine;
pub mod result;

pub use engine::{subject_metrics, ValuationEngine};
pub use result::{MethodAvailability, McSummary, ScenarioSummary, ValuationRequest, ValuationResult};
