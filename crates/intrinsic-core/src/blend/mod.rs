pub mod blender;
pub mod confidence;

pub use blender::{BlendOutcome, MethodContribution, ValuationBlender, ValuationMethod};
pub use confidence::{calculate_confidence, ConfidenceBreakdown};
