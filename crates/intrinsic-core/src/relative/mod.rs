pub mod engine;
pub mod quality;

pub use engine::{
    CompanyMetrics, ImpliedValue, MultipleKind, PeerMultipleSample, RelativeValuation,
    RelativeValuationEngine,
};
pub use quality::{quality_adjustment, QualityAdjustment, QualityInputs};
