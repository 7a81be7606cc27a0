pub mod builder;

pub use builder::{OutlookAdjustment, ScenarioBuilder, ScenarioKind, ScenarioSet, ScenarioValuations};
