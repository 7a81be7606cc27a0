pub mod blend_rules;
pub mod chain;
pub mod history;
pub mod model;
pub mod probes;
pub mod processor;

pub use model::{
    CompanyFinancials, CompanyProfile, FinancialPeriod, InputOverrides, InterimPeriod,
    MarketSnapshot,
};
pub use processor::{CompanyData, FinancialDataProcessor, ProcessedInputs, ProcessorDiagnostics};
