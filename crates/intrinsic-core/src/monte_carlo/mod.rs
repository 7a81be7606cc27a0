pub mod simulation;

pub use simulation::{McPercentiles, McValuation, MonteCarloSimulator};
