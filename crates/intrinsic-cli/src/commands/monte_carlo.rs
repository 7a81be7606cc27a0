use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use intrinsic_core::config::EngineConfig;
use intrinsic_core::dcf::{DcfEngine, DcfInputs};
use intrinsic_core::monte_carlo::MonteCarloSimulator;

use crate::input;

/// Arguments for the Monte Carlo DCF distribution
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to BASE DCF inputs in JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    /// Number of draws (overrides the configured count)
    #[arg(long)]
    pub simulations: Option<u32>,

    /// RNG seed for a reproducible distribution
    #[arg(long)]
    pub seed: Option<u64>,

    /// Current market price; enables P(value > price)
    #[arg(long)]
    pub price: Option<Decimal>,

    /// Wall-clock budget in milliseconds
    #[arg(long)]
    pub time_budget_ms: Option<u64>,
}

pub fn run_simulate(args: SimulateArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs: DcfInputs = input::load(args.input.as_deref(), "DCF inputs")?;

    let mut mc = config.monte_carlo.clone();
    if let Some(n) = args.simulations {
        mc.simulations = n;
    }
    if args.seed.is_some() {
        mc.seed = args.seed;
    }
    if args.time_budget_ms.is_some() {
        mc.time_budget_ms = args.time_budget_ms;
    }

    let engine = DcfEngine::from_config(&config);
    let result = MonteCarloSimulator::new(mc).run_simulation(&engine, &inputs, args.price)?;
    Ok(serde_json::to_value(result)?)
}
