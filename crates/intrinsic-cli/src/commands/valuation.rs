use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;
use tracing::debug;

use intrinsic_core::config::EngineConfig;
use intrinsic_core::financials::FinancialDataProcessor;
use intrinsic_core::peers::{PeerCandidate, StaticPeerUniverse};
use intrinsic_core::pipeline::{ValuationEngine, ValuationRequest};

use crate::input;

/// Arguments for a full valuation
#[derive(Args)]
pub struct ValueArgs {
    /// Path to a valuation request (company, outlook, overrides) in JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    /// Path to the peer universe: a list of candidates with their multiples
    #[arg(long)]
    pub peers: Option<String>,

    /// Valuation date (YYYY-MM-DD); defaults to the request's date or today
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Fix the Monte Carlo seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of Monte Carlo draws
    #[arg(long)]
    pub simulations: Option<u32>,
}

/// Arguments for resolving DCF inputs only
#[derive(Args)]
pub struct InputsArgs {
    /// Path to a valuation request in JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    /// Valuation date (YYYY-MM-DD)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

pub fn run_value(args: ValueArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: ValuationRequest = input::load(args.input.as_deref(), "valuation request")?;
    if args.as_of.is_some() {
        request.valuation_date = args.as_of;
    }

    let mut config = config;
    if let Some(seed) = args.seed {
        config.monte_carlo.seed = Some(seed);
    }
    if let Some(n) = args.simulations {
        config.monte_carlo.simulations = n;
    }

    let universe = load_universe(args.peers.as_deref())?;
    debug!(
        symbol = %request.company.profile.symbol,
        candidates = universe.candidates().len(),
        "running valuation"
    );
    let engine = ValuationEngine::new(config)?;
    let result = engine.value(&request, &universe)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_inputs(args: InputsArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ValuationRequest = input::load(args.input.as_deref(), "valuation request")?;
    let sector = config.sector(&request.company.profile.sector);
    let mut processor = FinancialDataProcessor::new(&config);
    if let Some(date) = args.as_of.or(request.valuation_date) {
        processor = processor.with_valuation_date(date);
    }
    let processed = processor.build_inputs(&request.company, sector, &request.overrides)?;
    Ok(serde_json::to_value(processed)?)
}

/// An absent `--peers` file means an empty universe; the relative method
/// then drops out of the blend.
pub fn load_universe(path: Option<&str>) -> Result<StaticPeerUniverse, Box<dyn std::error::Error>> {
    let candidates: Vec<PeerCandidate> = match path {
        Some(p) => input::file::read_typed(p)?,
        None => Vec::new(),
    };
    Ok(StaticPeerUniverse::new(candidates))
}
