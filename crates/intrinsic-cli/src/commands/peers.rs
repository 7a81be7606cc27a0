use chrono::Utc;
use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use intrinsic_core::config::EngineConfig;
use intrinsic_core::financials::CompanyData;
use intrinsic_core::peers::PeerTier;
use intrinsic_core::pipeline::{subject_metrics, ValuationEngine, ValuationRequest};
use intrinsic_core::relative::{
    CompanyMetrics, PeerMultipleSample, QualityInputs, RelativeValuationEngine,
};

use super::valuation::load_universe;
use crate::input;

/// Arguments for peer selection
#[derive(Args)]
pub struct PeersArgs {
    /// Path to a valuation request whose company is the subject
    #[arg(long)]
    pub input: Option<String>,

    /// Path to the peer universe
    #[arg(long)]
    pub peers: String,

    /// Pin these symbols into the tight tier (repeatable)
    #[arg(long)]
    pub pin: Vec<String>,
}

/// Arguments for a stand-alone relative valuation
#[derive(Args)]
pub struct RelativeArgs {
    /// Path to a relative request: company metrics, peer samples, sector, quality inputs
    #[arg(long)]
    pub input: Option<String>,
}

/// Everything the relative engine needs, without a peer universe.
#[derive(Debug, Deserialize)]
struct RelativeRequest {
    company: CompanyMetrics,
    peers: Vec<PeerMultipleSample>,
    #[serde(default)]
    sector: String,
    #[serde(default)]
    quality: QualityInputs,
}

pub fn run_peers(args: PeersArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ValuationRequest = input::load(args.input.as_deref(), "valuation request")?;
    let universe = load_universe(Some(args.peers.as_str()))?;
    let engine = ValuationEngine::new(config)?;
    let subject = subject_metrics(&request.company, shares_hint(&request.company));

    let selector = engine.peer_selector(&universe);
    let mut group = selector.build_peer_group(&subject);
    for symbol in &args.pin {
        group = selector.pin_peer(&subject, symbol, PeerTier::Tight, Utc::now());
    }
    Ok(serde_json::to_value(group)?)
}

pub fn run_relative(args: RelativeArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request: RelativeRequest = input::load(args.input.as_deref(), "relative request")?;
    let sector = config.sector(&request.sector);
    let result = RelativeValuationEngine::from_config(&config).calculate_relative_value(
        &request.company,
        &request.peers,
        sector,
        &request.quality,
    );
    Ok(serde_json::to_value(result)?)
}

/// Share count for the market-cap fallback when no processor run is wanted.
fn shares_hint(company: &CompanyData) -> Decimal {
    company
        .market
        .as_ref()
        .and_then(|m| m.shares_outstanding)
        .or_else(|| {
            company
                .financials
                .latest_annual()
                .and_then(|(_, p)| p.shares_outstanding)
        })
        .unwrap_or(Decimal::ONE)
}
