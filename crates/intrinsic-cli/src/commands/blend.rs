use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use intrinsic_core::blend::ValuationBlender;
use intrinsic_core::config::EngineConfig;

/// Arguments for blending per-method values
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct BlendArgs {
    /// DCF BASE value per share
    #[arg(long)]
    pub dcf: Option<Decimal>,

    /// Relative value per share
    #[arg(long)]
    pub relative: Option<Decimal>,

    /// Monte Carlo median value per share
    #[arg(long)]
    pub mc_median: Option<Decimal>,

    /// Monte Carlo coefficient of variation
    #[arg(long)]
    pub mc_cv: Option<Decimal>,

    /// Number of data-quality warnings raised upstream
    #[arg(long, default_value_t = 0)]
    pub quality_warnings: usize,
}

pub fn run_blend(args: BlendArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let blender = ValuationBlender::from_config(&config);
    let result = blender.blend_with_confidence(
        args.dcf,
        args.relative,
        args.mc_median,
        args.mc_cv,
        args.quality_warnings,
    )?;
    Ok(serde_json::to_value(result)?)
}
