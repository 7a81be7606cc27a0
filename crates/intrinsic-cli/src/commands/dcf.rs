use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use intrinsic_core::config::EngineConfig;
use intrinsic_core::dcf::{DcfEngine, DcfInputs, SweepRange};
use intrinsic_core::scenarios::{OutlookAdjustment, ScenarioBuilder};
use intrinsic_core::types::with_metadata;

use crate::input;

/// Arguments for a single DCF run
#[derive(Args)]
pub struct DcfArgs {
    /// Path to DCF inputs in JSON or YAML; bare numbers are tagged DEFAULT
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for BULL/BASE/BEAR scenarios
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ScenarioArgs {
    /// Path to BASE DCF inputs in JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    /// Outlook shift to every growth rate (e.g. 0.01 or -0.02)
    #[arg(long, default_value = "0")]
    pub growth_adjustment: Decimal,

    /// Outlook shift to the EBITDA margin
    #[arg(long, default_value = "0")]
    pub margin_adjustment: Decimal,
}

/// Arguments for the WACC x terminal growth grid
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to DCF inputs in JSON or YAML
    #[arg(long)]
    pub input: Option<String>,

    /// WACC sweep as min:max:step (e.g. "0.09:0.14:0.01"); centred on the base WACC if omitted
    #[arg(long)]
    pub wacc: Option<String>,

    /// Terminal growth sweep as min:max:step; configured range if omitted
    #[arg(long)]
    pub growth: Option<String>,
}

pub fn run_dcf(args: DcfArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs: DcfInputs = input::load(args.input.as_deref(), "DCF inputs")?;
    let result = DcfEngine::from_config(&config).calculate_intrinsic_value(&inputs)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_scenarios(args: ScenarioArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs: DcfInputs = input::load(args.input.as_deref(), "DCF inputs")?;
    let outlook = OutlookAdjustment {
        growth_adjustment: args.growth_adjustment,
        margin_adjustment: args.margin_adjustment,
        ..Default::default()
    };
    let start = std::time::Instant::now();
    let engine = DcfEngine::from_config(&config);
    let builder = ScenarioBuilder::from_config(&config);
    let set = builder.build(&inputs, &outlook);
    let values = builder.value_scenarios(&engine, &set)?;

    let mut warnings = values.warnings.clone();
    for (kind, reason) in &values.rejected {
        warnings.push(format!("{kind} rejected: {reason}"));
    }
    let output = with_metadata(
        "BULL/BASE/BEAR DCF scenarios",
        &outlook,
        warnings,
        start.elapsed().as_micros() as u64,
        serde_json::json!({
            "base": values.base.intrinsic_per_share,
            "bull": values.bull.as_ref().map(|v| v.intrinsic_per_share),
            "bear": values.bear.as_ref().map(|v| v.intrinsic_per_share),
        }),
    );
    Ok(serde_json::to_value(output)?)
}

pub fn run_sensitivity(args: SensitivityArgs, config: EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs: DcfInputs = input::load(args.input.as_deref(), "DCF inputs")?;
    let engine = DcfEngine::from_config(&config);
    let result = match (args.wacc.as_deref(), args.growth.as_deref()) {
        (None, None) => engine.default_sensitivity(&inputs, &config.sensitivity)?,
        (wacc, growth) => {
            let wacc_range = match wacc {
                Some(range) => parse_range(range)?,
                None => {
                    let mut scratch = Vec::new();
                    let base = engine.value(&inputs, &mut scratch)?;
                    SweepRange::around(
                        base.wacc.wacc,
                        config.sensitivity.wacc_half_width,
                        config.sensitivity.wacc_step,
                    )
                }
            };
            let growth_range = match growth {
                Some(range) => parse_range(range)?,
                None => SweepRange::new(
                    config.sensitivity.growth_min,
                    config.sensitivity.growth_max,
                    config.sensitivity.growth_step,
                ),
            };
            engine.sensitivity_analysis(&inputs, &wacc_range, &growth_range)?
        }
    };
    Ok(serde_json::to_value(result)?)
}

fn parse_range(range: &str) -> Result<SweepRange, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = range.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("Range must be min:max:step, got '{}'", range).into());
    }
    let min: Decimal = parts[0]
        .parse()
        .map_err(|e| format!("Invalid min '{}': {}", parts[0], e))?;
    let max: Decimal = parts[1]
        .parse()
        .map_err(|e| format!("Invalid max '{}': {}", parts[1], e))?;
    let step: Decimal = parts[2]
        .parse()
        .map_err(|e| format!("Invalid step '{}': {}", parts[2], e))?;
    Ok(SweepRange::new(min, max, step))
}
