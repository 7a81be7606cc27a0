use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Normal, Triangular};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{EngineConfig, MonteCarloConfig};
use crate::dcf::{DcfEngine, DcfInputs};
use crate::error::ValuationError;
use crate::types::{ComputationMetadata, ComputationOutput, Money, Tagged};
use crate::IntrinsicResult;

/// Beta draws are floored here; a non-positive beta is meaningless for CAPM.
const BETA_FLOOR: f64 = 0.1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Percentile summary of simulated per-share values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// Distribution of intrinsic value per share across valid draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McValuation {
    pub requested: u32,
    pub valid_draws: u32,
    /// Draws the DCF refused (WACC <= g, negative terminal value).
    pub rejected_draws: u32,
    /// Set when the time budget cut the run short.
    pub degraded: bool,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    /// std / |mean|; `None` when the mean is zero.
    pub coefficient_of_variation: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    /// Share of valid draws above the current market price.
    pub probability_above_cmp: Option<f64>,
}

impl McValuation {
    pub fn median_decimal(&self) -> Option<Money> {
        Decimal::try_from(self.median).ok()
    }
}

/// Resamples growth, margin, terminal ROCE and beta around a BASE input set
/// and reruns the DCF for each draw.
#[derive(Debug, Clone, Default)]
pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Pre-built distributions for one run.
struct Samplers {
    growth: Option<Triangular>,
    margin: Option<Normal>,
    roce: Option<Normal>,
    beta: Option<Normal>,
}

/// Normal(base, |base| * sd_pct), or `None` when the spread collapses to zero.
fn proportional_normal(name: &str, base: f64, sd_pct: f64) -> IntrinsicResult<Option<Normal>> {
    let sd = base.abs() * sd_pct;
    if sd <= 0.0 || !sd.is_finite() {
        return Ok(None);
    }
    Normal::new(base, sd)
        .map(Some)
        .map_err(|e| ValuationError::InvalidInput {
            field: name.into(),
            reason: format!("Invalid Normal parameters: {e}"),
        })
}

fn to_f64(field: &str, value: Decimal) -> IntrinsicResult<f64> {
    f64::try_from(value).map_err(|_| ValuationError::InvalidInput {
        field: field.into(),
        reason: format!("{value} is not representable as f64"),
    })
}

fn draw(rng: &mut StdRng, dist: &Option<Normal>, base: f64) -> f64 {
    match dist {
        Some(d) => rng.sample(d),
        None => base,
    }
}

fn set_value(tagged: &mut Tagged<Decimal>, sampled: f64) -> bool {
    match Decimal::try_from(sampled) {
        Ok(d) => {
            tagged.value = d;
            true
        }
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile of a **sorted** slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn summarize(values: &mut [f64], cmp: Option<f64>) -> McValuation {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let median = if values.len() % 2 == 0 {
        let mid = values.len() / 2;
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[values.len() / 2]
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let coefficient_of_variation = if mean.abs() > f64::EPSILON {
        Some(std_dev / mean.abs())
    } else {
        None
    };
    let probability_above_cmp = cmp.map(|price| {
        values.iter().filter(|v| **v > price).count() as f64 / n
    });

    McValuation {
        requested: 0,
        valid_draws: values.len() as u32,
        rejected_draws: 0,
        degraded: false,
        mean,
        median,
        std_dev,
        coefficient_of_variation,
        min: values[0],
        max: values[values.len() - 1],
        percentiles: McPercentiles {
            p5: percentile_sorted(values, 5.0),
            p10: percentile_sorted(values, 10.0),
            p25: percentile_sorted(values, 25.0),
            p50: percentile_sorted(values, 50.0),
            p75: percentile_sorted(values, 75.0),
            p90: percentile_sorted(values, 90.0),
            p95: percentile_sorted(values, 95.0),
        },
        probability_above_cmp,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl MonteCarloSimulator {
    pub fn new(config: MonteCarloConfig) -> Self {
        MonteCarloSimulator { config }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        MonteCarloSimulator::new(config.monte_carlo.clone())
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Run the configured number of draws.
    pub fn run_simulation(
        &self,
        engine: &DcfEngine,
        base: &DcfInputs,
        cmp: Option<Money>,
    ) -> IntrinsicResult<ComputationOutput<McValuation>> {
        self.run_simulation_with(engine, base, cmp, self.config.simulations)
    }

    /// Run exactly `simulations` draws (fewer if the time budget runs out).
    pub fn run_simulation_with(
        &self,
        engine: &DcfEngine,
        base: &DcfInputs,
        cmp: Option<Money>,
        simulations: u32,
    ) -> IntrinsicResult<ComputationOutput<McValuation>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();
        let cfg = &self.config;

        if simulations == 0 {
            return Err(ValuationError::InvalidInput {
                field: "simulations".into(),
                reason: "Must be at least 1".into(),
            });
        }
        if cfg.growth_low_factor > 1.0 || cfg.growth_high_factor < 1.0 {
            return Err(ValuationError::InvalidInput {
                field: "growth_factor".into(),
                reason: "Growth factor range must contain 1.0".into(),
            });
        }
        base.validate()?;

        let samplers = Samplers {
            growth: if cfg.growth_high_factor > cfg.growth_low_factor {
                Some(
                    Triangular::new(cfg.growth_low_factor, cfg.growth_high_factor, 1.0).map_err(
                        |e| ValuationError::InvalidInput {
                            field: "growth_factor".into(),
                            reason: format!("Invalid Triangular parameters: {e}"),
                        },
                    )?,
                )
            } else {
                None
            },
            margin: proportional_normal(
                "ebitda_margin",
                to_f64("ebitda_margin", base.ebitda_margin.value)?,
                cfg.margin_sd_pct,
            )?,
            roce: proportional_normal(
                "terminal_roce",
                to_f64("terminal_roce", base.terminal_roce.value)?,
                cfg.roce_sd_pct,
            )?,
            beta: proportional_normal("beta", to_f64("beta", base.beta.value)?, cfg.beta_sd_pct)?,
        };
        let base_margin = to_f64("ebitda_margin", base.ebitda_margin.value)?;
        let base_roce = to_f64("terminal_roce", base.terminal_roce.value)?;
        let base_beta = to_f64("beta", base.beta.value)?;

        let mut rng = match cfg.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let budget = cfg.time_budget_ms.map(Duration::from_millis);

        let mut values: Vec<f64> = Vec::with_capacity(simulations as usize);
        let mut rejected: u32 = 0;
        let mut degraded = false;
        let mut scratch: Vec<String> = Vec::new();

        for i in 0..simulations {
            let factor = samplers
                .growth
                .as_ref()
                .map(|t| rng.sample(t))
                .unwrap_or(1.0);
            let margin = draw(&mut rng, &samplers.margin, base_margin);
            let roce = draw(&mut rng, &samplers.roce, base_roce);
            let beta = draw(&mut rng, &samplers.beta, base_beta).max(BETA_FLOOR);

            let mut inputs = base.clone();
            let ok = set_value(&mut inputs.ebitda_margin, margin)
                && set_value(&mut inputs.terminal_roce, roce)
                && set_value(&mut inputs.beta, beta);
            let factor_dec = Decimal::try_from(factor).ok();

            let per_share = match (ok, factor_dec) {
                (true, Some(f)) => {
                    for g in inputs.revenue_growth.value.iter_mut() {
                        *g *= f;
                    }
                    scratch.clear();
                    engine
                        .value(&inputs, &mut scratch)
                        .ok()
                        .and_then(|v| f64::try_from(v.intrinsic_per_share).ok())
                }
                _ => None,
            };
            match per_share {
                Some(v) if v.is_finite() => values.push(v),
                _ => rejected += 1,
            }

            if let Some(limit) = budget {
                if start.elapsed() >= limit && i + 1 < simulations {
                    degraded = true;
                    warn!(
                        completed = i + 1,
                        requested = simulations,
                        "monte carlo time budget exhausted"
                    );
                    break;
                }
            }
        }

        if values.is_empty() {
            return Err(ValuationError::method_unavailable(
                "monte_carlo",
                format!("All {rejected} draws were rejected by the DCF"),
            ));
        }
        if rejected > 0 {
            warnings.push(format!(
                "{rejected} of {} draws rejected (WACC <= terminal growth or negative terminal value)",
                rejected as usize + values.len()
            ));
        }
        if degraded {
            warnings.push(format!(
                "Time budget exhausted after {} of {simulations} draws; distribution is partial",
                rejected as usize + values.len()
            ));
        }

        let cmp_f64 = match cmp {
            Some(p) if p > Decimal::ZERO => Some(to_f64("cmp", p)?),
            _ => None,
        };
        let mut output = summarize(&mut values, cmp_f64);
        output.requested = simulations;
        output.rejected_draws = rejected;
        output.degraded = degraded;

        debug!(
            valid = output.valid_draws,
            rejected,
            median = output.median,
            "monte carlo complete"
        );

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(ComputationOutput {
            result: output,
            methodology: "Monte Carlo DCF (triangular growth, normal margin/ROCE/beta)".to_string(),
            assumptions: serde_json::json!({
                "simulations": simulations,
                "seed": cfg.seed,
                "growth_factor": [cfg.growth_low_factor, 1.0, cfg.growth_high_factor],
                "margin_sd_pct": cfg.margin_sd_pct,
                "roce_sd_pct": cfg.roce_sd_pct,
                "beta_sd_pct": cfg.beta_sd_pct,
            }),
            warnings,
            metadata: ComputationMetadata::new(elapsed, "ieee754_f64"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
