//! Engine configuration and the overridable policy rules table.
//!
//! Every field carries a serde default so a partial JSON/YAML document only
//! needs to name what it changes. The numeric defaults are illustrative
//! starting points, not calibrated values.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValuationError;
use crate::types::Rate;
use crate::IntrinsicResult;

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub market: MarketParameters,
    /// Explicit projection horizon in years.
    pub projection_years: u32,
    pub mid_year_convention: bool,
    pub scenarios: ScenarioConfig,
    pub monte_carlo: MonteCarloConfig,
    pub peers: PeerConfig,
    pub blend: BlendWeightsConfig,
    pub confidence: ConfidenceConfig,
    pub staleness: StalenessConfig,
    pub sensitivity: SensitivityConfig,
    pub rules: PolicyRules,
    /// Sector name -> sector configuration. Lookup is case-insensitive.
    pub sectors: BTreeMap<String, SectorConfig>,
    /// Used when a sector has no entry in `sectors`.
    pub default_sector: SectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut sectors = BTreeMap::new();
        sectors.insert("Financials".to_string(), SectorConfig::financials());
        EngineConfig {
            market: MarketParameters::default(),
            projection_years: 5,
            mid_year_convention: false,
            scenarios: ScenarioConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            peers: PeerConfig::default(),
            blend: BlendWeightsConfig::default(),
            confidence: ConfidenceConfig::default(),
            staleness: StalenessConfig::default(),
            sensitivity: SensitivityConfig::default(),
            rules: PolicyRules::default(),
            sectors,
            default_sector: SectorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Resolve the sector configuration, falling back to `default_sector`.
    pub fn sector(&self, name: &str) -> &SectorConfig {
        self.sectors
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .unwrap_or(&self.default_sector)
    }

    pub fn validate(&self) -> IntrinsicResult<()> {
        if self.projection_years < 2 {
            return Err(ValuationError::InvalidInput {
                field: "projection_years".into(),
                reason: "Projection horizon must be at least 2 years".into(),
            });
        }
        let weights = [
            self.blend.dcf,
            self.blend.relative,
            self.blend.monte_carlo,
        ];
        if weights.iter().any(|w| *w < Decimal::ZERO) {
            return Err(ValuationError::InvalidInput {
                field: "blend".into(),
                reason: "Blend weights cannot be negative".into(),
            });
        }
        if weights.iter().all(|w| w.is_zero()) {
            return Err(ValuationError::InvalidInput {
                field: "blend".into(),
                reason: "At least one blend weight must be positive".into(),
            });
        }
        if self.peers.band_low <= Decimal::ZERO || self.peers.band_low >= self.peers.band_high {
            return Err(ValuationError::InvalidInput {
                field: "peers.band_low / band_high".into(),
                reason: "Market-cap band must satisfy 0 < low < high".into(),
            });
        }
        if self.rules.terminal_growth_floor > self.rules.terminal_growth_cap {
            return Err(ValuationError::InvalidInput {
                field: "rules.terminal_growth_floor".into(),
                reason: "Terminal growth floor exceeds cap".into(),
            });
        }
        if self.rules.growth_floor > self.rules.growth_ceiling {
            return Err(ValuationError::InvalidInput {
                field: "rules.growth_floor".into(),
                reason: "Growth floor exceeds ceiling".into(),
            });
        }
        for (name, sector) in self.sectors.iter() {
            sector.validate(name)?;
        }
        self.default_sector.validate("default_sector")
    }
}

// ---------------------------------------------------------------------------
// Market parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketParameters {
    pub risk_free_rate: Rate,
    pub equity_risk_premium: Rate,
    pub statutory_tax_rate: Rate,
    /// Spread over the risk-free rate for the default cost of debt.
    pub credit_spread: Rate,
}

impl Default for MarketParameters {
    fn default() -> Self {
        MarketParameters {
            risk_free_rate: dec!(0.07),
            equity_risk_premium: dec!(0.055),
            statutory_tax_rate: dec!(0.25),
            credit_spread: dec!(0.025),
        }
    }
}

// ---------------------------------------------------------------------------
// Sector configuration
// ---------------------------------------------------------------------------

/// Relative weights of the four peer multiples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipleWeights {
    pub pe: Decimal,
    pub pb: Decimal,
    pub ev_ebitda: Decimal,
    pub ps: Decimal,
}

impl Default for MultipleWeights {
    fn default() -> Self {
        MultipleWeights {
            pe: dec!(0.35),
            pb: dec!(0.15),
            ev_ebitda: dec!(0.35),
            ps: dec!(0.15),
        }
    }
}

/// Coarse sector facts consumed by the blend-ratio rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorFlags {
    pub financial: bool,
    pub cyclical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorConfig {
    pub terminal_margin_low: Rate,
    pub terminal_margin_high: Rate,
    /// Long-run ROCE the company converges toward.
    pub roce_target: Rate,
    pub reinvestment_rate: Rate,
    pub default_growth: Rate,
    /// Growth rate at the end of the explicit horizon.
    pub terminal_zone_growth: Rate,
    /// Steady-state reinvestment norms used for defaults and high-growth normalization.
    pub capex_norm: Rate,
    pub depreciation_norm: Rate,
    pub nwc_norm: Rate,
    pub debt_ratio: Rate,
    pub beta: Decimal,
    pub multiple_weights: MultipleWeights,
    pub flags: SectorFlags,
}

impl Default for SectorConfig {
    fn default() -> Self {
        SectorConfig {
            terminal_margin_low: dec!(0.12),
            terminal_margin_high: dec!(0.20),
            roce_target: dec!(0.15),
            reinvestment_rate: dec!(0.30),
            default_growth: dec!(0.10),
            terminal_zone_growth: dec!(0.06),
            capex_norm: dec!(0.06),
            depreciation_norm: dec!(0.04),
            nwc_norm: dec!(0.12),
            debt_ratio: dec!(0.20),
            beta: dec!(1.0),
            multiple_weights: MultipleWeights::default(),
            flags: SectorFlags::default(),
        }
    }
}

impl SectorConfig {
    /// Lenders and insurers: book-value driven, EV/EBITDA is meaningless.
    pub fn financials() -> Self {
        SectorConfig {
            terminal_margin_low: dec!(0.25),
            terminal_margin_high: dec!(0.40),
            roce_target: dec!(0.14),
            reinvestment_rate: dec!(0.35),
            capex_norm: dec!(0.02),
            depreciation_norm: dec!(0.015),
            nwc_norm: dec!(0.0),
            debt_ratio: dec!(0.10),
            multiple_weights: MultipleWeights {
                pe: dec!(0.40),
                pb: dec!(0.50),
                ev_ebitda: Decimal::ZERO,
                ps: dec!(0.10),
            },
            flags: SectorFlags {
                financial: true,
                cyclical: false,
            },
            ..SectorConfig::default()
        }
    }

    /// Midpoint of the terminal margin range.
    pub fn margin_target(&self) -> Rate {
        (self.terminal_margin_low + self.terminal_margin_high) / dec!(2)
    }

    fn validate(&self, name: &str) -> IntrinsicResult<()> {
        if self.terminal_margin_low > self.terminal_margin_high {
            return Err(ValuationError::InvalidInput {
                field: format!("sectors.{name}.terminal_margin_low"),
                reason: "Terminal margin range is inverted".into(),
            });
        }
        if self.beta <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: format!("sectors.{name}.beta"),
                reason: "Beta must be positive".into(),
            });
        }
        let w = &self.multiple_weights;
        if w.pe + w.pb + w.ev_ebitda + w.ps <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: format!("sectors.{name}.multiple_weights"),
                reason: "At least one multiple weight must be positive".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Component settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Symmetric growth perturbation applied to BULL/BEAR.
    pub growth_spread: Rate,
    /// Symmetric margin perturbation applied to BULL/BEAR.
    pub margin_spread: Rate,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            growth_spread: dec!(0.02),
            margin_spread: dec!(0.01),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub simulations: u32,
    pub seed: Option<u64>,
    /// Wall-clock budget; the simulation stops early and reports a degraded result.
    pub time_budget_ms: Option<u64>,
    pub growth_low_factor: f64,
    pub growth_high_factor: f64,
    /// Proportional standard deviations (fraction of the base value).
    pub margin_sd_pct: f64,
    pub roce_sd_pct: f64,
    pub beta_sd_pct: f64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            simulations: 2_000,
            seed: None,
            time_budget_ms: Some(5_000),
            growth_low_factor: 0.7,
            growth_high_factor: 1.3,
            margin_sd_pct: 0.10,
            roce_sd_pct: 0.15,
            beta_sd_pct: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub market_cap: Decimal,
    pub roe: Decimal,
    pub debt_to_equity: Decimal,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        SimilarityWeights {
            market_cap: dec!(0.4),
            roe: dec!(0.3),
            debt_to_equity: dec!(0.3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub ttl_days: i64,
    pub top_n: usize,
    pub band_low: Decimal,
    pub band_high: Decimal,
    pub tight_weight: Decimal,
    pub broad_weight: Decimal,
    pub weights: SimilarityWeights,
    /// ROE gap at which the ROE sub-score reaches zero.
    pub roe_scale: Decimal,
    /// D/E gap at which the D/E sub-score reaches zero.
    pub debt_to_equity_scale: Decimal,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            ttl_days: 30,
            top_n: 10,
            band_low: dec!(0.3),
            band_high: dec!(3.0),
            tight_weight: dec!(2),
            broad_weight: Decimal::ONE,
            weights: SimilarityWeights::default(),
            roe_scale: dec!(0.20),
            debt_to_equity_scale: dec!(1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeightsConfig {
    pub dcf: Decimal,
    pub relative: Decimal,
    pub monte_carlo: Decimal,
}

impl Default for BlendWeightsConfig {
    fn default() -> Self {
        BlendWeightsConfig {
            dcf: dec!(0.60),
            relative: dec!(0.30),
            monte_carlo: dec!(0.10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub base: Decimal,
    pub per_method_bonus: Decimal,
    /// CV below which surviving methods count as tightly agreeing.
    pub tight_agreement_cv: Decimal,
    pub tight_agreement_bonus: Decimal,
    pub loose_agreement_cv: Decimal,
    pub loose_agreement_bonus: Decimal,
    pub low_dispersion_cv: Decimal,
    pub low_dispersion_bonus: Decimal,
    pub warning_penalty: Decimal,
    pub floor: Decimal,
    pub ceiling: Decimal,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        ConfidenceConfig {
            base: dec!(0.70),
            per_method_bonus: dec!(0.05),
            tight_agreement_cv: dec!(0.15),
            tight_agreement_bonus: dec!(0.10),
            loose_agreement_cv: dec!(0.30),
            loose_agreement_bonus: dec!(0.05),
            low_dispersion_cv: dec!(0.25),
            low_dispersion_bonus: dec!(0.05),
            warning_penalty: dec!(0.05),
            floor: dec!(0.10),
            ceiling: dec!(1.00),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub price_max_age_days: i64,
    /// Latest annual period may lag the valuation year by at most this many years.
    pub financials_max_age_years: i32,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        StalenessConfig {
            price_max_age_days: 7,
            financials_max_age_years: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Half-width of the WACC sweep around the base WACC.
    pub wacc_half_width: Rate,
    pub wacc_step: Rate,
    /// Terminal growth sweep (absolute bounds).
    pub growth_min: Rate,
    pub growth_max: Rate,
    pub growth_step: Rate,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        SensitivityConfig {
            wacc_half_width: dec!(0.02),
            wacc_step: dec!(0.01),
            growth_min: dec!(0.02),
            growth_max: dec!(0.05),
            growth_step: dec!(0.01),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy rules table
// ---------------------------------------------------------------------------

/// Historical/convergence weight pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub historical: Decimal,
    pub convergence: Decimal,
}

impl BlendWeights {
    pub const fn new(historical: Decimal, convergence: Decimal) -> Self {
        BlendWeights {
            historical,
            convergence,
        }
    }
}

/// A segment-specific override, e.g. high-quality lenders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRule {
    pub name: String,
    #[serde(default)]
    pub financial_only: bool,
    #[serde(default)]
    pub min_roe: Option<Rate>,
    #[serde(default)]
    pub max_npa: Option<Rate>,
    pub weights: BlendWeights,
}

/// Volatility/trend bands for the historical vs convergence blend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendRuleTable {
    pub low_volatility: Decimal,
    pub high_volatility: Decimal,
    /// Per-period slope at or below which the series counts as declining.
    pub declining_slope: Decimal,
    pub stable: BlendWeights,
    pub moderate: BlendWeights,
    pub volatile: BlendWeights,
    pub declining: BlendWeights,
    /// Fewer than two observations.
    pub sparse: BlendWeights,
    pub cyclical_cap: Decimal,
    pub segments: Vec<SegmentRule>,
}

impl Default for BlendRuleTable {
    fn default() -> Self {
        BlendRuleTable {
            low_volatility: dec!(0.02),
            high_volatility: dec!(0.06),
            declining_slope: dec!(-0.01),
            stable: BlendWeights::new(dec!(0.80), dec!(0.20)),
            moderate: BlendWeights::new(dec!(0.60), dec!(0.40)),
            volatile: BlendWeights::new(dec!(0.40), dec!(0.60)),
            declining: BlendWeights::new(dec!(0.50), dec!(0.50)),
            sparse: BlendWeights::new(dec!(0.50), dec!(0.50)),
            cyclical_cap: dec!(0.60),
            segments: vec![SegmentRule {
                name: "quality_lender".into(),
                financial_only: true,
                min_roe: Some(dec!(0.15)),
                max_npa: Some(dec!(0.02)),
                weights: BlendWeights::new(dec!(0.90), dec!(0.10)),
            }],
        }
    }
}

/// Sanity bounds for peer multiples; values outside are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipleBounds {
    pub pe_max: Decimal,
    pub pb_max: Decimal,
    pub ev_ebitda_max: Decimal,
    pub ps_max: Decimal,
}

impl Default for MultipleBounds {
    fn default() -> Self {
        MultipleBounds {
            pe_max: dec!(100),
            pb_max: dec!(20),
            ev_ebitda_max: dec!(60),
            ps_max: dec!(30),
        }
    }
}

/// Caps and slopes for the relative-valuation quality adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityRules {
    pub roce_sensitivity: Decimal,
    pub roce_cap: Decimal,
    pub growth_sensitivity: Decimal,
    pub growth_cap: Decimal,
    /// (pledge threshold, discount) pairs, checked from the highest threshold down.
    pub pledge_discounts: Vec<(Rate, Rate)>,
    pub low_leverage_de: Decimal,
    pub low_leverage_premium: Decimal,
    pub high_leverage_de: Decimal,
    pub high_leverage_discount: Decimal,
    pub leverage_cap: Decimal,
    pub total_cap: Decimal,
}

impl Default for QualityRules {
    fn default() -> Self {
        QualityRules {
            roce_sensitivity: dec!(1.0),
            roce_cap: dec!(0.15),
            growth_sensitivity: dec!(0.5),
            growth_cap: dec!(0.10),
            pledge_discounts: vec![
                (dec!(0.50), dec!(0.15)),
                (dec!(0.25), dec!(0.08)),
                (dec!(0.10), dec!(0.03)),
            ],
            low_leverage_de: dec!(0.3),
            low_leverage_premium: dec!(0.03),
            high_leverage_de: dec!(1.5),
            high_leverage_discount: dec!(0.05),
            leverage_cap: dec!(0.05),
            total_cap: dec!(0.30),
        }
    }
}

/// Named, overridable thresholds used by the data processor and engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRules {
    pub high_growth_cagr: Rate,
    pub high_growth_yoy: Rate,
    pub trend_decline_threshold: Rate,
    pub trend_recent_weight: Decimal,
    pub tax_anomaly_threshold: Rate,
    pub depreciation_anomaly_threshold: Rate,
    pub cross_check_weight: Decimal,
    pub roce_divergence_threshold: Decimal,
    /// Weight of the 3-year CAGR against the latest YoY in starting growth.
    pub cagr_weight: Decimal,
    pub growth_floor: Rate,
    pub growth_ceiling: Rate,
    pub terminal_growth_floor: Rate,
    pub terminal_growth_cap: Rate,
    pub margin_drift_cap: Rate,
    pub reinvestment_floor: Rate,
    pub reinvestment_ceiling: Rate,
    pub tax_rate_ceiling: Rate,
    pub cost_of_debt_ceiling: Rate,
    pub nwc_floor: Rate,
    pub nwc_ceiling: Rate,
    /// Terminal value share of firm value above which a warning is raised.
    pub terminal_value_warning_share: Decimal,
    pub blend_bands: BlendRuleTable,
    pub multiple_bounds: MultipleBounds,
    pub quality: QualityRules,
}

impl Default for PolicyRules {
    fn default() -> Self {
        PolicyRules {
            high_growth_cagr: dec!(0.20),
            high_growth_yoy: dec!(0.50),
            trend_decline_threshold: dec!(0.25),
            trend_recent_weight: dec!(0.65),
            tax_anomaly_threshold: dec!(0.30),
            depreciation_anomaly_threshold: dec!(0.15),
            cross_check_weight: dec!(0.5),
            roce_divergence_threshold: dec!(0.50),
            cagr_weight: dec!(0.6),
            growth_floor: dec!(0.03),
            growth_ceiling: dec!(0.30),
            terminal_growth_floor: dec!(0.02),
            terminal_growth_cap: dec!(0.05),
            margin_drift_cap: dec!(0.03),
            reinvestment_floor: dec!(0.05),
            reinvestment_ceiling: dec!(0.90),
            tax_rate_ceiling: dec!(0.50),
            cost_of_debt_ceiling: dec!(0.25),
            nwc_floor: dec!(-0.10),
            nwc_ceiling: dec!(0.50),
            terminal_value_warning_share: dec!(0.75),
            blend_bands: BlendRuleTable::default(),
            multiple_bounds: MultipleBounds::default(),
            quality: QualityRules::default(),
        }
    }
}
