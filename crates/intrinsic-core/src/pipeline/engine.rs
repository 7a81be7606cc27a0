use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::result::{MethodAvailability, McSummary, ScenarioSummary, ValuationRequest, ValuationResult};
use crate::blend::{BlendOutcome, ValuationBlender};
use crate::config::{EngineConfig, SectorConfig};
use crate::dcf::{DcfEngine, DcfInputs, SensitivityGrid};
use crate::financials::probes::roce_series;
use crate::financials::{CompanyData, FinancialDataProcessor};
use crate::peers::{InMemoryPeerCache, PeerCache, PeerGroup, PeerSelector, PeerUniverse, SubjectMetrics};
use crate::relative::{CompanyMetrics, PeerMultipleSample, QualityInputs, RelativeValuation, RelativeValuationEngine};
use crate::scenarios::{ScenarioBuilder, ScenarioKind, ScenarioSet};
use crate::types::{AuditTrail, Money, Warning, WarningKind};
use crate::IntrinsicResult;

const STAGE: &str = "pipeline";

/// Runs every component for one company and assembles a [`ValuationResult`].
///
/// Holds no per-company state; the peer cache is the only shared piece and
/// may be shared across threads and engines.
#[derive(Clone)]
pub struct ValuationEngine {
    config: EngineConfig,
    cache: Arc<dyn PeerCache>,
}

impl ValuationEngine {
    pub fn new(config: EngineConfig) -> IntrinsicResult<Self> {
        Self::with_cache(config, Arc::new(InMemoryPeerCache::new()))
    }

    pub fn with_cache(config: EngineConfig, cache: Arc<dyn PeerCache>) -> IntrinsicResult<Self> {
        config.validate()?;
        Ok(ValuationEngine { config, cache })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn PeerCache> {
        &self.cache
    }

    pub fn peer_selector<'a>(&'a self, universe: &'a dyn PeerUniverse) -> PeerSelector<'a> {
        PeerSelector::new(self.cache.as_ref(), universe, &self.config.peers)
    }

    /// Value one company. Fails only when no BASE scenario can be computed or
    /// every valuation method drops out of the blend.
    ///
    /// The DCF leg of the blend is the BASE per-share value only; BULL and
    /// BEAR are reported alongside it and never weighted into the blend.
    pub fn value(&self, request: &ValuationRequest, universe: &dyn PeerUniverse) -> IntrinsicResult<ValuationResult> {
        let company = &request.company;
        let profile = &company.profile;
        let sector = self.config.sector(&profile.sector);
        let valuation_date = request.valuation_date.unwrap_or_else(|| Utc::now().date_naive());

        // --- Inputs ---
        let processed = FinancialDataProcessor::new(&self.config)
            .with_valuation_date(valuation_date)
            .build_inputs(company, sector, &request.overrides)?;
        let mut warnings = processed.warnings;
        let mut trail = processed.trail;
        let base_inputs = processed.inputs;

        // --- Scenarios ---
        let dcf = DcfEngine::from_config(&self.config);
        let builder = ScenarioBuilder::from_config(&self.config);
        let set = builder.build(&base_inputs, &request.outlook);
        let scenario_values = builder.value_scenarios(&dcf, &set)?;
        for (kind, reason) in &scenario_values.rejected {
            warnings.push(Warning::new(
                WarningKind::ScenarioRejected,
                "dcf",
                format!("{kind} scenario rejected: {reason}"),
            ));
        }
        for msg in &scenario_values.warnings {
            warnings.push(Warning::new(WarningKind::Model, "dcf", msg.clone()));
        }
        let mut scenarios = vec![ScenarioSummary::from_valuation(ScenarioKind::Base, &scenario_values.base)];
        if let Some(v) = &scenario_values.bull {
            scenarios.push(ScenarioSummary::from_valuation(ScenarioKind::Bull, v));
        }
        if let Some(v) = &scenario_values.bear {
            scenarios.push(ScenarioSummary::from_valuation(ScenarioKind::Bear, v));
        }
        for s in &scenarios {
            trail.record(
                "dcf",
                &format!("{}_per_share", s.kind.to_string().to_lowercase()),
                s.intrinsic_per_share.round_dp(4),
                None,
                format!("WACC {} g {}", s.wacc.round_dp(4), s.terminal_growth),
            );
        }
        let dcf_value = scenario_values.base.intrinsic_per_share;

        let sensitivity = self.sensitivity(&dcf, &set, &mut warnings);

        // --- Relative ---
        let (peer_group, relative) = self.relative(
            company,
            sector,
            &base_inputs,
            processed.diagnostics.revenue_cagr,
            universe,
            &mut warnings,
        );
        let relative_value = relative.as_ref().and_then(|r| r.relative_value_per_share);
        if let Some(v) = relative_value {
            trail.record("relative", "relative_per_share", v.round_dp(4), None, "peer multiples");
        }

        // --- Monte Carlo ---
        let market_price = company.market.as_ref().and_then(|m| m.price);
        let monte_carlo = self.monte_carlo(&dcf, &set, market_price, &mut warnings);
        let mc_median = monte_carlo
            .as_ref()
            .and_then(|m| Decimal::try_from(m.median).ok());
        let mc_cv = monte_carlo
            .as_ref()
            .and_then(|m| m.coefficient_of_variation)
            .and_then(|cv| Decimal::try_from(cv).ok());

        // --- Blend ---
        let blender = ValuationBlender::from_config(&self.config);
        let blend = blender.blend(Some(dcf_value), relative_value, mc_median)?;
        for c in blend
            .contributions
            .iter()
            .filter(|c| matches!(c.value, Some(v) if v <= Decimal::ZERO))
        {
            warnings.push(Warning::new(
                WarningKind::MethodUnavailable,
                "blend",
                format!("{} value is not positive and was excluded", c.method),
            ));
        }
        let quality_warnings = warnings.iter().filter(|w| w.affects_data_quality()).count();
        let confidence = blender.calculate_confidence(&blend, mc_cv, quality_warnings);
        record_blend(&mut trail, &blend, confidence.score);

        let availability = MethodAvailability {
            dcf: dcf_value > Decimal::ZERO,
            relative: relative_value.is_some(),
            monte_carlo: monte_carlo.is_some(),
        };
        let upside = market_price
            .filter(|p| *p > Decimal::ZERO)
            .map(|p| blend.blended_value / p - Decimal::ONE);

        info!(
            symbol = %profile.symbol,
            blended = %blend.blended_value.round_dp(2),
            confidence = %confidence.score.round_dp(2),
            warnings = warnings.len(),
            "valuation complete"
        );

        Ok(ValuationResult {
            symbol: profile.symbol.clone(),
            name: profile.name.clone(),
            valuation_date,
            valued_at: Utc::now(),
            blended_value: blend.blended_value,
            market_price,
            upside,
            confidence,
            blend,
            availability,
            scenarios,
            base_dcf: scenario_values.base,
            relative,
            monte_carlo,
            sensitivity,
            peer_group,
            inputs: base_inputs,
            diagnostics: processed.diagnostics,
            warnings,
            trail,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

impl ValuationEngine {
    fn sensitivity(&self, dcf: &DcfEngine, set: &ScenarioSet, warnings: &mut Vec<Warning>) -> Option<SensitivityGrid> {
        match dcf.default_sensitivity(&set.base, &self.config.sensitivity) {
            Ok(out) => Some(out.result),
            Err(e) => {
                warn!(error = %e, "sensitivity grid unavailable");
                warnings.push(Warning::new(
                    WarningKind::Model,
                    "sensitivity",
                    format!("Sensitivity grid unavailable: {e}"),
                ));
                None
            }
        }
    }

    fn relative(
        &self,
        company: &CompanyData,
        sector: &SectorConfig,
        inputs: &DcfInputs,
        revenue_cagr: Option<Decimal>,
        universe: &dyn PeerUniverse,
        warnings: &mut Vec<Warning>,
    ) -> (Option<PeerGroup>, Option<RelativeValuation>) {
        let subject = subject_metrics(company, inputs.shares_outstanding.value);
        let group = self.peer_selector(universe).build_peer_group(&subject);
        if group.is_empty() {
            warnings.push(Warning::new(
                WarningKind::MethodUnavailable,
                "relative",
                "No peers found; relative valuation skipped",
            ));
            return (Some(group), None);
        }

        let samples = PeerMultipleSample::from_group(&group, &self.config.peers, |s| universe.lookup(s));
        let metrics = CompanyMetrics::from_financials(&company.financials, inputs.shares_outstanding.value);
        let quality = QualityInputs {
            roce: roce_series(&company.financials).last().copied(),
            growth: revenue_cagr,
            promoter_pledge: company.profile.promoter_pledge,
            debt_to_equity: subject.debt_to_equity,
        };
        let out = RelativeValuationEngine::from_config(&self.config)
            .calculate_relative_value(&metrics, &samples, sector, &quality);
        for msg in &out.warnings {
            warnings.push(Warning::new(WarningKind::Model, "relative", msg.clone()));
        }
        if let Some(err) = &out.result.error {
            warnings.push(Warning::new(
                WarningKind::MethodUnavailable,
                "relative",
                err.clone(),
            ));
        }
        (Some(group), Some(out.result))
    }

    #[cfg(feature = "monte_carlo")]
    fn monte_carlo(
        &self,
        dcf: &DcfEngine,
        set: &ScenarioSet,
        cmp: Option<Money>,
        warnings: &mut Vec<Warning>,
    ) -> Option<McSummary> {
        let sim = crate::monte_carlo::MonteCarloSimulator::from_config(&self.config);
        match sim.run_simulation(dcf, &set.base, cmp) {
            Ok(out) => {
                for msg in &out.warnings {
                    warnings.push(Warning::new(WarningKind::Model, "monte_carlo", msg.clone()));
                }
                Some(McSummary::from(&out.result))
            }
            Err(e) => {
                warn!(error = %e, "monte carlo unavailable");
                warnings.push(Warning::new(
                    WarningKind::MethodUnavailable,
                    "monte_carlo",
                    e.to_string(),
                ));
                None
            }
        }
    }

    #[cfg(not(feature = "monte_carlo"))]
    fn monte_carlo(
        &self,
        _dcf: &DcfEngine,
        _set: &ScenarioSet,
        _cmp: Option<Money>,
        warnings: &mut Vec<Warning>,
    ) -> Option<McSummary> {
        warnings.push(Warning::new(
            WarningKind::MethodUnavailable,
            "monte_carlo",
            "Built without the monte_carlo feature",
        ));
        None
    }
}

/// Classification and size metrics used for peer similarity.
pub fn subject_metrics(company: &CompanyData, shares: Decimal) -> SubjectMetrics {
    let latest = company.financials.latest_annual().map(|(_, p)| p);
    let net_worth = latest.and_then(|p| p.net_worth).filter(|nw| *nw > Decimal::ZERO);
    let market_cap = company.market.as_ref().and_then(|m| {
        m.market_cap
            .or_else(|| m.price.map(|p| p * m.shares_outstanding.unwrap_or(shares)))
    });
    SubjectMetrics {
        symbol: company.profile.symbol.clone(),
        sector: company.profile.sector.clone(),
        industry: company.profile.industry.clone(),
        market_cap,
        roe: net_worth.and_then(|nw| latest.and_then(|p| p.net_profit).map(|np| np / nw)),
        debt_to_equity: net_worth.map(|nw| latest.and_then(|p| p.total_debt).unwrap_or(Decimal::ZERO) / nw),
    }
}

fn record_blend(trail: &mut AuditTrail, blend: &BlendOutcome, confidence: Decimal) {
    for c in &blend.contributions {
        trail.record(
            STAGE,
            &format!("weight_{}", c.method.to_string().to_lowercase().replace(' ', "_")),
            c.weight.round_dp(6),
            None,
            if c.included { "included" } else { "excluded" },
        );
    }
    trail.record(STAGE, "blended_value", blend.blended_value.round_dp(4), None, "weighted blend");
    trail.record(STAGE, "confidence", confidence.round_dp(4), None, "clipped score");
}
