use chrono::NaiveDate;
use intrinsic_core::blend::ValuationMethod;
use intrinsic_core::financials::{
    CompanyData, CompanyFinancials, CompanyProfile, FinancialPeriod, InputOverrides, MarketSnapshot,
};
use intrinsic_core::peers::{PeerCandidate, PeerMultiples, StaticPeerUniverse};
use intrinsic_core::pipeline::{ValuationEngine, ValuationRequest};
use intrinsic_core::scenarios::{OutlookAdjustment, ScenarioKind};
use intrinsic_core::types::{Provenance, WarningKind};
use intrinsic_core::{EngineConfig, ValuationError};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn period(revenue: Decimal) -> FinancialPeriod {
    FinancialPeriod {
        revenue: Some(revenue),
        ebitda: Some(revenue * dec!(0.18)),
        ebit: Some(revenue * dec!(0.14)),
        depreciation: Some(revenue * dec!(0.04)),
        profit_before_tax: Some(revenue * dec!(0.12)),
        tax_expense: Some(revenue * dec!(0.03)),
        net_profit: Some(revenue * dec!(0.09)),
        capex: Some(revenue * dec!(0.07)),
        inventory: Some(revenue * dec!(0.10)),
        receivables: Some(revenue * dec!(0.08)),
        payables: Some(revenue * dec!(0.06)),
        total_debt: Some(dec!(200)),
        cash: Some(dec!(50)),
        net_worth: Some(dec!(800)),
        capital_employed: Some(dec!(1000)),
        shares_outstanding: Some(dec!(100)),
        ..Default::default()
    }
}

fn machinery_company() -> CompanyData {
    let mut financials = CompanyFinancials::default();
    for (year, revenue) in [
        (2021, dec!(1000)),
        (2022, dec!(1080)),
        (2023, dec!(1166)),
        (2024, dec!(1260)),
    ] {
        financials.annual.insert(year, period(revenue));
    }
    CompanyData {
        profile: CompanyProfile {
            name: "Steady Machines Ltd".into(),
            symbol: "STEADY".into(),
            sector: "Industrials".into(),
            industry: "Machinery".into(),
            ..Default::default()
        },
        financials,
        market: Some(MarketSnapshot {
            price: Some(dec!(12)),
            market_cap: Some(dec!(1200)),
            shares_outstanding: Some(dec!(100)),
            as_of: NaiveDate::from_ymd_opt(2025, 6, 27),
            stale: false,
        }),
    }
}

fn peer(symbol: &str, industry: &str, market_cap: Decimal, pe: Decimal) -> PeerCandidate {
    PeerCandidate {
        symbol: symbol.into(),
        sector: "Industrials".into(),
        industry: industry.into(),
        market_cap: Some(market_cap),
        roe: Some(dec!(0.13)),
        debt_to_equity: Some(dec!(0.3)),
        multiples: PeerMultiples {
            pe: Some(pe),
            pb: Some(dec!(1.6)),
            ev_ebitda: Some(dec!(7)),
            ps: Some(dec!(1.0)),
        },
    }
}

fn universe() -> StaticPeerUniverse {
    StaticPeerUniverse::new(vec![
        peer("MCH1", "Machinery", dec!(1500), dec!(11)),
        peer("MCH2", "Machinery", dec!(900), dec!(10)),
        peer("ELE1", "Electrical", dec!(2000), dec!(12)),
        peer("ELE2", "Electrical", dec!(800), dec!(9)),
    ])
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.monte_carlo.simulations = 300;
    config.monte_carlo.seed = Some(42);
    config.monte_carlo.time_budget_ms = None;
    config
}

fn request(company: CompanyData) -> ValuationRequest {
    ValuationRequest {
        company,
        valuation_date: NaiveDate::from_ymd_opt(2025, 6, 30),
        ..Default::default()
    }
}

// ===========================================================================
// Full pipeline
// ===========================================================================

#[test]
fn test_full_valuation_blends_every_method() {
    let engine = ValuationEngine::new(config()).unwrap();
    let result = engine.value(&request(machinery_company()), &universe()).unwrap();

    assert_eq!(result.symbol, "STEADY");
    assert!(result.blended_value > Decimal::ZERO);
    assert!(result.availability.dcf);
    assert!(result.availability.relative);
    assert!(result.availability.monte_carlo);

    let total: Decimal = result.blend.surviving().map(|c| c.weight).sum();
    assert_eq!(total, Decimal::ONE);
    assert_eq!(result.blend.surviving().count(), 3);

    assert!(result.confidence.score >= dec!(0.10));
    assert!(result.confidence.score <= dec!(1.00));
    assert!(result.upside.is_some());
    assert!(result.sensitivity.is_some());
    assert_eq!(result.peer_group.as_ref().map(|g| g.len()), Some(4));
}

#[test]
fn test_scenarios_bracket_base() {
    let engine = ValuationEngine::new(config()).unwrap();
    let result = engine.value(&request(machinery_company()), &universe()).unwrap();

    let base = result.scenario(ScenarioKind::Base).unwrap().intrinsic_per_share;
    let bull = result.scenario(ScenarioKind::Bull).unwrap().intrinsic_per_share;
    let bear = result.scenario(ScenarioKind::Bear).unwrap().intrinsic_per_share;
    assert!(bull > base);
    assert!(bear < base);
    assert_eq!(base, result.base_dcf.intrinsic_per_share);
}

#[test]
fn test_blend_uses_base_scenario_only() {
    let engine = ValuationEngine::new(config()).unwrap();
    let result = engine.value(&request(machinery_company()), &universe()).unwrap();
    let dcf = result
        .blend
        .contributions
        .iter()
        .find(|c| c.method == ValuationMethod::Dcf)
        .unwrap();
    assert_eq!(dcf.value, Some(result.base_dcf.intrinsic_per_share));
    assert_eq!(
        result.blend.contributions.len(),
        3,
        "one contribution per method, none per scenario"
    );
}

#[test]
fn test_seeded_run_is_reproducible() {
    let engine = ValuationEngine::new(config()).unwrap();
    let req = request(machinery_company());
    let first = engine.value(&req, &universe()).unwrap();
    let second = engine.value(&req, &universe()).unwrap();
    assert_eq!(first.blended_value, second.blended_value);
    assert_eq!(first.monte_carlo, second.monte_carlo);
    assert_eq!(first.confidence, second.confidence);
}

#[test]
fn test_trail_records_resolved_inputs() {
    let engine = ValuationEngine::new(config()).unwrap();
    let result = engine.value(&request(machinery_company()), &universe()).unwrap();
    assert!(result.trail.for_field("blended_value").next().is_some());
    assert!(result.trail.for_field("confidence").next().is_some());
    assert_eq!(result.inputs.base_revenue.value, dec!(1260));
    assert_eq!(result.inputs.base_revenue.provenance, Provenance::Actual);
}

#[test]
fn test_overrides_are_tagged_actual() {
    let engine = ValuationEngine::new(config()).unwrap();
    let mut req = request(machinery_company());
    req.overrides = InputOverrides {
        beta: Some(dec!(1.3)),
        ..Default::default()
    };
    let result = engine.value(&req, &universe()).unwrap();
    assert_eq!(result.inputs.beta.value, dec!(1.3));
    assert_eq!(result.inputs.beta.provenance, Provenance::Actual);
}

#[test]
fn test_outlook_moves_the_blend() {
    let engine = ValuationEngine::new(config()).unwrap();
    let neutral = engine.value(&request(machinery_company()), &universe()).unwrap();
    let mut req = request(machinery_company());
    req.outlook = OutlookAdjustment {
        growth_adjustment: dec!(0.02),
        margin_adjustment: dec!(0.01),
        outlook_label: Some("positive".into()),
        outlook_score: Some(dec!(0.8)),
    };
    let upbeat = engine.value(&req, &universe()).unwrap();
    assert!(upbeat.base_dcf.intrinsic_per_share > neutral.base_dcf.intrinsic_per_share);
}

// ===========================================================================
// Degraded runs
// ===========================================================================

#[test]
fn test_no_peers_renormalizes_over_remaining_methods() {
    let engine = ValuationEngine::new(config()).unwrap();
    let result = engine
        .value(&request(machinery_company()), &StaticPeerUniverse::default())
        .unwrap();

    assert!(!result.availability.relative);
    assert_eq!(result.blend.weight_of(ValuationMethod::Relative), Decimal::ZERO);
    let total: Decimal = result.blend.surviving().map(|c| c.weight).sum();
    assert_eq!(total, Decimal::ONE);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::MethodUnavailable && w.source == "relative"));
}

#[test]
fn test_every_method_unavailable_is_an_error() {
    let mut config = config();
    config.blend.dcf = Decimal::ZERO;
    config.blend.monte_carlo = Decimal::ZERO;
    config.blend.relative = Decimal::ONE;
    let engine = ValuationEngine::new(config).unwrap();
    let err = engine
        .value(&request(machinery_company()), &StaticPeerUniverse::default())
        .unwrap_err();
    assert!(matches!(err, ValuationError::NoSurvivingMethod));
}

#[test]
fn test_no_revenue_is_data_insufficiency() {
    let engine = ValuationEngine::new(config()).unwrap();
    let mut company = machinery_company();
    company.financials = CompanyFinancials::default();
    let err = engine.value(&request(company), &universe()).unwrap_err();
    assert!(matches!(err, ValuationError::DataInsufficiency(_)));
}

#[test]
fn test_stale_price_lowers_confidence() {
    let engine = ValuationEngine::new(config()).unwrap();
    let fresh = engine.value(&request(machinery_company()), &universe()).unwrap();

    let mut company = machinery_company();
    if let Some(m) = company.market.as_mut() {
        m.stale = true;
    }
    let stale = engine.value(&request(company), &universe()).unwrap();
    assert!(stale.warnings.iter().any(|w| w.kind == WarningKind::StaleData));
    assert!(stale.confidence.warning_penalty > fresh.confidence.warning_penalty);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = EngineConfig::default();
    config.projection_years = 1;
    assert!(matches!(
        ValuationEngine::new(config),
        Err(ValuationError::InvalidInput { .. })
    ));
}

#[test]
fn test_result_serializes_to_json() {
    let engine = ValuationEngine::new(config()).unwrap();
    let result = engine.value(&request(machinery_company()), &universe()).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["symbol"], "STEADY");
    assert!(json["blend"]["contributions"].is_array());
}
