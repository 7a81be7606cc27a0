use intrinsic_core::dcf::{DcfEngine, DcfInputs, SweepRange};
use intrinsic_core::scenarios::{OutlookAdjustment, ScenarioBuilder, ScenarioKind};
use intrinsic_core::types::{Provenance, Tagged};
use intrinsic_core::{EngineConfig, ValuationError};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Revenue 1000, five years of 10% down to 6% growth, 15% margin, all-equity
/// funded at Rf 7% + ERP 5%.
fn reference_inputs() -> DcfInputs {
    let json = r#"{
        "base_revenue": 1000,
        "revenue_growth": [0.10, 0.09, 0.08, 0.07, 0.06],
        "ebitda_margin": 0.15,
        "capex_to_sales": 0.08,
        "depreciation_to_sales": 0.04,
        "nwc_to_sales": 0.15,
        "tax_rate": 0.25,
        "risk_free_rate": 0.07,
        "equity_risk_premium": 0.05,
        "beta": 1.0,
        "cost_of_debt": 0.09,
        "debt_ratio": 0,
        "terminal_roce": 0.15,
        "terminal_reinvestment": 0.30,
        "shares_outstanding": 100
    }"#;
    serde_json::from_str(json).unwrap()
}

// ===========================================================================
// DCF
// ===========================================================================

#[test]
fn test_reference_company_is_deterministic() {
    let engine = DcfEngine::default();
    let inputs = reference_inputs();
    let first = engine.calculate_intrinsic_value(&inputs).unwrap();
    let second = engine.calculate_intrinsic_value(&inputs).unwrap();
    assert_eq!(first.result, second.result);
    assert!(first.result.intrinsic_per_share > Decimal::ZERO);
    assert_eq!(first.metadata.precision, "rust_decimal_128bit");
}

#[test]
fn test_reference_company_terminal_value() {
    let engine = DcfEngine::default();
    let mut warnings = Vec::new();
    let v = engine.value(&reference_inputs(), &mut warnings).unwrap();

    // Ke = 7% + 1.0 * 5%, no debt
    assert_eq!(v.wacc.wacc, dec!(0.12));
    // g = ROCE 15% x reinvestment 30%
    assert_eq!(v.terminal_growth, dec!(0.045));
    assert_eq!(v.terminal_value, v.terminal_fcff / (dec!(0.12) - dec!(0.045)));
    assert_eq!(v.firm_value, v.pv_explicit + v.pv_terminal_value);
    assert_eq!(v.intrinsic_per_share, v.equity_value / dec!(100));
    assert_eq!(v.projections.len(), 5);
    assert_eq!(v.projections[0].revenue, dec!(1100));
}

#[test]
fn test_wacc_below_terminal_growth_rejected() {
    let engine = DcfEngine::default();
    let mut inputs = reference_inputs();
    inputs.wacc_override = Some(Tagged::actual(dec!(0.03), "reviewer"));
    let err = engine.calculate_intrinsic_value(&inputs).unwrap_err();
    match err {
        ValuationError::InvalidParameter { field, .. } => assert_eq!(field, "wacc"),
        other => panic!("Expected InvalidParameter, got {other:?}"),
    }
}

#[test]
fn test_bare_json_inputs_are_tagged_default() {
    let inputs = reference_inputs();
    assert_eq!(inputs.base_revenue.provenance, Provenance::Default);
    assert_eq!(inputs.revenue_growth.provenance, Provenance::Default);
    assert!(inputs
        .scalar_fields()
        .iter()
        .all(|(_, t)| t.provenance == Provenance::Default));
}

#[test]
fn test_tagged_json_inputs_keep_provenance() {
    let mut value = serde_json::to_value(reference_inputs()).unwrap();
    value["beta"] = serde_json::json!({
        "value": "1.2",
        "provenance": "ACTUAL",
        "source": "regression vs index"
    });
    let inputs: DcfInputs = serde_json::from_value(value).unwrap();
    assert_eq!(inputs.beta.value, dec!(1.2));
    assert_eq!(inputs.beta.provenance, Provenance::Actual);
    assert_eq!(inputs.beta.source, "regression vs index");
}

#[test]
fn test_sensitivity_value_falls_as_wacc_rises() {
    let engine = DcfEngine::default();
    let grid = engine
        .sensitivity_analysis(
            &reference_inputs(),
            &SweepRange::new(dec!(0.10), dec!(0.14), dec!(0.01)),
            &SweepRange::new(dec!(0.02), dec!(0.05), dec!(0.01)),
        )
        .unwrap()
        .result;
    assert_eq!(grid.wacc_values.len(), 5);
    assert_eq!(grid.growth_values.len(), 4);
    assert_eq!(grid.undefined_cells, 0);
    for col in 0..grid.growth_values.len() {
        for row in 1..grid.wacc_values.len() {
            let lower = grid.matrix[row - 1][col].unwrap();
            let higher = grid.matrix[row][col].unwrap();
            assert!(higher < lower, "value must fall as WACC rises");
        }
    }
}

#[test]
fn test_sensitivity_marks_undefined_cells() {
    let engine = DcfEngine::default();
    let grid = engine
        .sensitivity_analysis(
            &reference_inputs(),
            &SweepRange::new(dec!(0.03), dec!(0.05), dec!(0.01)),
            &SweepRange::new(dec!(0.03), dec!(0.05), dec!(0.01)),
        )
        .unwrap();
    // WACC <= g on the diagonal and below it
    assert_eq!(grid.result.undefined_cells, 6);
    assert!(grid.result.matrix[0][0].is_none());
    assert!(grid.result.matrix[2][0].is_some());
    assert!(!grid.warnings.is_empty());
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn test_scenarios_are_ordered() {
    let config = EngineConfig::default();
    let engine = DcfEngine::from_config(&config);
    let builder = ScenarioBuilder::from_config(&config);
    let set = builder.build(&reference_inputs(), &OutlookAdjustment::default());
    let values = builder.value_scenarios(&engine, &set).unwrap();

    let bull = values.bull.as_ref().unwrap().intrinsic_per_share;
    let bear = values.bear.as_ref().unwrap().intrinsic_per_share;
    let base = values.base.intrinsic_per_share;
    assert!(bull > base && base > bear);
    assert!(values.rejected.is_empty());
}

#[test]
fn test_positive_outlook_lifts_base_scenario() {
    let config = EngineConfig::default();
    let engine = DcfEngine::from_config(&config);
    let builder = ScenarioBuilder::from_config(&config);
    let neutral = builder.build(&reference_inputs(), &OutlookAdjustment::default());
    let upbeat = builder.build(
        &reference_inputs(),
        &OutlookAdjustment {
            growth_adjustment: dec!(0.01),
            margin_adjustment: dec!(0.005),
            ..Default::default()
        },
    );
    let neutral_base = builder.value_scenarios(&engine, &neutral).unwrap().base;
    let upbeat_base = builder.value_scenarios(&engine, &upbeat).unwrap().base;
    assert!(upbeat_base.intrinsic_per_share > neutral_base.intrinsic_per_share);
    assert_eq!(upbeat.get(ScenarioKind::Base).ebitda_margin.value, dec!(0.155));
}
