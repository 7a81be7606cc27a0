use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::inputs::DcfInputs;
use crate::error::ValuationError;
use crate::types::Rate;
use crate::IntrinsicResult;

/// Capital-structure and CAPM parameters for one discount-rate calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaccInput {
    pub risk_free_rate: Rate,
    pub equity_risk_premium: Rate,
    /// Levered beta of equity
    pub beta: Decimal,
    /// Pre-tax cost of debt
    pub cost_of_debt: Rate,
    pub tax_rate: Rate,
    /// D / V; equity weight is the complement.
    pub debt_ratio: Rate,
    /// Company-specific risk premium added to Ke.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specific_risk_premium: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaccOutput {
    pub wacc: Rate,
    pub cost_of_equity: Rate,
    pub after_tax_cost_of_debt: Rate,
    pub equity_weight: Rate,
    pub debt_weight: Rate,
    /// Set when the rate came from an override instead of CAPM.
    pub overridden: bool,
}

impl WaccInput {
    pub fn from_inputs(inputs: &DcfInputs) -> Self {
        WaccInput {
            risk_free_rate: inputs.risk_free_rate.value,
            equity_risk_premium: inputs.equity_risk_premium.value,
            beta: inputs.beta.value,
            cost_of_debt: inputs.cost_of_debt.value,
            tax_rate: inputs.tax_rate.value,
            debt_ratio: inputs.debt_ratio.value,
            specific_risk_premium: inputs.company_alpha.as_ref().map(|a| a.value),
        }
    }
}

/// WACC = Ke * (1 - D/V) + Kd * (1 - t) * D/V, with Ke = Rf + beta * ERP (+ alpha).
pub fn calculate_wacc(input: &WaccInput, warnings: &mut Vec<String>) -> IntrinsicResult<WaccOutput> {
    validate_wacc_input(input)?;

    let cost_of_equity = input.risk_free_rate
        + input.beta * input.equity_risk_premium
        + input.specific_risk_premium.unwrap_or(Decimal::ZERO);
    let after_tax_cost_of_debt = input.cost_of_debt * (Decimal::ONE - input.tax_rate);
    let debt_weight = input.debt_ratio;
    let equity_weight = Decimal::ONE - debt_weight;
    let wacc = cost_of_equity * equity_weight + after_tax_cost_of_debt * debt_weight;

    if input.beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({}): betas above 3.0 are unusual",
            input.beta
        ));
    }
    if wacc > dec!(0.20) {
        warnings.push(format!("WACC of {wacc} exceeds 20%"));
    }
    if wacc <= Decimal::ZERO {
        return Err(ValuationError::invalid_parameter(
            "wacc",
            format!("WACC must be positive, got {wacc}"),
        ));
    }

    Ok(WaccOutput {
        wacc,
        cost_of_equity,
        after_tax_cost_of_debt,
        equity_weight,
        debt_weight,
        overridden: false,
    })
}

/// Use `wacc_override` when present, otherwise CAPM from the inputs.
pub fn resolve_wacc(inputs: &DcfInputs, warnings: &mut Vec<String>) -> IntrinsicResult<WaccOutput> {
    let capm = WaccInput::from_inputs(inputs);
    match &inputs.wacc_override {
        Some(rate) => {
            if rate.value <= Decimal::ZERO {
                return Err(ValuationError::invalid_parameter(
                    "wacc_override",
                    "WACC override must be positive",
                ));
            }
            let cost_of_equity = capm.risk_free_rate
                + capm.beta * capm.equity_risk_premium
                + capm.specific_risk_premium.unwrap_or(Decimal::ZERO);
            Ok(WaccOutput {
                wacc: rate.value,
                cost_of_equity,
                after_tax_cost_of_debt: capm.cost_of_debt * (Decimal::ONE - capm.tax_rate),
                equity_weight: Decimal::ONE - capm.debt_ratio,
                debt_weight: capm.debt_ratio,
                overridden: true,
            })
        }
        None => calculate_wacc(&capm, warnings),
    }
}

fn validate_wacc_input(input: &WaccInput) -> IntrinsicResult<()> {
    if input.risk_free_rate < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Risk-free rate cannot be negative".into(),
        });
    }
    if input.equity_risk_premium < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "equity_risk_premium".into(),
            reason: "Equity risk premium cannot be negative".into(),
        });
    }
    if input.beta <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "beta".into(),
            reason: "Beta must be positive".into(),
        });
    }
    if input.cost_of_debt < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "cost_of_debt".into(),
            reason: "Cost of debt cannot be negative".into(),
        });
    }
    if input.debt_ratio < Decimal::ZERO || input.debt_ratio >= Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "debt_ratio".into(),
            reason: "Debt ratio must be in [0, 1)".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> WaccInput {
        WaccInput {
            risk_free_rate: dec!(0.07),
            equity_risk_premium: dec!(0.05),
            beta: dec!(1.0),
            cost_of_debt: dec!(0.10),
            tax_rate: dec!(0.25),
            debt_ratio: Decimal::ZERO,
            specific_risk_premium: None,
        }
    }

    #[test]
    fn test_all_equity_wacc_is_cost_of_equity() {
        let mut w = Vec::new();
        let out = calculate_wacc(&input(), &mut w).unwrap();
        assert_eq!(out.wacc, dec!(0.12));
        assert_eq!(out.equity_weight, Decimal::ONE);
    }

    #[test]
    fn test_debt_weighting() {
        let mut w = Vec::new();
        let out = calculate_wacc(
            &WaccInput {
                debt_ratio: dec!(0.40),
                ..input()
            },
            &mut w,
        )
        .unwrap();
        // 0.12 * 0.6 + 0.075 * 0.4
        assert_eq!(out.wacc, dec!(0.102));
        assert_eq!(out.after_tax_cost_of_debt, dec!(0.075));
    }

    #[test]
    fn test_alpha_raises_cost_of_equity() {
        let mut w = Vec::new();
        let out = calculate_wacc(
            &WaccInput {
                specific_risk_premium: Some(dec!(0.02)),
                ..input()
            },
            &mut w,
        )
        .unwrap();
        assert_eq!(out.cost_of_equity, dec!(0.14));
    }

    #[test]
    fn test_negative_beta_rejected() {
        let mut w = Vec::new();
        assert!(calculate_wacc(
            &WaccInput {
                beta: dec!(-0.5),
                ..input()
            },
            &mut w
        )
        .is_err());
    }
}
