use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{AuditTrail, Money, Provenance, Rate, Tagged};
use crate::IntrinsicResult;

/// Normalized, provenance-tagged inputs for one DCF run.
///
/// Every scalar is a [`Tagged`] value; bare numbers in a JSON document are
/// accepted and tagged `DEFAULT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfInputs {
    pub base_revenue: Tagged<Money>,
    /// One growth rate per explicit projection year.
    pub revenue_growth: Tagged<Vec<Rate>>,
    pub ebitda_margin: Tagged<Rate>,
    /// Annual margin change before damping.
    #[serde(default)]
    pub margin_drift: Tagged<Rate>,
    pub capex_to_sales: Tagged<Rate>,
    pub depreciation_to_sales: Tagged<Rate>,
    pub nwc_to_sales: Tagged<Rate>,
    pub tax_rate: Tagged<Rate>,
    pub risk_free_rate: Tagged<Rate>,
    pub equity_risk_premium: Tagged<Rate>,
    pub beta: Tagged<Decimal>,
    pub cost_of_debt: Tagged<Rate>,
    /// Debt / (debt + equity)
    pub debt_ratio: Tagged<Rate>,
    pub terminal_roce: Tagged<Rate>,
    pub terminal_reinvestment: Tagged<Rate>,
    pub shares_outstanding: Tagged<Decimal>,
    /// Interest-bearing debt; cash is added back separately.
    #[serde(default)]
    pub net_debt: Tagged<Money>,
    #[serde(default)]
    pub cash: Tagged<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_alpha: Option<Tagged<Rate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wacc_override: Option<Tagged<Rate>>,
}

impl DcfInputs {
    pub fn horizon(&self) -> usize {
        self.revenue_growth.value.len()
    }

    /// Structural checks that do not depend on the discount rate.
    pub fn validate(&self) -> IntrinsicResult<()> {
        if self.base_revenue.value <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "base_revenue".into(),
                reason: "Base revenue must be positive".into(),
            });
        }
        if self.revenue_growth.value.is_empty() {
            return Err(ValuationError::InvalidInput {
                field: "revenue_growth".into(),
                reason: "At least one projection year is required".into(),
            });
        }
        if self.revenue_growth.value.iter().any(|g| *g <= -Decimal::ONE) {
            return Err(ValuationError::InvalidInput {
                field: "revenue_growth".into(),
                reason: "Growth rates must exceed -100%".into(),
            });
        }
        if self.ebitda_margin.value <= -Decimal::ONE || self.ebitda_margin.value >= Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: "ebitda_margin".into(),
                reason: "EBITDA margin must lie strictly between -100% and 100%".into(),
            });
        }
        if self.tax_rate.value < Decimal::ZERO || self.tax_rate.value >= Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: "tax_rate".into(),
                reason: "Tax rate must be in [0, 1)".into(),
            });
        }
        if self.debt_ratio.value < Decimal::ZERO || self.debt_ratio.value >= Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: "debt_ratio".into(),
                reason: "Debt ratio must be in [0, 1)".into(),
            });
        }
        if self.shares_outstanding.value <= Decimal::ZERO {
            return Err(ValuationError::invalid_parameter(
                "shares_outstanding",
                "Shares outstanding must be positive",
            ));
        }
        Ok(())
    }

    /// Scalar fields by name, in declaration order.
    pub fn scalar_fields(&self) -> Vec<(&'static str, &Tagged<Decimal>)> {
        let mut fields = vec![
            ("base_revenue", &self.base_revenue),
            ("ebitda_margin", &self.ebitda_margin),
            ("margin_drift", &self.margin_drift),
            ("capex_to_sales", &self.capex_to_sales),
            ("depreciation_to_sales", &self.depreciation_to_sales),
            ("nwc_to_sales", &self.nwc_to_sales),
            ("tax_rate", &self.tax_rate),
            ("risk_free_rate", &self.risk_free_rate),
            ("equity_risk_premium", &self.equity_risk_premium),
            ("beta", &self.beta),
            ("cost_of_debt", &self.cost_of_debt),
            ("debt_ratio", &self.debt_ratio),
            ("terminal_roce", &self.terminal_roce),
            ("terminal_reinvestment", &self.terminal_reinvestment),
            ("shares_outstanding", &self.shares_outstanding),
            ("net_debt", &self.net_debt),
            ("cash", &self.cash),
        ];
        if let Some(alpha) = &self.company_alpha {
            fields.push(("company_alpha", alpha));
        }
        if let Some(wacc) = &self.wacc_override {
            fields.push(("wacc_override", wacc));
        }
        fields
    }

    /// Names of inputs still carrying the DEFAULT tag.
    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .scalar_fields()
            .into_iter()
            .filter(|(_, t)| t.provenance == Provenance::Default)
            .map(|(name, _)| name)
            .collect();
        if self.revenue_growth.provenance == Provenance::Default {
            names.push("revenue_growth");
        }
        names
    }

    /// Record every input's value and provenance on `trail`.
    pub fn record(&self, stage: &str, trail: &mut AuditTrail) {
        for (name, tagged) in self.scalar_fields() {
            trail.record_tagged(stage, name, tagged);
        }
        let growth = self
            .revenue_growth
            .value
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        trail.record(
            stage,
            "revenue_growth",
            format!("[{growth}]"),
            Some(self.revenue_growth.provenance),
            self.revenue_growth.source.clone(),
        );
    }
}
