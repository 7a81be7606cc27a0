use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::engine::DcfEngine;
use super::inputs::DcfInputs;
use crate::config::SensitivityConfig;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::IntrinsicResult;

/// Inclusive sweep `min..=max` in `step` increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub min: Rate,
    pub max: Rate,
    pub step: Rate,
}

impl SweepRange {
    pub fn new(min: Rate, max: Rate, step: Rate) -> Self {
        SweepRange { min, max, step }
    }

    /// A range centred on `centre` extending `half_width` either side.
    pub fn around(centre: Rate, half_width: Rate, step: Rate) -> Self {
        SweepRange::new(centre - half_width, centre + half_width, step)
    }

    fn values(&self, name: &str) -> IntrinsicResult<Vec<Decimal>> {
        if self.step <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: format!("{name}.step"),
                reason: "Step must be positive".into(),
            });
        }
        if self.min > self.max {
            return Err(ValuationError::InvalidInput {
                field: name.into(),
                reason: "Min must be <= max".into(),
            });
        }
        let mut values = Vec::new();
        let mut current = self.min;
        while current <= self.max {
            values.push(current);
            current += self.step;
        }
        if let Some(&last) = values.last() {
            if last < self.max {
                values.push(self.max);
            }
        }
        Ok(values)
    }
}

/// Per-share value over WACC (rows) x terminal growth (columns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub wacc_values: Vec<Rate>,
    pub growth_values: Vec<Rate>,
    /// `None` where WACC <= g or the model is otherwise undefined.
    pub matrix: Vec<Vec<Option<Money>>>,
    pub base_wacc: Rate,
    pub base_growth: Rate,
    pub base_position: (usize, usize),
    pub undefined_cells: usize,
}

impl DcfEngine {
    /// Sweep WACC and terminal growth, holding every other input fixed.
    pub fn sensitivity_analysis(
        &self,
        inputs: &DcfInputs,
        wacc_range: &SweepRange,
        growth_range: &SweepRange,
    ) -> IntrinsicResult<ComputationOutput<SensitivityGrid>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        let base = self.value(inputs, &mut warnings)?;
        let wacc_values = wacc_range.values("wacc_range")?;
        let growth_values = growth_range.values("growth_range")?;

        let mut undefined_cells = 0usize;
        let mut matrix = Vec::with_capacity(wacc_values.len());
        for wacc in &wacc_values {
            let mut row = Vec::with_capacity(growth_values.len());
            for g in &growth_values {
                let mut cell_warnings = Vec::new();
                match self.value_with(inputs, Some(*wacc), Some(*g), &mut cell_warnings) {
                    Ok(v) => row.push(Some(v.intrinsic_per_share)),
                    Err(_) => {
                        undefined_cells += 1;
                        row.push(None);
                    }
                }
            }
            matrix.push(row);
        }
        if undefined_cells > 0 {
            warnings.push(format!(
                "{undefined_cells} grid cells undefined (WACC <= terminal growth)"
            ));
        }

        let base_position = (
            closest_index(&wacc_values, base.wacc.wacc),
            closest_index(&growth_values, base.terminal_growth),
        );

        let output = SensitivityGrid {
            wacc_values,
            growth_values,
            matrix,
            base_wacc: base.wacc.wacc,
            base_growth: base.terminal_growth,
            base_position,
            undefined_cells,
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "WACC x terminal growth sensitivity",
            &serde_json::json!({
                "wacc_range": wacc_range,
                "growth_range": growth_range,
            }),
            warnings,
            elapsed,
            output,
        ))
    }

    /// Grid centred on the base WACC using the configured widths.
    pub fn default_sensitivity(
        &self,
        inputs: &DcfInputs,
        config: &SensitivityConfig,
    ) -> IntrinsicResult<ComputationOutput<SensitivityGrid>> {
        let mut scratch = Vec::new();
        let base = self.value(inputs, &mut scratch)?;
        let wacc_range = SweepRange::around(base.wacc.wacc, config.wacc_half_width, config.wacc_step);
        let growth_range = SweepRange::new(config.growth_min, config.growth_max, config.growth_step);
        self.sensitivity_analysis(inputs, &wacc_range, &growth_range)
    }
}

fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inputs() -> DcfInputs {
        serde_json::from_str(
            r#"{
                "base_revenue": 1000,
                "revenue_growth": [0.10, 0.09, 0.08, 0.07, 0.06],
                "ebitda_margin": 0.15,
                "capex_to_sales": 0.08,
                "depreciation_to_sales": 0.04,
                "nwc_to_sales": 0.15,
                "tax_rate": 0.25,
                "risk_free_rate": 0.07,
                "equity_risk_premium": 0.05,
                "beta": 1,
                "cost_of_debt": 0.09,
                "debt_ratio": 0,
                "terminal_roce": 0.15,
                "terminal_reinvestment": 0.30,
                "shares_outstanding": 100
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_grid_shape_and_monotonicity() {
        let engine = DcfEngine::default();
        let out = engine
            .sensitivity_analysis(
                &inputs(),
                &SweepRange::new(dec!(0.10), dec!(0.14), dec!(0.01)),
                &SweepRange::new(dec!(0.02), dec!(0.05), dec!(0.01)),
            )
            .unwrap();
        let grid = &out.result;
        assert_eq!(grid.wacc_values.len(), 5);
        assert_eq!(grid.growth_values.len(), 4);
        assert_eq!(grid.undefined_cells, 0);
        // Higher WACC lowers value at fixed growth.
        let col: Vec<Money> = grid.matrix.iter().map(|r| r[0].unwrap()).collect();
        assert!(col.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(grid.base_position.0, 2);
    }

    #[test]
    fn test_undefined_cells_are_none() {
        let engine = DcfEngine::default();
        let out = engine
            .sensitivity_analysis(
                &inputs(),
                &SweepRange::new(dec!(0.03), dec!(0.05), dec!(0.01)),
                &SweepRange::new(dec!(0.04), dec!(0.05), dec!(0.01)),
            )
            .unwrap();
        let grid = &out.result;
        // wacc 0.03 and 0.04 are never above g in {0.04, 0.05}
        assert!(grid.matrix[0].iter().all(|c| c.is_none()));
        assert!(grid.matrix[2][0].is_some());
        assert!(grid.matrix[2][1].is_none());
        assert!(grid.undefined_cells >= 5);
    }

    #[test]
    fn test_bad_step_rejected() {
        let engine = DcfEngine::default();
        let res = engine.sensitivity_analysis(
            &inputs(),
            &SweepRange::new(dec!(0.10), dec!(0.12), Decimal::ZERO),
            &SweepRange::new(dec!(0.02), dec!(0.05), dec!(0.01)),
        );
        assert!(res.is_err());
    }
}
