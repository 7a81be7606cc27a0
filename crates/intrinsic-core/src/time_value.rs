use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::IntrinsicResult;

/// Discount factor for `period` whole years at `rate`.
///
/// With `mid_year` set, flows are assumed to arrive half-way through the
/// year, i.e. the factor is `1 / (1 + r)^(t - 0.5)`.
pub fn discount_factor(rate: Rate, period: u32, mid_year: bool) -> IntrinsicResult<Rate> {
    if rate <= dec!(-1) {
        return Err(ValuationError::invalid_parameter(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }

    let one_plus_r = Decimal::ONE + rate;
    let mut compounded = Decimal::ONE;
    for _ in 0..period {
        compounded *= one_plus_r;
    }
    if mid_year && period > 0 {
        let half = one_plus_r.sqrt().ok_or_else(|| {
            ValuationError::invalid_parameter("rate", "Cannot take half-year root")
        })?;
        compounded /= half;
    }
    if compounded.is_zero() {
        return Err(ValuationError::invalid_parameter(
            "rate",
            format!("Discount factor at period {period} is undefined"),
        ));
    }
    Ok(Decimal::ONE / compounded)
}

/// Net present value of flows arriving at the end of years 1..=n.
pub fn npv(rate: Rate, cash_flows: &[Money], mid_year: bool) -> IntrinsicResult<Money> {
    let mut total = Decimal::ZERO;
    for (idx, cf) in cash_flows.iter().enumerate() {
        total += *cf * discount_factor(rate, idx as u32 + 1, mid_year)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_factor_end_of_year() {
        let df = discount_factor(dec!(0.10), 2, false).unwrap();
        assert_eq!(df, Decimal::ONE / dec!(1.21));
    }

    #[test]
    fn test_mid_year_discounts_less() {
        let end = discount_factor(dec!(0.10), 3, false).unwrap();
        let mid = discount_factor(dec!(0.10), 3, true).unwrap();
        assert!(mid > end);
    }

    #[test]
    fn test_npv_basic() {
        let result = npv(dec!(0.10), &[dec!(110), dec!(121)], false).unwrap();
        assert!((result - dec!(200)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_rate_below_minus_one_rejected() {
        assert!(discount_factor(dec!(-1.5), 1, false).is_err());
    }
}
