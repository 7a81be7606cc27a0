//! Small descriptive-statistics helpers over `Decimal` series.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

/// Clamp `value` to `[lo, hi]`.
pub fn clamp(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    value.max(lo).min(hi)
}

pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len() as i64))
}

pub fn median(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    let count = sorted.len();
    let median = if count % 2 == 0 {
        let mid = count / 2;
        (sorted[mid - 1] + sorted[mid]) / dec!(2)
    } else {
        sorted[count / 2]
    };
    Some(median)
}

/// Weighted median: the smallest value whose cumulative weight reaches half
/// the total. When the cumulative weight lands exactly on the half, the
/// midpoint of that value and the next is returned, so equal weights reduce
/// to the ordinary median.
pub fn weighted_median(values: &[(Decimal, Decimal)]) -> Option<Decimal> {
    let mut pairs: Vec<(Decimal, Decimal)> = values
        .iter()
        .copied()
        .filter(|(_, w)| *w > Decimal::ZERO)
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let total: Decimal = pairs.iter().map(|(_, w)| *w).sum();
    let half = total / dec!(2);
    let mut cumulative = Decimal::ZERO;
    for (idx, (value, weight)) in pairs.iter().enumerate() {
        cumulative += *weight;
        if cumulative == half {
            let next = pairs.get(idx + 1).map(|(v, _)| *v).unwrap_or(*value);
            return Some((*value + next) / dec!(2));
        }
        if cumulative > half {
            return Some(*value);
        }
    }
    pairs.last().map(|(v, _)| *v)
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance: Decimal = values
        .iter()
        .map(|v| {
            let diff = *v - m;
            diff * diff
        })
        .sum::<Decimal>()
        / Decimal::from((values.len() - 1) as i64);
    variance.sqrt()
}

/// Coefficient of variation (std / |mean|).
pub fn coefficient_of_variation(values: &[Decimal]) -> Option<Decimal> {
    let m = mean(values)?;
    if m.is_zero() {
        return None;
    }
    Some(std_dev(values)? / m.abs())
}

/// Least-squares slope of `values` against their index (per period).
pub fn slope(values: &[Decimal]) -> Option<Decimal> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_dec = Decimal::from(n as i64);
    let x_mean = Decimal::from((n - 1) as i64) / dec!(2);
    let y_mean = values.iter().copied().sum::<Decimal>() / n_dec;

    let mut num = Decimal::ZERO;
    let mut den = Decimal::ZERO;
    for (i, y) in values.iter().enumerate() {
        let dx = Decimal::from(i as i64) - x_mean;
        num += dx * (*y - y_mean);
        den += dx * dx;
    }
    if den.is_zero() {
        return None;
    }
    Some(num / den)
}

/// Fractional decline from the series peak to the trough that follows it.
/// Returns zero for non-declining series.
pub fn peak_to_trough_decline(values: &[Decimal]) -> Decimal {
    let mut peak: Option<Decimal> = None;
    let mut worst = Decimal::ZERO;
    for v in values {
        match peak {
            Some(p) if *v > p => peak = Some(*v),
            Some(p) if p > Decimal::ZERO => {
                let decline = (p - *v) / p;
                if decline > worst {
                    worst = decline;
                }
            }
            None => peak = Some(*v),
            _ => {}
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[dec!(3), dec!(1), dec!(2)]), Some(dec!(2)));
        assert_eq!(median(&[dec!(4), dec!(1), dec!(2), dec!(3)]), Some(dec!(2.5)));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_weighted_median_equal_weights_matches_median() {
        let pairs = [
            (dec!(10), Decimal::ONE),
            (dec!(20), Decimal::ONE),
            (dec!(30), Decimal::ONE),
            (dec!(40), Decimal::ONE),
        ];
        assert_eq!(weighted_median(&pairs), Some(dec!(25)));
    }

    #[test]
    fn test_weighted_median_pulls_toward_heavy_values() {
        let pairs = [
            (dec!(10), dec!(2)),
            (dec!(12), dec!(2)),
            (dec!(30), dec!(1)),
            (dec!(40), dec!(1)),
        ];
        // total 6, half 3: cumulative 2, 4 -> 12
        assert_eq!(weighted_median(&pairs), Some(dec!(12)));
    }

    #[test]
    fn test_std_dev_and_cv() {
        let values = [dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)];
        let sd = std_dev(&values).unwrap();
        assert!((sd - dec!(2.138)).abs() < dec!(0.001));
        let cv = coefficient_of_variation(&values).unwrap();
        assert!((cv - sd / dec!(5)).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_slope_linear_series() {
        let s = slope(&[dec!(0.10), dec!(0.12), dec!(0.14)]).unwrap();
        assert_eq!(s, dec!(0.02));
    }

    #[test]
    fn test_peak_to_trough() {
        assert_eq!(peak_to_trough_decline(&[dec!(0.10), dec!(0.08), dec!(0.06)]), dec!(0.4));
        assert_eq!(peak_to_trough_decline(&[dec!(0.05), dec!(0.06)]), Decimal::ZERO);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(dec!(0.5), dec!(0.03), dec!(0.30)), dec!(0.30));
        assert_eq!(clamp(dec!(0.01), dec!(0.03), dec!(0.30)), dec!(0.03));
    }
}
