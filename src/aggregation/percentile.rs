//! the single reducer C7 applies to every grain: linear-interpolation
//! percentile between ranks, matching `numpy.percentile`'s default
//! (`linear`) interpolation and the original source's
//! `pandas.Series.quantile`.

/// returns the `p`th percentile (0..=100) of `values`, sorting them in
/// place. `None` for an empty slice, per §4.6's "empty group returns a
/// defined missing sentinel, not a crash."
pub fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).expect("metric values must not be NaN"));
    if values.len() == 1 {
        return Some(values[0]);
    }
    let rank = p / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return Some(values[lower]);
    }
    let weight = rank - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * weight)
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    percentile(values, 50.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_of_two_values() {
        let mut values = vec![2.0, 4.0];
        assert_eq!(median(&mut values), Some(3.0));
    }

    #[test]
    fn test_p90_linear_interpolation_matches_spec_example() {
        let mut values = vec![2.0, 4.0];
        assert_eq!(percentile(&mut values, 90.0), Some(3.8));
    }

    #[test]
    fn test_p50_singleton_group_returns_the_value() {
        let mut values = vec![7.0];
        assert_eq!(median(&mut values), Some(7.0));
    }

    #[test]
    fn test_empty_group_returns_none() {
        let mut values: Vec<f64> = vec![];
        assert_eq!(median(&mut values), None);
    }
}
