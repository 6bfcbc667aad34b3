//! small grouping/reduction helpers used throughout C6 in place of a
//! dataframe groupby. kept deliberately generic: every metric in
//! `calculator.rs` is some composition of "group rows by a key, reduce a
//! column, join the result back in."

use std::collections::HashMap;
use std::hash::Hash;

/// groups the indices of `items` by `key_fn`, in first-seen order within
/// each group.
pub fn group_indices<T, K, F>(items: &[T], key_fn: F) -> HashMap<K, Vec<usize>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut groups: HashMap<K, Vec<usize>> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        groups.entry(key_fn(item)).or_default().push(i);
    }
    groups
}

pub fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_indices_preserves_order() {
        let items = vec!["a", "b", "a", "c"];
        let groups = group_indices(&items, |s| *s);
        assert_eq!(groups[&"a"], vec![0, 2]);
    }

    #[test]
    fn test_mean_skips_nothing_and_handles_empty() {
        assert_eq!(mean(vec![1.0, 2.0, 3.0].into_iter()), Some(2.0));
        assert_eq!(mean(std::iter::empty()), None);
    }

    #[test]
    fn test_round_to_two_decimals() {
        assert_eq!(round_to(1.005_001, 2), 1.01);
    }
}
