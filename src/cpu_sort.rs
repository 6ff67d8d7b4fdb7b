//! CPU Sorting Baseline
//!
//! Standard library sorting driven by the same `less` predicates the lane
//! network takes. Used to verify lane results and as the benchmark baseline.
//! We use the unstable sort since the network gives no stability guarantee either.

use crate::cpu_bitonic_sort::ordering_from_less;

/// Sort a slice in-place with the standard library's unstable sort.
#[inline]
pub fn sort_unstable_by_less<T, F>(data: &mut [T], less: F)
where
    F: Fn(&T, &T) -> bool,
{
    data.sort_unstable_by(ordering_from_less(&less));
}

/// Check if a slice is ordered under `less`: no element is less than its predecessor.
#[inline]
pub fn is_sorted_by<T, F>(data: &[T], less: F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    data.windows(2).all(|w| !less(&w[1], &w[0]))
}

/// Check that `sorted` holds the same multiset of keys as `original`, in
/// `less` order.
pub fn is_sorted_permutation_of<T, F>(original: &[T], sorted: &[T], less: F) -> bool
where
    T: Clone,
    F: Fn(&T, &T) -> bool,
{
    if original.len() != sorted.len() || !is_sorted_by(sorted, &less) {
        return false;
    }
    let mut expected = original.to_vec();
    sort_unstable_by_less(&mut expected, &less);
    expected
        .iter()
        .zip(sorted)
        .all(|(a, b)| !less(a, b) && !less(b, a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sort_unstable_empty() {
        let mut data: Vec<u32> = vec![];
        sort_unstable_by_less(&mut data, |a, b| a < b);
        assert!(is_sorted_by(&data, |a, b| a < b));
    }

    #[test]
    fn test_sort_unstable_random() {
        let mut rng = rand::thread_rng();
        let mut data: Vec<u32> = (0..1000).map(|_| rng.gen()).collect();
        sort_unstable_by_less(&mut data, |a, b| a < b);
        assert!(is_sorted_by(&data, |a, b| a < b));
    }

    #[test]
    fn test_sort_unstable_descending() {
        let mut data: Vec<u32> = (0..100).collect();
        sort_unstable_by_less(&mut data, |a, b| b < a);
        assert_eq!(data, (0..100).rev().collect::<Vec<u32>>());
    }

    #[test]
    fn test_is_sorted_by() {
        let less = |a: &i32, b: &i32| a < b;
        assert!(is_sorted_by(&[1, 2, 3, 4, 5], less));
        assert!(is_sorted_by(&[1, 1, 1, 1], less));
        assert!(is_sorted_by(&[1], less));
        assert!(is_sorted_by(&[], less));
        assert!(!is_sorted_by(&[5, 4, 3, 2, 1], less));
        assert!(!is_sorted_by(&[1, 3, 2], less));
    }

    #[test]
    fn test_is_sorted_permutation_of() {
        let less = |a: &u32, b: &u32| a < b;
        assert!(is_sorted_permutation_of(&[3, 1, 2, 1], &[1, 1, 2, 3], less));
        assert!(!is_sorted_permutation_of(&[3, 1, 2, 1], &[1, 2, 2, 3], less));
        assert!(!is_sorted_permutation_of(&[3, 1, 2], &[1, 3, 2], less));
        assert!(!is_sorted_permutation_of(&[3, 1], &[1, 3, 3], less));
    }
}
