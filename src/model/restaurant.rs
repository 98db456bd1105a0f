use super::logspace::log_add;
use std::collections::BTreeMap;

/// Dirichlet-process count table for one tag.
///
/// `total` always equals the sum of the stored counts, and an entry exists
/// exactly while its count is non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantProcess<T: Ord> {
    alpha: f64,
    total: i64,
    counts: BTreeMap<T, i64>,
}

/// `ln[(count + α·p0) / (total + α)]`
#[inline]
pub fn predictive_log_probability(alpha: f64, count: i64, total: i64, log_p0: f64) -> f64 {
    let numerator = log_add((count as f64).ln(), alpha.ln() + log_p0);
    numerator - (total as f64 + alpha).ln()
}

impl<T: Ord + Clone> RestaurantProcess<T> {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            total: 0,
            counts: BTreeMap::new(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn count(&self, table: &T) -> i64 {
        self.counts.get(table).copied().unwrap_or(0)
    }

    #[inline]
    pub fn total(&self) -> i64 {
        self.total
    }

    /// Number of distinct tables with a non-zero count.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, i64)> {
        self.counts.iter().map(|(t, &c)| (t, c))
    }

    pub fn update(&mut self, table: &T, delta: i64) {
        if delta == 0 {
            return;
        }
        let emptied = match self.counts.get_mut(table) {
            Some(count) => {
                *count += delta;
                *count == 0
            }
            None => {
                self.counts.insert(table.clone(), delta);
                false
            }
        };
        if emptied {
            self.counts.remove(table);
        }
        self.total += delta;
    }

    #[inline]
    pub fn increment(&mut self, table: &T) {
        self.update(table, 1);
    }

    #[inline]
    pub fn decrement(&mut self, table: &T) {
        self.update(table, -1);
    }

    pub fn log_probability(&self, table: &T, log_p0: f64) -> f64 {
        self.log_probability_with_delta(table, 0, 0, log_p0)
    }

    /// Predictive probability as if `delta_numerator` more customers sat at
    /// `table` and `delta_denominator` more were in the restaurant.
    pub fn log_probability_with_delta(
        &self,
        table: &T,
        delta_numerator: i64,
        delta_denominator: i64,
        log_p0: f64,
    ) -> f64 {
        predictive_log_probability(
            self.alpha,
            self.count(table) + delta_numerator,
            self.total + delta_denominator,
            log_p0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_restaurant_returns_base() {
        let r: RestaurantProcess<u32> = RestaurantProcess::new(2.0);
        let lp = r.log_probability(&7, 0.25f64.ln());
        assert!((lp - 0.25f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_predictive_formula() {
        let mut r = RestaurantProcess::new(1.0);
        r.increment(&"a");
        r.increment(&"a");
        r.increment(&"b");
        // (2 + 1 * 0.1) / (3 + 1)
        let lp = r.log_probability(&"a", 0.1f64.ln());
        assert!((lp - (2.1f64 / 4.0).ln()).abs() < 1e-12);
        assert!((lp - predictive_log_probability(1.0, 2, 3, 0.1f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_delta_overload_matches_real_increment() {
        let mut r = RestaurantProcess::new(0.5);
        r.increment(&1u8);
        r.increment(&2u8);
        let hypothetical = r.log_probability_with_delta(&1, 1, 1, 0.2f64.ln());
        r.increment(&1);
        let real = r.log_probability(&1, 0.2f64.ln());
        assert!((hypothetical - real).abs() < 1e-12);
    }

    #[test]
    fn test_zero_count_removes_entry() {
        let mut r = RestaurantProcess::new(1.0);
        r.increment(&"x");
        r.decrement(&"x");
        assert!(r.is_empty());
        assert_eq!(r.total(), 0);
        assert_eq!(r.count(&"x"), 0);
    }

    proptest! {
        #[test]
        fn prop_total_is_sum_of_entries(ops in prop::collection::vec((0u8..6, prop::bool::ANY), 0..200)) {
            let mut r = RestaurantProcess::new(1.0);
            for (table, up) in ops {
                if up { r.increment(&table) } else { r.decrement(&table) }
            }
            let sum: i64 = r.iter().map(|(_, c)| c).sum();
            prop_assert_eq!(r.total(), sum);
            for table in 0u8..6 {
                let present = r.iter().any(|(t, _)| *t == table);
                prop_assert_eq!(present, r.count(&table) != 0);
            }
        }
    }
}
