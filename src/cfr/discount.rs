//! Iteration-dependent discounting.
//!
//! Rather than asking for a raw exponent, the schedule is specified by a
//! target: "iteration `p * T` should weigh `d` times as much as iteration
//! `T`". With weights `(t / T)^k` that pins `k = ln(d) / ln(p)`.

use crate::cfr::config::DiscountingConfig;

/// Discount factors for a run of known length.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountSchedule {
    exponent: f64,
    total_iterations: u64,
    cutoff_iteration: Option<u64>,
    discount_regrets: bool,
    discount_average_strategy: bool,
}

impl DiscountSchedule {
    /// Resolve `config` for a run of `total_iterations`.
    pub fn new(config: &DiscountingConfig, total_iterations: u64) -> Self {
        let exponent =
            config.target_discount.ln() / config.target_proportion_of_iterations.ln();
        let cutoff_iteration = config
            .cutoff_proportion_of_iterations
            .map(|c| ((c * total_iterations as f64).round() as u64).max(1));
        Self {
            exponent,
            total_iterations: total_iterations.max(1),
            cutoff_iteration,
            discount_regrets: config.discount_regrets,
            discount_average_strategy: config.discount_average_strategy,
        }
    }

    /// Exponent `k` derived from the target.
    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    /// Weight of `iteration` (1-based). Frozen after the cutoff.
    pub fn factor(&self, iteration: u64) -> f64 {
        let t = match self.cutoff_iteration {
            Some(cutoff) => iteration.min(cutoff),
            None => iteration,
        };
        (t as f64 / self.total_iterations as f64).powf(self.exponent)
    }

    /// Multiplier for this iteration's regret increments.
    pub fn regret_factor(&self, iteration: u64) -> f64 {
        if self.discount_regrets {
            self.factor(iteration)
        } else {
            1.0
        }
    }

    /// Multiplier for this iteration's cumulative-strategy increments.
    pub fn average_strategy_factor(&self, iteration: u64) -> f64 {
        if self.discount_average_strategy {
            self.factor(iteration)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.25, 0.001, 1000)]
    #[case(0.5, 0.1, 400)]
    #[case(0.1, 0.5, 10_000)]
    fn test_target_is_hit(#[case] p: f64, #[case] d: f64, #[case] total: u64) {
        let config = DiscountingConfig {
            target_proportion_of_iterations: p,
            target_discount: d,
            ..Default::default()
        };
        let schedule = DiscountSchedule::new(&config, total);
        let at_p = schedule.factor((p * total as f64) as u64);
        let at_end = schedule.factor(total);
        assert!((at_p - d * at_end).abs() < 1e-9, "{} vs {}", at_p, d * at_end);
    }

    #[test]
    fn test_cutoff_freezes_factor() {
        let config = DiscountingConfig {
            target_proportion_of_iterations: 0.5,
            target_discount: 0.25,
            cutoff_proportion_of_iterations: Some(0.5),
            ..Default::default()
        };
        let schedule = DiscountSchedule::new(&config, 100);
        assert_eq!(schedule.factor(50), schedule.factor(90));
        assert!(schedule.factor(10) < schedule.factor(50));
    }

    #[test]
    fn test_disabled_accumulators_are_undiscounted() {
        let config = DiscountingConfig {
            discount_regrets: false,
            ..Default::default()
        };
        let schedule = DiscountSchedule::new(&config, 100);
        assert_eq!(schedule.regret_factor(3), 1.0);
        assert!(schedule.average_strategy_factor(3) < 1.0);
    }
}
