use crate::error::{GrammarError, GrammarResult};
use crate::model::logspace::log_sum_exp;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// How a move picks among its scored hypotheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Selection {
    /// Draw proportionally to the normalized weights.
    #[default]
    Sample,
    /// Always take the most probable hypothesis.
    Viterbi,
}

/// Index of the chosen hypothesis given unnormalized log weights.
pub fn select(log_weights: &[f64], strategy: Selection, rng: &mut fastrand::Rng) -> GrammarResult<usize> {
    if log_weights.is_empty() {
        return Err(GrammarError::Invariant("no hypotheses to choose from".to_string()));
    }
    if log_weights.iter().any(|w| w.is_nan()) {
        return Err(GrammarError::Invariant("hypothesis weight is NaN".to_string()));
    }

    match strategy {
        Selection::Viterbi => {
            let mut best = 0;
            for (i, &w) in log_weights.iter().enumerate().skip(1) {
                if w > log_weights[best] {
                    best = i;
                }
            }
            Ok(best)
        }
        Selection::Sample => {
            let normalizer = log_sum_exp(log_weights);
            if !normalizer.is_finite() {
                return Err(GrammarError::Invariant(format!(
                    "hypothesis weights do not normalize ({})",
                    normalizer
                )));
            }
            let u = rng.f64();
            let mut cumulative = 0.0;
            let mut last_positive = 0;
            for (i, &w) in log_weights.iter().enumerate() {
                let p = (w - normalizer).exp();
                if p > 0.0 {
                    last_positive = i;
                }
                cumulative += p;
                if u < cumulative {
                    return Ok(i);
                }
            }
            // rounding left the total just under one
            Ok(last_positive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_viterbi_takes_first_maximum() {
        let mut rng = fastrand::Rng::with_seed(1);
        let weights = [-3.0, -1.0, -1.0, -2.0];
        assert_eq!(select(&weights, Selection::Viterbi, &mut rng).unwrap(), 1);
    }

    #[test]
    fn test_sample_follows_weights() {
        let mut rng = fastrand::Rng::with_seed(7);
        let weights = [0.1f64.ln(), 0.9f64.ln()];
        let mut hits = [0usize; 2];
        for _ in 0..10_000 {
            hits[select(&weights, Selection::Sample, &mut rng).unwrap()] += 1;
        }
        assert!(hits[1] > 8_500 && hits[1] < 9_500, "{:?}", hits);
    }

    #[test]
    fn test_zero_weight_is_never_sampled() {
        let mut rng = fastrand::Rng::with_seed(3);
        let weights = [f64::NEG_INFINITY, -0.5, f64::NEG_INFINITY];
        for _ in 0..1_000 {
            assert_eq!(select(&weights, Selection::Sample, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_degenerate_inputs_fail_loudly() {
        let mut rng = fastrand::Rng::with_seed(3);
        assert!(select(&[], Selection::Sample, &mut rng).is_err());
        assert!(select(&[f64::NAN], Selection::Viterbi, &mut rng).is_err());
        assert!(select(&[f64::NEG_INFINITY], Selection::Sample, &mut rng).is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(Selection::Viterbi.to_string(), "viterbi");
        assert_eq!(<Selection as FromStr>::from_str("sample").unwrap(), Selection::Sample);
    }
}
