//! Propensity scores: the probability that an interaction was observed.
//!
//! Two exposure mechanisms are covered. In the ranking case exposure
//! depends only on the display rank, `theta(r) = (0.9 / r)^pow`. In the
//! rating case exposure depends on the (unobserved) relevance grade and is
//! estimated from a small sample collected uniformly at random.
use ndarray::Array1;

use super::data::Interactions;
use super::{FittingError, Relevance};

/// Examination probability at the first rank when `pow == 1`.
pub const TOP_RANK_EXAMINATION: f32 = 0.9;

/// Examination probability of the (1-indexed) `rank`.
pub fn examination(rank: usize, pow: f32) -> f32 {
    (TOP_RANK_EXAMINATION / rank as f32).powf(pow)
}

/// Position-based examination probabilities for ranks `1..=num_ranks`.
pub fn position_based(num_ranks: usize, pow: f32) -> Array1<f32> {
    Array1::from_shape_fn(num_ranks, |idx| examination(idx + 1, pow))
}

/// Estimate `P(O = 1 | R = r)` for every grade `r` in `1..=max_relevance`.
///
/// Uses Bayes' rule on the relevance marginals:
/// `P(O=1|R=r) = P(R=r|O=1) P(O=1) / P(R=r)`, where the conditional comes
/// from the `observed` (missing-not-at-random) interactions and the
/// marginal `P(R=r)` from an `unbiased` sample of the same population.
/// The returned table is indexed by `r - 1`.
pub fn estimate_relevance_propensity(
    observed: &Interactions,
    unbiased: &Interactions,
    max_relevance: Relevance,
) -> Result<Vec<f32>, FittingError> {
    if observed.is_empty() || unbiased.is_empty() {
        return Err(FittingError::NoInteractions);
    }

    let (num_users, num_items) = observed.shape();
    let observation_rate = observed.len() as f32 / (num_users * num_items) as f32;

    let observed_counts = observed.relevance_counts(max_relevance);
    let unbiased_counts = unbiased.relevance_counts(max_relevance);

    (1..=max_relevance)
        .map(|grade| {
            if unbiased_counts[grade] == 0 {
                return Err(FittingError::MissingRelevanceGrade(grade));
            }

            let conditional = observed_counts[grade] as f32 / observed.len() as f32;
            let marginal = unbiased_counts[grade] as f32 / unbiased.len() as f32;
            let propensity = conditional * observation_rate / marginal;

            if propensity > 0.0 {
                Ok(propensity)
            } else {
                Err(FittingError::NonPositivePropensity {
                    grade,
                    value: propensity,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Interaction;

    #[test]
    fn first_rank_is_most_examined() {
        let theta = position_based(5, 1.0);

        assert_relative_eq!(theta[0], 0.9);
        assert_relative_eq!(theta[2], 0.3);
        assert!(theta.windows(2).into_iter().all(|w| w[0] > w[1]));
    }

    #[test]
    fn zero_exponent_is_uniform() {
        let theta = position_based(20, 0.0);

        assert!(theta.iter().all(|&t| t == 1.0));
    }

    #[test]
    fn propensity_follows_bayes_rule() {
        // 2 users x 2 items with 2 observations: P(O=1) = 0.5.
        let observed = Interactions::from(vec![
            Interaction::new(0, 0, 1),
            Interaction::new(1, 1, 2),
        ]);
        let unbiased = Interactions::from(vec![
            Interaction::new(0, 1, 1),
            Interaction::new(1, 0, 2),
        ]);

        let pscore = estimate_relevance_propensity(&observed, &unbiased, 2).unwrap();

        assert_eq!(pscore.len(), 2);
        assert_relative_eq!(pscore[0], 0.5);
        assert_relative_eq!(pscore[1], 0.5);
    }

    #[test]
    fn never_observed_grade_is_rejected() {
        let observed = Interactions::from(vec![
            Interaction::new(0, 0, 2),
            Interaction::new(1, 1, 2),
        ]);
        let unbiased = Interactions::from(vec![
            Interaction::new(0, 1, 1),
            Interaction::new(1, 0, 2),
        ]);

        match estimate_relevance_propensity(&observed, &unbiased, 2) {
            Err(FittingError::NonPositivePropensity { grade: 1, .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unseen_grade_is_rejected() {
        let observed = Interactions::from(vec![Interaction::new(0, 0, 1)]);
        let unbiased = Interactions::from(vec![Interaction::new(0, 0, 1)]);

        match estimate_relevance_propensity(&observed, &unbiased, 3) {
            Err(FittingError::MissingRelevanceGrade(2)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
