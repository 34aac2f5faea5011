//! Synthetic biased feedback.
//!
//! Ground-truth relevance grades are mapped to a `[eps, 1]` preference
//! signal, which then drives Bernoulli sampling of clicks, recommendations
//! and conversions under an exposure model. Only the sampled binary signals
//! and the propensities are meant to reach a loss function; the preference
//! signal itself is reserved for simulation and evaluation.
use ndarray::{Array1, Array2};
use rand::Rng;

use super::propensity::{examination, position_based};
use super::Relevance;

/// Default highest relevance grade.
pub const MAX_RELEVANCE: Relevance = 4;
/// Default floor of the preference signal.
pub const PREFERENCE_EPS: f32 = 0.1;

/// Per-grade shifts applied to the preference signal when the item is
/// not recommended, as `(grade, shift)` pairs.
pub const NOT_RECOMMENDED_SHIFTS: [(Relevance, f32); 4] =
    [(3, 0.1), (2, 0.05), (1, -0.1), (0, -0.05)];

/// Map a relevance grade to `eps + (1 - eps) (2^r - 1) / (2^max_rel - 1)`.
///
/// Increasing in `relevance`, equal to `eps` at 0 and to 1 at `max_rel`.
pub fn to_preference(relevance: Relevance, max_rel: Relevance, eps: f32) -> f32 {
    let gain = 2f32.powi(relevance as i32) - 1.0;
    let max_gain = 2f32.powi(max_rel as i32) - 1.0;

    eps + (1.0 - eps) * gain / max_gain
}

/// The preference had the item not been recommended: `to_preference`
/// shifted by the entry of [`NOT_RECOMMENDED_SHIFTS`] matching the grade
/// exactly.
pub fn to_preference_zero(relevance: Relevance, max_rel: Relevance, eps: f32) -> f32 {
    let shift = NOT_RECOMMENDED_SHIFTS
        .iter()
        .find(|&&(grade, _)| grade == relevance)
        .map_or(0.0, |&(_, shift)| shift);

    to_preference(relevance, max_rel, eps) + shift
}

/// Elementwise [`to_preference`] with default parameters (gamma / mu).
pub fn preference(relevance: &Array2<Relevance>) -> Array2<f32> {
    relevance.mapv(|r| to_preference(r, MAX_RELEVANCE, PREFERENCE_EPS))
}

/// Elementwise [`to_preference_zero`] with default parameters (mu zero).
pub fn preference_zero(relevance: &Array2<Relevance>) -> Array2<f32> {
    relevance.mapv(|r| to_preference_zero(r, MAX_RELEVANCE, PREFERENCE_EPS))
}

/// Draw an independent Bernoulli sample for every probability.
pub fn sample_bernoulli<R: Rng>(probabilities: &Array2<f32>, rng: &mut R) -> Array2<f32> {
    probabilities.map(|&p| if rng.gen::<f32>() < p { 1.0 } else { 0.0 })
}

/// Clicks sampled under a position-based model.
#[derive(Clone, Debug)]
pub struct PositionBiasedFeedback {
    /// Binary clicks, `(batch, docs)`.
    pub click: Array2<f32>,
    /// Examination propensity per rank handed to the estimator, `(docs,)`.
    pub propensity: Array1<f32>,
}

/// Position-based click model.
///
/// A document at rank `r` is examined with probability
/// `theta(r) = (0.9 / r)^pow` and clicked with probability
/// `preference * theta_true(r)`. The estimator is handed
/// `theta_used(r)`, which differs from the truth whenever
/// `pow_used != pow_true`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PositionBasedModel {
    pow_true: f32,
    pow_used: f32,
}

impl PositionBasedModel {
    /// Build a model; `pow_used` defaults to `pow_true`.
    pub fn new(pow_true: f32, pow_used: Option<f32>) -> Self {
        PositionBasedModel {
            pow_true,
            pow_used: pow_used.unwrap_or(pow_true),
        }
    }

    /// Exponent governing click generation.
    pub fn pow_true(&self) -> f32 {
        self.pow_true
    }

    /// Exponent governing the propensity reported to the estimator.
    pub fn pow_used(&self) -> f32 {
        self.pow_used
    }

    /// Sample clicks for a `(batch, docs)` relevance matrix.
    pub fn simulate<R: Rng>(
        &self,
        relevance: &Array2<Relevance>,
        rng: &mut R,
    ) -> PositionBiasedFeedback {
        let num_ranks = relevance.ncols();
        let theta_true = position_based(num_ranks, self.pow_true);

        let click_probability = preference(relevance) * &theta_true;

        PositionBiasedFeedback {
            click: sample_bernoulli(&click_probability, rng),
            propensity: position_based(num_ranks, self.pow_used),
        }
    }
}

/// Feedback sampled under the recommendation-exposure model.
#[derive(Clone, Debug)]
pub struct PlatformFeedback {
    /// Clicks inside the recommendation slot; zero wherever not recommended.
    pub click: Array2<f32>,
    /// Whether the item was recommended.
    pub recommend: Array2<f32>,
    /// Probability of being recommended and then clicked, `mu * theta`.
    pub pscore: Array2<f32>,
    /// Probability of not being recommended, `1 - theta`.
    pub pscore_zero: Array2<f32>,
    /// Observed conversions, merged from the recommended-and-clicked and
    /// the not-recommended outcome tracks.
    pub conversion: Array2<f32>,
}

/// Recommendation-exposure model for platform-wide outcomes.
///
/// Each document is recommended independently with probability
/// `theta(r)`. A recommended document is clicked with probability `mu`.
/// Conversions are drawn on two tracks: `mu` for clicked items and
/// `mu_zero` for items that were not recommended. `pow` must be positive
/// so that `1 - theta` stays above zero.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecommendationExposure {
    pow: f32,
}

impl Default for RecommendationExposure {
    fn default() -> Self {
        RecommendationExposure { pow: 1.0 }
    }
}

impl RecommendationExposure {
    /// Exposure with `theta(r) = 0.9 / r`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exposure exponent.
    pub fn pow(mut self, pow: f32) -> Self {
        self.pow = pow;
        self
    }

    /// Sample platform feedback for a `(batch, docs)` relevance matrix.
    pub fn simulate<R: Rng>(&self, relevance: &Array2<Relevance>, rng: &mut R) -> PlatformFeedback {
        let pow = self.pow;
        let theta = Array2::from_shape_fn(relevance.dim(), |(_, doc)| examination(doc + 1, pow));
        let mu = preference(relevance);
        let mu_zero = preference_zero(relevance);

        let conversion_one = sample_bernoulli(&mu, rng);
        let conversion_zero = sample_bernoulli(&mu_zero, rng);

        let recommend = sample_bernoulli(&theta, rng);
        let click = sample_bernoulli(&mu, rng) * &recommend;

        let not_recommended = recommend.mapv(|r| 1.0 - r);
        let conversion = &conversion_one * &click + &conversion_zero * &not_recommended;

        PlatformFeedback {
            pscore: &mu * &theta,
            pscore_zero: theta.mapv(|t| 1.0 - t),
            click,
            recommend,
            conversion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{arr2, Array2};
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    #[test]
    fn preference_endpoints() {
        assert_relative_eq!(to_preference(0, MAX_RELEVANCE, PREFERENCE_EPS), PREFERENCE_EPS);
        assert_relative_eq!(to_preference(MAX_RELEVANCE, MAX_RELEVANCE, PREFERENCE_EPS), 1.0);
        assert_relative_eq!(to_preference(2, 4, 0.1), 0.1 + 0.9 * 3.0 / 15.0);
    }

    #[test]
    fn preference_is_monotonic() {
        for max_rel in 1..6 {
            for eps in &[0.0, 0.1, 0.5] {
                let values: Vec<f32> = (0..=max_rel)
                    .map(|r| to_preference(r, max_rel, *eps))
                    .collect();
                assert!(values.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    #[test]
    fn preference_zero_shifts() {
        let base = |r| to_preference(r, 4, 0.1);
        let zero = |r| to_preference_zero(r, 4, 0.1);

        assert_relative_eq!(zero(0), base(0) - 0.05);
        assert_relative_eq!(zero(1), base(1) - 0.1);
        assert_relative_eq!(zero(2), base(2) + 0.05);
        assert_relative_eq!(zero(3), base(3) + 0.1);
        assert_relative_eq!(zero(4), base(4));
    }

    #[test]
    fn zero_exponent_position_model_is_flat() {
        let model = PositionBasedModel::new(0.0, Some(0.0));
        let relevance = Array2::from_elem((3, 50), 4);
        let mut rng = XorShiftRng::seed_from_u64(7);

        let feedback = model.simulate(&relevance, &mut rng);

        assert_eq!(feedback.propensity.len(), 50);
        assert!(feedback.propensity.iter().all(|&t| t == 1.0));
    }

    #[test]
    fn unit_exponent_position_model_tops_at_point_nine() {
        let model = PositionBasedModel::new(1.0, None);
        let relevance = Array2::from_elem((1, 4), 0);
        let mut rng = XorShiftRng::seed_from_u64(7);

        let feedback = model.simulate(&relevance, &mut rng);

        assert_relative_eq!(feedback.propensity[0], 0.9);
        assert_relative_eq!(feedback.propensity[3], 0.225);
        assert_eq!(model.pow_used(), model.pow_true());
    }

    #[test]
    fn misspecified_propensity_uses_pow_used() {
        let model = PositionBasedModel::new(2.0, Some(0.5));
        let relevance = Array2::from_elem((2, 3), 2);
        let mut rng = XorShiftRng::seed_from_u64(7);

        let feedback = model.simulate(&relevance, &mut rng);

        assert_relative_eq!(feedback.propensity[1], 0.45f32.powf(0.5));
    }

    #[test]
    fn clicks_are_binary() {
        let model = PositionBasedModel::new(1.0, None);
        let relevance = arr2(&[[4, 3, 2, 1, 0], [0, 0, 0, 0, 4]]);
        let mut rng = XorShiftRng::seed_from_u64(3);

        let feedback = model.simulate(&relevance, &mut rng);

        assert_eq!(feedback.click.dim(), (2, 5));
        assert!(feedback.click.iter().all(|&c| c == 0.0 || c == 1.0));
    }

    #[test]
    fn platform_feedback_is_consistent() {
        let relevance = Array2::from_shape_fn((64, 10), |(q, d)| (q + d) % 5);
        let mut rng = XorShiftRng::seed_from_u64(11);

        let feedback = RecommendationExposure::new().simulate(&relevance, &mut rng);

        for (&click, &recommend) in feedback.click.iter().zip(feedback.recommend.iter()) {
            assert!(click <= recommend);
        }
        for (&conversion, &click, &recommend) in izip!(
            feedback.conversion.iter(),
            feedback.click.iter(),
            feedback.recommend.iter()
        ) {
            // Recommended but not clicked items never convert.
            if recommend == 1.0 && click == 0.0 {
                assert_eq!(conversion, 0.0);
            }
        }

        assert!(feedback.pscore.iter().all(|&p| p > 0.0));
        assert!(feedback.pscore_zero.iter().all(|&p| p > 0.0));
        assert_relative_eq!(feedback.pscore_zero[[0, 0]], 0.1, epsilon = 1e-6);
        assert_relative_eq!(
            feedback.pscore[[0, 0]],
            0.9 * to_preference(0, MAX_RELEVANCE, PREFERENCE_EPS)
        );
    }
}
