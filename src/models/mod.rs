//! Models module.
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView2, ArrayView3};

use super::SelectorError;
use crate::data::RankingBatch;

pub mod factorization;
pub mod mlp;
pub mod optim;
pub mod ranker;

/// Estimator of the ranking objective under position bias.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Estimator {
    /// Treat clicks as relevance labels.
    Naive,
    /// Reweight clicks by the inverse examination propensity.
    Ips,
    /// Train on the true preference signal. Not available in practice;
    /// an upper reference point.
    Ideal,
}

/// Estimator of the ranking objective under recommendation exposure.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformEstimator {
    /// Weight by observed click-through conversions.
    Naive,
    /// Correct for the probability of a click inside the recommendation slot.
    IpsViaRec,
    /// Additionally account for conversions of items that were not recommended.
    IpsPlatform,
}

/// Outcome the ranking is ultimately judged on.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// Conversions coming through the recommendation slot.
    ViaRec,
    /// Platform-wide lift of recommending over not recommending.
    Platform,
}

macro_rules! selector {
    ($name:ident, $kind:expr, $expected:expr, { $($text:literal => $variant:ident),+ $(,)* }) => {
        impl FromStr for $name {
            type Err = SelectorError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    _ => Err(SelectorError {
                        kind: $kind,
                        given: value.to_owned(),
                        expected: $expected,
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let text = match *self {
                    $($name::$variant => $text,)+
                };
                f.write_str(text)
            }
        }
    };
}

selector!(Estimator, "estimator", "'naive', 'ips', or 'ideal'", {
    "naive" => Naive,
    "ips" => Ips,
    "ideal" => Ideal,
});

selector!(PlatformEstimator, "estimator", "'naive', 'ips-via-rec', or 'ips-platform'", {
    "naive" => Naive,
    "ips-via-rec" => IpsViaRec,
    "ips-platform" => IpsPlatform,
});

selector!(Objective, "objective", "'via-rec' or 'platform'", {
    "via-rec" => ViaRec,
    "platform" => Platform,
});

/// A function assigning a score to every document of a query.
pub trait ScoringFunction {
    /// Score one query's documents, `(docs, features) -> (docs,)`.
    fn score(&self, features: ArrayView2<f32>) -> Array1<f32>;

    /// Score a padded batch, `(batch, docs, features) -> (batch, docs)`.
    fn score_batch(&self, features: ArrayView3<f32>) -> Array2<f32> {
        let (batch_size, num_docs, _) = features.dim();
        let mut scores = Array2::zeros((batch_size, num_docs));

        for (query, mut row) in features.outer_iter().zip(scores.outer_iter_mut()) {
            row.assign(&self.score(query));
        }

        scores
    }
}

/// A scoring function that can be fitted to a weighted listwise loss.
pub trait Trainable: ScoringFunction {
    /// Take one optimizer step on `-sum_j w_j log_softmax(s)_j` averaged
    /// over the queries of `batch`, with `weights` padded like the batch.
    /// Returns the loss before the step.
    fn listwise_step(&mut self, batch: &RankingBatch, weights: ArrayView2<f32>) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_round_trip() {
        for estimator in &[Estimator::Naive, Estimator::Ips, Estimator::Ideal] {
            assert_eq!(&estimator.to_string().parse::<Estimator>().unwrap(), estimator);
        }
        assert_eq!(
            "ips-platform".parse::<PlatformEstimator>().unwrap(),
            PlatformEstimator::IpsPlatform
        );
        assert_eq!("via-rec".parse::<Objective>().unwrap(), Objective::ViaRec);
    }

    #[test]
    fn unknown_selector_lists_allowed_values() {
        let err = "snips".parse::<Estimator>().unwrap_err();

        assert_eq!(err.given, "snips");
        assert_eq!(
            err.to_string(),
            "estimator must be one of 'naive', 'ips', or 'ideal', but 'snips' is given"
        );
        assert!("ips-via-rec".parse::<Estimator>().is_err());
        assert!("via_rec".parse::<Objective>().is_err());
    }
}
