#![deny(missing_docs)]
//! # unbiased-rec
//!
//! `unbiased_rec` implements recommenders and learning-to-rank models
//! trained from biased implicit feedback. Observed signals (ratings,
//! clicks, conversions) are only seen where an item was exposed, so naive
//! objectives are biased towards whatever the exposure mechanism favours.
//! The models here correct for this by inverse propensity scoring (IPS).
//!
//! The crate contains:
//! - a matrix factorization model fitted with an IPS-weighted squared error
//!   ([`models::factorization`]),
//! - bias simulators that turn ground-truth relevance into clicks and
//!   conversions under a position-based or a recommendation-exposure model
//!   ([`bias`]),
//! - counterfactual listwise losses ([`loss`]) and the training loops that
//!   tie estimator choice to the gradient step ([`models::ranker`]).
//!
//! ## Example
//! Train a small ranker on synthetic data with position-biased clicks:
//!
//! ```rust
//! # extern crate unbiased_rec;
//! # extern crate rand;
//! # extern crate rand_xorshift;
//! # use rand::SeedableRng;
//! use unbiased_rec::datasets::SyntheticRanking;
//! use unbiased_rec::models::mlp;
//! use unbiased_rec::models::ranker::{train_ranker, TrainingConfig};
//! use unbiased_rec::models::Estimator;
//!
//! let mut rng = rand_xorshift::XorShiftRng::seed_from_u64(42);
//! let generator = SyntheticRanking::new(5, 4, &mut rng);
//! let train = generator.sample(64, 10, &mut rng);
//! let test = generator.sample(16, 10, &mut rng);
//!
//! let mut model = mlp::Hyperparameters::new(5, vec![8]).build();
//! let config = TrainingConfig::new().num_epochs(2).pow_true(1.0);
//!
//! let ndcg = train_ranker(&mut model, Estimator::Ips, &train, &test, &config).unwrap();
//!
//! assert_eq!(ndcg.len(), 2);
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate approx;

extern crate csv;
extern crate failure;
extern crate ndarray;
extern crate rand;
extern crate rand_xorshift;
extern crate rayon;
extern crate serde;
extern crate wyrm;

use failure::Fail;

pub mod bias;
pub mod data;
pub mod datasets;
pub mod evaluation;
pub mod loss;
pub mod models;
pub mod propensity;

/// Alias for user indices.
pub type UserId = usize;
/// Alias for item indices.
pub type ItemId = usize;
/// Alias for ordinal relevance grades (typically `0..=4`).
pub type Relevance = usize;

/// Prediction error types.
#[derive(Debug, Fail)]
pub enum PredictionError {
    /// The model has not been fitted yet.
    #[fail(display = "Model must be fitted first.")]
    NotFitted,
    /// The user has no learned representation.
    #[fail(display = "Unknown user id: {}.", _0)]
    UnknownUser(UserId),
    /// The item has no learned representation.
    #[fail(display = "Unknown item id: {}.", _0)]
    UnknownItem(ItemId),
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
}

/// Fitting error types.
#[derive(Debug, Fail)]
pub enum FittingError {
    /// No interactions or queries to fit on.
    #[fail(display = "No interactions were supplied.")]
    NoInteractions,
    /// A relevance grade of zero cannot index a propensity table.
    #[fail(display = "Relevance grades must be at least 1 to index the propensity table.")]
    ZeroRelevance,
    /// The propensity table has no entry for a relevance grade.
    #[fail(
        display = "Relevance grade {} has no propensity entry (table length {}).",
        grade, len
    )]
    MissingPropensity {
        /// Offending relevance grade.
        grade: Relevance,
        /// Length of the propensity table.
        len: usize,
    },
    /// Propensities are used as divisors and must be strictly positive.
    #[fail(display = "Propensity for grade {} must be positive, got {}.", grade, value)]
    NonPositivePropensity {
        /// Relevance grade the propensity belongs to.
        grade: Relevance,
        /// The offending value.
        value: f32,
    },
    /// A relevance grade never occurs in the sample used to estimate its marginal.
    #[fail(display = "Relevance grade {} does not occur in the unbiased sample.", _0)]
    MissingRelevanceGrade(Relevance),
    /// Minibatches must hold at least one query.
    #[fail(display = "Batch size must be positive.")]
    InvalidBatchSize,
}

/// Error returned when parsing an estimator or objective selector.
#[derive(Debug, Fail)]
#[fail(display = "{} must be one of {}, but '{}' is given", kind, expected, given)]
pub struct SelectorError {
    /// What was being selected.
    pub kind: &'static str,
    /// The rejected input.
    pub given: String,
    /// The allowed values.
    pub expected: &'static str,
}
