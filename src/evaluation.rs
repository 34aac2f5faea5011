//! Ranking and rating quality metrics.
use std::cmp::Ordering;

use rayon::prelude::*;

use super::bias::{to_preference, to_preference_zero, MAX_RELEVANCE, PREFERENCE_EPS};
use super::data::RankingDataset;
use super::models::ScoringFunction;
use super::Relevance;

/// Ground-truth outcome used as the gain when evaluating a ranking.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The preference signal (gamma / mu).
    Preference,
    /// Preference minus the not-recommended preference (mu - mu zero).
    PreferenceLift,
}

impl Outcome {
    /// Gains for one query's documents.
    pub fn gains(&self, relevance: &[Relevance]) -> Vec<f32> {
        relevance
            .iter()
            .map(|&r| match *self {
                Outcome::Preference => to_preference(r, MAX_RELEVANCE, PREFERENCE_EPS),
                Outcome::PreferenceLift => {
                    to_preference(r, MAX_RELEVANCE, PREFERENCE_EPS)
                        - to_preference_zero(r, MAX_RELEVANCE, PREFERENCE_EPS)
                }
            })
            .collect()
    }
}

fn dcg<I: Iterator<Item = f32>>(gains: I, k: usize) -> f32 {
    gains
        .take(k)
        .enumerate()
        .map(|(rank, gain)| gain / (rank as f32 + 2.0).log2())
        .sum()
}

fn descending(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// nDCG@k with linear gains.
///
/// Documents are ranked by descending score; ties keep their original
/// order. Returns 0 when the ideal DCG is 0.
pub fn ndcg_at_k(scores: &[f32], gains: &[f32], k: usize) -> f32 {
    let mut ranking: Vec<usize> = (0..scores.len()).collect();
    ranking.sort_by(|&a, &b| descending(scores[a], scores[b]));

    let mut ideal = gains.to_vec();
    ideal.sort_by(|&a, &b| descending(a, b));

    let ideal_dcg = dcg(ideal.into_iter(), k);

    if ideal_dcg == 0.0 {
        return 0.0;
    }

    dcg(ranking.into_iter().map(|idx| gains[idx]), k) / ideal_dcg
}

/// Mean nDCG@k of `model` over the queries of `dataset`.
pub fn mean_ndcg<T: ScoringFunction + Sync>(
    model: &T,
    dataset: &RankingDataset,
    outcome: Outcome,
    k: usize,
) -> f32 {
    if dataset.is_empty() {
        return 0.0;
    }

    // Collected first so the sum does not depend on how work was split.
    let per_query: Vec<f32> = dataset
        .queries()
        .par_iter()
        .map(|query| {
            let scores = model.score(query.features.view());
            let gains = outcome.gains(&query.relevance);

            ndcg_at_k(&scores.to_vec(), &gains, k)
        })
        .collect();

    per_query.iter().sum::<f32>() / dataset.len() as f32
}

/// Mean squared error, optionally weighted: `sum w (y - y_hat)^2 / sum w`.
///
/// Returns 0 when there is nothing to average over.
pub fn mean_squared_error(truth: &[f32], predictions: &[f32], weights: Option<&[f32]>) -> f32 {
    let (total, normalizer) = match weights {
        Some(weights) => izip!(truth, predictions, weights).fold(
            (0.0, 0.0),
            |(total, normalizer), (&y, &y_hat, &w)| (total + w * (y - y_hat).powi(2), normalizer + w),
        ),
        None => truth
            .iter()
            .zip(predictions)
            .fold((0.0, 0.0), |(total, normalizer), (&y, &y_hat)| {
                (total + (y - y_hat).powi(2), normalizer + 1.0)
            }),
    };

    if normalizer == 0.0 {
        0.0
    } else {
        total / normalizer
    }
}
