//! Counterfactual listwise losses.
//!
//! Every estimator reduces to the same loss: per query, the log-softmax of
//! the scores weighted by a per-document signal, negated and summed, then
//! averaged over the batch. The estimators differ only in the weights,
//! which [`ips_weights`] and [`platform_weights`] build from the simulated
//! feedback. [`listwise_loss_node`] expresses the loss of one query as a
//! differentiable graph for training; [`weighted_listwise_loss`] evaluates
//! it directly.
//!
//! Inputs are padded `(batch, docs)` matrices together with the number of
//! valid documents per query. Documents past `num_docs` are excluded from
//! the softmax and from the sum, whatever their scores, signals or
//! propensities.
//!
//! Propensities are used as divisors without clipping: as a propensity
//! approaches zero the weight, and with it the loss variance, blows up.
use ndarray::{s, Array2, ArrayView1, ArrayView2};

use wyrm::{Arr, BoxedNode, InputNode, Variable};

/// Naive or IPS weights for position-biased feedback: `signal / pscore[rank]`.
///
/// Without `pscore` every propensity is 1, which gives the naive
/// estimator.
pub fn ips_weights(signal: ArrayView2<f32>, pscore: Option<ArrayView1<f32>>) -> Array2<f32> {
    match pscore {
        Some(pscore) => &signal / &pscore,
        None => signal.to_owned(),
    }
}

/// Weights for platform-wide conversions:
/// `(click / pscore - (1 - recommend) / pscore_zero) * conversion`.
///
/// This covers both the recommended-and-clicked branch and the
/// not-recommended branch of the outcome. Every optional input defaults to
/// all ones, under which the second term vanishes and the first is the
/// naive weight.
pub fn platform_weights(
    click: ArrayView2<f32>,
    conversion: ArrayView2<f32>,
    recommend: Option<ArrayView2<f32>>,
    pscore: Option<ArrayView2<f32>>,
    pscore_zero: Option<ArrayView2<f32>>,
) -> Array2<f32> {
    let mut weights = Array2::zeros(click.raw_dim());

    for ((query, doc), weight) in weights.indexed_iter_mut() {
        let idx = [query, doc];
        let recommend = recommend.map_or(1.0, |x| x[idx]);
        let pscore = pscore.map_or(1.0, |x| x[idx]);
        let pscore_zero = pscore_zero.map_or(1.0, |x| x[idx]);

        *weight = (click[idx] / pscore - (1.0 - recommend) / pscore_zero) * conversion[idx];
    }

    weights
}

fn log_softmax(scores: ArrayView1<f32>) -> Vec<f32> {
    let max = scores.fold(std::f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let log_normalizer = scores.iter().map(|&x| (x - max).exp()).sum::<f32>().ln() + max;

    scores.iter().map(|&x| x - log_normalizer).collect()
}

/// `-sum_j w_j log_softmax(s)_j` per query, averaged over the batch.
pub fn weighted_listwise_loss(
    scores: ArrayView2<f32>,
    weights: ArrayView2<f32>,
    num_docs: &[usize],
) -> f32 {
    let batch_size = scores.nrows();

    if batch_size == 0 {
        return 0.0;
    }

    let total: f32 = izip!(scores.outer_iter(), weights.outer_iter(), num_docs)
        .map(|(query_scores, query_weights, &n)| {
            let log_probs = log_softmax(query_scores.slice(s![..n]));

            -query_weights
                .slice(s![..n])
                .iter()
                .zip(&log_probs)
                .map(|(&weight, &log_prob)| weight * log_prob)
                .sum::<f32>()
        })
        .sum();

    total / batch_size as f32
}

/// Listwise loss for position-biased clicks, see [`ips_weights`].
pub fn listwise_loss(
    scores: ArrayView2<f32>,
    signal: ArrayView2<f32>,
    num_docs: &[usize],
    pscore: Option<ArrayView1<f32>>,
) -> f32 {
    weighted_listwise_loss(scores, ips_weights(signal, pscore).view(), num_docs)
}

/// Listwise loss for platform-wide conversions, see [`platform_weights`].
pub fn platform_listwise_loss(
    scores: ArrayView2<f32>,
    click: ArrayView2<f32>,
    conversion: ArrayView2<f32>,
    num_docs: &[usize],
    recommend: Option<ArrayView2<f32>>,
    pscore: Option<ArrayView2<f32>>,
    pscore_zero: Option<ArrayView2<f32>>,
) -> f32 {
    let weights = platform_weights(click, conversion, recommend, pscore, pscore_zero);

    weighted_listwise_loss(scores, weights.view(), num_docs)
}

fn column(values: &[f32]) -> Arr {
    let mut arr = Arr::zeros((values.len(), 1));
    for (dst, &src) in arr.iter_mut().zip(values) {
        *dst = src;
    }
    arr
}

/// Graph of `-sum_j w_j log_softmax(s)_j` for one query.
///
/// `scores` is the `(docs, 1)` output of a scoring graph restricted to the
/// valid documents, with one weight per document. `shift` is subtracted
/// from every score before exponentiating and should be close to the
/// largest score; the loss and its gradient do not depend on it.
pub fn listwise_loss_node(
    scores: &Variable<BoxedNode>,
    weights: &[f32],
    shift: f32,
) -> Variable<BoxedNode> {
    let num_docs = weights.len();

    let weight_input = InputNode::new(column(weights));
    let shift_input = InputNode::new(Arr::from_elem((num_docs, 1), shift));
    let total_weight = InputNode::new(Arr::from_elem((1, 1), weights.iter().sum()));

    let shifted = (scores.clone() - shift_input).boxed();
    let log_normalizer = shifted.exp().scalar_sum().ln();

    (total_weight * log_normalizer - (weight_input * shifted).scalar_sum()).boxed()
}
