//! Training loops for listwise rankers under biased feedback.
//!
//! Every batch has its feedback freshly simulated from the ground-truth
//! relevance and the chosen estimator turns it into per-document weights
//! for the listwise loss, on which the scoring function takes one optimizer
//! step. After every epoch the model is evaluated by nDCG@k on held-out
//! queries, using the true outcome as the gain.
use ndarray::Array2;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use super::{Estimator, Objective, PlatformEstimator, Trainable};
use crate::bias::{preference, PositionBasedModel, RecommendationExposure};
use crate::data::{RankingBatch, RankingDataset};
use crate::evaluation::{mean_ndcg, Outcome};
use crate::loss::{ips_weights, platform_weights};
use crate::FittingError;

/// Settings shared by the ranking training loops.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingConfig {
    batch_size: usize,
    num_epochs: usize,
    pow_true: f32,
    pow_used: Option<f32>,
    k: usize,
    random_state: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            batch_size: 32,
            num_epochs: 30,
            pow_true: 1.0,
            pow_used: None,
            k: 10,
            random_state: 12345,
        }
    }
}

impl TrainingConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of queries per batch.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of epochs.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the position-bias exponent used to generate clicks.
    pub fn pow_true(mut self, pow_true: f32) -> Self {
        self.pow_true = pow_true;
        self
    }

    /// Set the position-bias exponent reported to the estimator. Defaults
    /// to the true exponent.
    pub fn pow_used(mut self, pow_used: Option<f32>) -> Self {
        self.pow_used = pow_used;
        self
    }

    /// Set the nDCG cutoff.
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the seed for shuffling and feedback simulation.
    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }
}

fn check_inputs(train: &RankingDataset, config: &TrainingConfig) -> Result<(), FittingError> {
    if train.is_empty() {
        return Err(FittingError::NoInteractions);
    }
    if config.batch_size == 0 {
        return Err(FittingError::InvalidBatchSize);
    }
    Ok(())
}

/// Run the epochs: `weight_fn` turns a batch into listwise loss weights.
fn fit<M, F>(
    model: &mut M,
    train: &RankingDataset,
    test: &RankingDataset,
    outcome: Outcome,
    config: &TrainingConfig,
    mut weight_fn: F,
) -> Result<Vec<f32>, FittingError>
where
    M: Trainable + Sync,
    F: FnMut(&RankingBatch, &mut XorShiftRng) -> Array2<f32>,
{
    check_inputs(train, config)?;

    let mut rng = XorShiftRng::seed_from_u64(config.random_state);
    let mut history = Vec::with_capacity(config.num_epochs);

    for epoch in 0..config.num_epochs {
        let order = train.shuffled_order(&mut rng);
        let mut epoch_loss = 0.0;
        let mut num_batches = 0;

        for batch in train.iter_minibatch(&order, config.batch_size) {
            let weights = weight_fn(&batch, &mut rng);
            let loss = model.listwise_step(&batch, weights.view());

            trace!("Epoch {} batch {}: loss {}", epoch, num_batches, loss);

            epoch_loss += loss;
            num_batches += 1;
        }

        let ndcg = mean_ndcg(model, test, outcome, config.k);

        info!(
            "Epoch {}: mean train loss {:.5}, test nDCG@{} {:.5}",
            epoch,
            epoch_loss / num_batches as f32,
            config.k,
            ndcg
        );

        history.push(ndcg);
    }

    Ok(history)
}

/// Train `model` on position-biased clicks and return the test nDCG@k
/// after every epoch.
///
/// `Naive` trains on raw clicks, `Ips` divides them by the examination
/// propensity `theta_used`, and `Ideal` trains on the true preference.
/// Evaluation uses the true preference as the gain.
pub fn train_ranker<M: Trainable + Sync>(
    model: &mut M,
    estimator: Estimator,
    train: &RankingDataset,
    test: &RankingDataset,
    config: &TrainingConfig,
) -> Result<Vec<f32>, FittingError> {
    let click_model = PositionBasedModel::new(config.pow_true, config.pow_used);

    debug!(
        "Training with the {} estimator, click model {:?}",
        estimator, click_model
    );

    fit(model, train, test, Outcome::Preference, config, |batch, rng| {
        match estimator {
            Estimator::Naive => {
                let feedback = click_model.simulate(&batch.relevance, rng);
                ips_weights(feedback.click.view(), None)
            }
            Estimator::Ips => {
                let feedback = click_model.simulate(&batch.relevance, rng);
                ips_weights(feedback.click.view(), Some(feedback.propensity.view()))
            }
            Estimator::Ideal => preference(&batch.relevance),
        }
    })
}

/// Train `model` on conversions observed under recommendation exposure and
/// return the test nDCG@k after every epoch.
///
/// `Naive` weights by observed conversions, `IpsViaRec` corrects clicks by
/// the recommend-and-click propensity, and `IpsPlatform` additionally
/// subtracts the inverse-propensity-weighted conversions of items that were
/// not recommended. The objective decides the evaluation gain: `mu` for
/// `ViaRec`, `mu - mu_zero` for `Platform`.
pub fn train_platform_ranker<M: Trainable + Sync>(
    model: &mut M,
    estimator: PlatformEstimator,
    objective: Objective,
    train: &RankingDataset,
    test: &RankingDataset,
    config: &TrainingConfig,
) -> Result<Vec<f32>, FittingError> {
    let exposure = RecommendationExposure::new();
    let outcome = match objective {
        Objective::ViaRec => Outcome::Preference,
        Objective::Platform => Outcome::PreferenceLift,
    };

    debug!(
        "Training with the {} estimator for the {} objective",
        estimator, objective
    );

    fit(model, train, test, outcome, config, |batch, rng| {
        let feedback = exposure.simulate(&batch.relevance, rng);

        let (recommend, pscore, pscore_zero) = match estimator {
            PlatformEstimator::Naive => (None, None, None),
            PlatformEstimator::IpsViaRec => (None, Some(feedback.pscore.view()), None),
            PlatformEstimator::IpsPlatform => (
                Some(feedback.recommend.view()),
                Some(feedback.pscore.view()),
                Some(feedback.pscore_zero.view()),
            ),
        };

        platform_weights(
            feedback.click.view(),
            feedback.conversion.view(),
            recommend,
            pscore,
            pscore_zero,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::datasets::SyntheticRanking;
    use crate::models::mlp;

    fn datasets() -> (RankingDataset, RankingDataset) {
        let mut rng = XorShiftRng::seed_from_u64(5);
        let generator = SyntheticRanking::new(6, 4, &mut rng);
        let train = generator.sample(96, 12, &mut rng);
        let test = generator.sample(32, 12, &mut rng);
        (train, test)
    }

    fn model() -> mlp::MlpScorer {
        mlp::Hyperparameters::new(6, vec![10])
            .learning_rate(0.01)
            .build()
    }

    #[test]
    fn history_has_one_entry_per_epoch() {
        let (train, test) = datasets();
        let config = TrainingConfig::new().num_epochs(3).batch_size(16);

        for &estimator in &[Estimator::Naive, Estimator::Ips, Estimator::Ideal] {
            let history = train_ranker(&mut model(), estimator, &train, &test, &config).unwrap();

            assert_eq!(history.len(), 3);
            assert!(history.iter().all(|&x| x.is_finite() && x >= 0.0 && x <= 1.0));
        }
    }

    #[test]
    fn platform_history_has_one_entry_per_epoch() {
        let (train, test) = datasets();
        let config = TrainingConfig::new().num_epochs(2).batch_size(32);

        for &estimator in &[
            PlatformEstimator::Naive,
            PlatformEstimator::IpsViaRec,
            PlatformEstimator::IpsPlatform,
        ] {
            for &objective in &[Objective::ViaRec, Objective::Platform] {
                let history = train_platform_ranker(
                    &mut model(),
                    estimator,
                    objective,
                    &train,
                    &test,
                    &config,
                )
                .unwrap();

                assert_eq!(history.len(), 2);
                assert!(history.iter().all(|x| x.is_finite()));
            }
        }
    }

    #[test]
    fn ideal_training_improves_ranking() {
        let (train, test) = datasets();
        let mut model = model();
        let before = mean_ndcg(&model, &test, Outcome::Preference, 10);

        let config = TrainingConfig::new().num_epochs(30).batch_size(8);
        let history = train_ranker(&mut model, Estimator::Ideal, &train, &test, &config).unwrap();

        assert!(
            *history.last().unwrap() > before,
            "{:?} vs {}",
            history,
            before
        );
    }

    #[test]
    fn training_is_reproducible() {
        let (train, test) = datasets();
        let config = TrainingConfig::new().num_epochs(2).random_state(77);

        let first = train_ranker(&mut model(), Estimator::Ips, &train, &test, &config).unwrap();
        let second = train_ranker(&mut model(), Estimator::Ips, &train, &test, &config).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (train, test) = datasets();

        match train_ranker(
            &mut model(),
            Estimator::Naive,
            &train,
            &test,
            &TrainingConfig::new().batch_size(0),
        ) {
            Err(FittingError::InvalidBatchSize) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        match train_ranker(
            &mut model(),
            Estimator::Naive,
            &RankingDataset::new(6, vec![]),
            &test,
            &TrainingConfig::new(),
        ) {
            Err(FittingError::NoInteractions) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
