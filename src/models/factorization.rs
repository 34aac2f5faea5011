//! Explicit-feedback matrix factorization with an IPS-weighted objective.
//!
//! Ratings are missing not at random: users mostly rate items they like.
//! Dividing each squared error by the propensity `P(O = 1 | R = r)` of its
//! relevance grade makes the training and validation objectives unbiased
//! estimates of the error over all user-item pairs.
//!
//! Training is plain stochastic gradient descent: every epoch the training
//! rows are reshuffled and visited one at a time, each row updating its user
//! and item vectors with an Adam-style step.
use std::cmp;

use ndarray::{Array1, Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use super::optim::Adam;
use crate::data::{Interaction, Interactions};
use crate::evaluation::mean_squared_error;
use crate::{FittingError, ItemId, PredictionError, Relevance, UserId};

fn embedding_init<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| rng.gen::<f32>() / cols as f32)
}

/// Hyperparameters for [`MatrixFactorization`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameters {
    latent_dim: usize,
    l2_penalty: f32,
    adam: Adam,
    num_epochs: usize,
    random_state: u64,
}

impl Hyperparameters {
    /// Defaults for the given latent dimension.
    pub fn new(latent_dim: usize) -> Self {
        Hyperparameters {
            latent_dim,
            l2_penalty: 1e-5,
            adam: Adam::default(),
            num_epochs: 10,
            random_state: 12345,
        }
    }

    /// Set the L2 penalty on user and item vectors.
    pub fn l2_penalty(mut self, l2_penalty: f32) -> Self {
        self.l2_penalty = l2_penalty;
        self
    }

    /// Set the Adam step size.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.adam.learning_rate = learning_rate;
        self
    }

    /// Replace all Adam hyperparameters.
    pub fn adam(mut self, adam: Adam) -> Self {
        self.adam = adam;
        self
    }

    /// Set the number of epochs.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the seed driving initialization and shuffling.
    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    /// Build the model.
    pub fn build(self) -> MatrixFactorization {
        MatrixFactorization {
            rng: XorShiftRng::seed_from_u64(self.random_state),
            hyper: self,
            model: None,
        }
    }
}

/// Lifecycle of a [`MatrixFactorization`] instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitState {
    /// No parameters yet.
    Uninitialized,
    /// Parameters initialized, no update applied.
    Initialized,
    /// At least one epoch was run.
    Trained,
}

/// Per-epoch error histories returned by [`MatrixFactorization::fit`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FitHistory {
    /// Propensity-weighted MSE on the validation data.
    pub validation_loss: Vec<f32>,
    /// Unweighted MSE on the test data.
    pub test_loss: Vec<f32>,
}

#[derive(Clone, Debug)]
struct Parameters {
    user_embedding: Array2<f32>,
    item_embedding: Array2<f32>,
    user_first: Array2<f32>,
    user_second: Array2<f32>,
    item_first: Array2<f32>,
    item_second: Array2<f32>,
    epochs_trained: usize,
}

impl Parameters {
    fn new<R: Rng>(num_users: usize, num_items: usize, latent_dim: usize, rng: &mut R) -> Self {
        let user_embedding = embedding_init(num_users, latent_dim, rng);
        let item_embedding = embedding_init(num_items, latent_dim, rng);

        Parameters {
            user_first: Array2::zeros(user_embedding.raw_dim()),
            user_second: Array2::zeros(user_embedding.raw_dim()),
            item_first: Array2::zeros(item_embedding.raw_dim()),
            item_second: Array2::zeros(item_embedding.raw_dim()),
            user_embedding,
            item_embedding,
            epochs_trained: 0,
        }
    }

    fn predict_pair(&self, user_id: UserId, item_id: ItemId) -> f32 {
        self.user_embedding
            .row(user_id)
            .dot(&self.item_embedding.row(item_id))
    }

    fn predict(&self, data: &[Interaction]) -> Vec<f32> {
        data.iter()
            .map(|x| self.predict_pair(x.user_id(), x.item_id()))
            .collect()
    }

    /// One SGD step on a single observation. The item update sees the
    /// already-updated user vector.
    fn step(&mut self, interaction: &Interaction, pscore: &[f32], l2_penalty: f32, adam: &Adam) {
        let (user, item) = (interaction.user_id(), interaction.item_id());
        let relevance = interaction.relevance();

        let error = (relevance as f32 - self.predict_pair(user, item)) / pscore[relevance - 1];

        let user_grad: Array1<f32> =
            &self.user_embedding.row(user) * l2_penalty - &self.item_embedding.row(item) * error;
        adam.update(
            self.user_embedding.row_mut(user),
            self.user_first.row_mut(user),
            self.user_second.row_mut(user),
            user_grad.view(),
        );

        let item_grad: Array1<f32> =
            &self.item_embedding.row(item) * l2_penalty - &self.user_embedding.row(user) * error;
        adam.update(
            self.item_embedding.row_mut(item),
            self.item_first.row_mut(item),
            self.item_second.row_mut(item),
            item_grad.view(),
        );
    }
}

/// Matrix factorization model predicting `r(u, i) = p_u . q_i`.
#[derive(Clone, Debug)]
pub struct MatrixFactorization {
    hyper: Hyperparameters,
    rng: XorShiftRng,
    model: Option<Parameters>,
}

impl Default for MatrixFactorization {
    fn default() -> Self {
        Hyperparameters::new(16).build()
    }
}

/// Check that every grade in `data` indexes a positive entry of `pscore`.
fn check_propensities(data: &Interactions, pscore: &[f32]) -> Result<(), FittingError> {
    for (idx, &value) in pscore.iter().enumerate() {
        if !(value > 0.0) {
            return Err(FittingError::NonPositivePropensity {
                grade: idx + 1,
                value,
            });
        }
    }

    for interaction in data.data() {
        match interaction.relevance() {
            0 => return Err(FittingError::ZeroRelevance),
            grade if grade > pscore.len() => {
                return Err(FittingError::MissingPropensity {
                    grade,
                    len: pscore.len(),
                })
            }
            _ => {}
        }
    }

    Ok(())
}

impl MatrixFactorization {
    /// Build a model from hyperparameters.
    pub fn new(hyper: Hyperparameters) -> Self {
        hyper.build()
    }

    /// The hyperparameters.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    /// Where the model is in its lifecycle.
    pub fn state(&self) -> FitState {
        match self.model {
            None => FitState::Uninitialized,
            Some(ref model) if model.epochs_trained == 0 => FitState::Initialized,
            Some(_) => FitState::Trained,
        }
    }

    /// Number of users with a representation.
    pub fn num_users(&self) -> Option<usize> {
        self.model.as_ref().map(|model| model.user_embedding.nrows())
    }

    /// Number of items with a representation.
    pub fn num_items(&self) -> Option<usize> {
        self.model.as_ref().map(|model| model.item_embedding.nrows())
    }

    /// User vectors, `(num_users, latent_dim)`.
    pub fn user_embeddings(&self) -> Option<ArrayView2<f32>> {
        self.model.as_ref().map(|model| model.user_embedding.view())
    }

    /// Item vectors, `(num_items, latent_dim)`.
    pub fn item_embeddings(&self) -> Option<ArrayView2<f32>> {
        self.model.as_ref().map(|model| model.item_embedding.view())
    }

    /// Fit on `train`, tracking validation and test error after every epoch.
    ///
    /// `pscore[r - 1]` is the propensity of relevance grade `r`. Without it
    /// every grade gets propensity 1, which is the naive estimator. All
    /// training and validation grades must be at least 1 and covered by
    /// the table, and every propensity must be positive.
    ///
    /// Parameters are reinitialized on every call.
    pub fn fit(
        &mut self,
        train: &Interactions,
        validation: &Interactions,
        test: &Interactions,
        pscore: Option<&[f32]>,
    ) -> Result<FitHistory, FittingError> {
        if train.is_empty() {
            return Err(FittingError::NoInteractions);
        }

        let pscore: Vec<f32> = match pscore {
            Some(pscore) => pscore.to_vec(),
            None => {
                let max_relevance: Relevance = cmp::max(
                    train.max_relevance().unwrap_or(1),
                    validation.max_relevance().unwrap_or(1),
                );
                vec![1.0; max_relevance]
            }
        };

        check_propensities(train, &pscore)?;
        check_propensities(validation, &pscore)?;

        let num_users = cmp::max(train.num_users(), cmp::max(validation.num_users(), test.num_users()));
        let num_items = cmp::max(train.num_items(), cmp::max(validation.num_items(), test.num_items()));

        debug!(
            "Fitting {} users x {} items on {} interactions, propensities {:?}",
            num_users,
            num_items,
            train.len(),
            pscore
        );

        let mut model = Parameters::new(num_users, num_items, self.hyper.latent_dim, &mut self.rng);

        let validation_truth: Vec<f32> = validation.data().iter().map(|x| x.relevance() as f32).collect();
        let validation_weights: Vec<f32> = validation
            .data()
            .iter()
            .map(|x| 1.0 / pscore[x.relevance() - 1])
            .collect();
        let test_truth: Vec<f32> = test.data().iter().map(|x| x.relevance() as f32).collect();

        let mut rows = train.data().to_vec();
        let mut history = FitHistory::default();

        for epoch in 0..self.hyper.num_epochs {
            rows.shuffle(&mut self.rng);

            for row in &rows {
                model.step(row, &pscore, self.hyper.l2_penalty, &self.hyper.adam);
            }

            model.epochs_trained += 1;

            let validation_loss = mean_squared_error(
                &validation_truth,
                &model.predict(validation.data()),
                Some(&validation_weights),
            );
            let test_loss = mean_squared_error(&test_truth, &model.predict(test.data()), None);

            info!(
                "Epoch {}: validation loss {:.5}, test loss {:.5}",
                epoch, validation_loss, test_loss
            );

            history.validation_loss.push(validation_loss);
            history.test_loss.push(test_loss);
        }

        self.model = Some(model);

        Ok(history)
    }

    fn fitted(&self) -> Result<&Parameters, PredictionError> {
        self.model.as_ref().ok_or(PredictionError::NotFitted)
    }

    /// Predicted relevance of a single user-item pair.
    pub fn predict_pair(&self, user_id: UserId, item_id: ItemId) -> Result<f32, PredictionError> {
        let model = self.fitted()?;

        if user_id >= model.user_embedding.nrows() {
            return Err(PredictionError::UnknownUser(user_id));
        }
        if item_id >= model.item_embedding.nrows() {
            return Err(PredictionError::UnknownItem(item_id));
        }

        let prediction = model.predict_pair(user_id, item_id);

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }

    /// Predicted relevance for every row of `data`. Does not mutate the model.
    pub fn predict(&self, data: &Interactions) -> Result<Vec<f32>, PredictionError> {
        data.data()
            .iter()
            .map(|x| self.predict_pair(x.user_id(), x.item_id()))
            .collect()
    }
}
