//! Multi-layer perceptron scoring function.
//!
//! Maps each document's feature vector to a scalar score through fully
//! connected ELU layers and a linear output unit. Training builds a `wyrm`
//! graph of the scores and the weighted listwise loss for every batch and
//! applies `wyrm`'s Adam to the shared layer parameters.
use std::sync::Arc;

use ndarray::{s, Array1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use wyrm::optim::{Adam, Optimizer};
use wyrm::{Arr, BoxedNode, HogwildParameter, InputNode, ParameterNode, Variable};

use super::{ScoringFunction, Trainable};
use crate::data::RankingBatch;
use crate::loss::listwise_loss_node;

fn dense_init<R: Rng>(rows: usize, cols: usize, fan_in: usize, rng: &mut R) -> Arr {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    Arr::zeros((rows, cols)).map(|_| rng.gen_range(-bound..bound))
}

fn to_arr(features: ArrayView2<f32>) -> Arr {
    let mut arr = Arr::zeros(features.dim());
    for (dst, &src) in arr.iter_mut().zip(features.iter()) {
        *dst = src;
    }
    arr
}

/// `max(x, 0) - (1 - exp(min(x, 0)))`, which is ELU with unit scale.
fn elu(x: Variable<BoxedNode>) -> Variable<BoxedNode> {
    let positive = x.relu().boxed();
    let negative = (x - positive.clone()).exp();

    (positive - (1.0 - negative)).boxed()
}

/// Hyperparameters for [`MlpScorer`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameters {
    input_size: usize,
    hidden_layer_sizes: Vec<usize>,
    learning_rate: f32,
    random_state: u64,
}

impl Hyperparameters {
    /// An MLP over `input_size` features. With no hidden layers the model
    /// is linear.
    pub fn new(input_size: usize, hidden_layer_sizes: Vec<usize>) -> Self {
        Hyperparameters {
            input_size,
            hidden_layer_sizes,
            learning_rate: 0.001,
            random_state: 12345,
        }
    }

    /// Set the Adam step size.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the initialization seed.
    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    /// Build a freshly initialized model.
    pub fn build(self) -> MlpScorer {
        let mut rng = XorShiftRng::seed_from_u64(self.random_state);

        let mut sizes = vec![self.input_size];
        sizes.extend(&self.hidden_layer_sizes);
        sizes.push(1);

        let layers = sizes
            .windows(2)
            .map(|pair| Dense::new(pair[0], pair[1], &mut rng))
            .collect();

        MlpScorer {
            learning_rate: self.learning_rate,
            layers,
        }
    }
}

#[derive(Debug)]
struct Dense {
    weight: Arc<HogwildParameter>,
    bias: Arc<HogwildParameter>,
}

impl Clone for Dense {
    fn clone(&self) -> Self {
        Dense {
            weight: Arc::new(self.weight.as_ref().clone()),
            bias: Arc::new(self.bias.as_ref().clone()),
        }
    }
}

impl Dense {
    fn new<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        Dense {
            weight: Arc::new(HogwildParameter::new(dense_init(
                input_dim, output_dim, input_dim, rng,
            ))),
            bias: Arc::new(HogwildParameter::new(dense_init(
                1, output_dim, input_dim, rng,
            ))),
        }
    }
}

/// One graph's handles on the layer parameters.
struct LayerNodes {
    weight: Variable<ParameterNode>,
    bias: Variable<ParameterNode>,
}

/// A feed-forward scoring function.
#[derive(Clone, Debug)]
pub struct MlpScorer {
    learning_rate: f32,
    layers: Vec<Dense>,
}

impl MlpScorer {
    /// Number of layers, including the output layer.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    fn layer_nodes(&self) -> Vec<LayerNodes> {
        self.layers
            .iter()
            .map(|layer| LayerNodes {
                weight: ParameterNode::shared(layer.weight.clone()),
                bias: ParameterNode::shared(layer.bias.clone()),
            })
            .collect()
    }

    /// `(docs, 1)` score graph for one query.
    fn scores(&self, nodes: &[LayerNodes], features: ArrayView2<f32>) -> Variable<BoxedNode> {
        let ones = InputNode::new(Arr::ones((features.nrows(), 1)));
        let mut hidden = InputNode::new(to_arr(features)).boxed();

        for (idx, layer) in nodes.iter().enumerate() {
            let pre_activation = (hidden.dot(&layer.weight) + ones.dot(&layer.bias)).boxed();

            hidden = if idx + 1 < nodes.len() {
                elu(pre_activation)
            } else {
                pre_activation
            };
        }

        hidden
    }
}

impl ScoringFunction for MlpScorer {
    fn score(&self, features: ArrayView2<f32>) -> Array1<f32> {
        if features.nrows() == 0 {
            return Array1::zeros(0);
        }

        let output = self.scores(&self.layer_nodes(), features);
        output.forward();

        let scores = Array1::from_iter(output.value().iter().cloned());
        scores
    }
}

impl Trainable for MlpScorer {
    fn listwise_step(&mut self, batch: &RankingBatch, weights: ArrayView2<f32>) -> f32 {
        let nodes = self.layer_nodes();

        let mut query_losses = izip!(
            batch.features.outer_iter(),
            weights.outer_iter(),
            &batch.num_docs
        )
        .filter(|&(_, _, &num_docs)| num_docs > 0)
        .map(|(features, query_weights, &num_docs)| {
            let features = features.slice(s![..num_docs, ..]);
            let shift = self
                .score(features)
                .fold(std::f32::NEG_INFINITY, |acc, &x| acc.max(x));
            let query_weights = query_weights.slice(s![..num_docs]).to_vec();

            listwise_loss_node(&self.scores(&nodes, features), &query_weights, shift)
        });

        let mut loss = match query_losses.next() {
            Some(first) => query_losses.fold(first, |total, query| (total + query).boxed()),
            None => return 0.0,
        };

        let batch_size = batch.len() as f32;

        loss.forward();
        loss.backward(1.0 / batch_size);

        let value: f32 = loss.value().iter().sum();

        let parameters: Vec<_> = nodes
            .into_iter()
            .flat_map(|layer| vec![layer.weight, layer.bias])
            .collect();
        Adam::new()
            .learning_rate(self.learning_rate)
            .step(&parameters);

        value / batch_size
    }
}
