//! Interaction and ranking datasets.
use std::cmp;

use ndarray::{s, Array2, Array3, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use super::{ItemId, Relevance, UserId};

/// A single explicit-feedback observation.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Interaction {
    user_id: UserId,
    item_id: ItemId,
    relevance: Relevance,
}

impl Interaction {
    /// Build a new interaction.
    pub fn new(user_id: UserId, item_id: ItemId, relevance: Relevance) -> Self {
        Interaction {
            user_id,
            item_id,
            relevance,
        }
    }

    /// The user id.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The item id.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// The relevance grade.
    pub fn relevance(&self) -> Relevance {
        self.relevance
    }
}

/// Shuffle `interactions` and split off `test_fraction` of them as the
/// second half of the returned pair. Both halves keep the original shape.
pub fn train_test_split<R: Rng>(
    interactions: &mut Interactions,
    rng: &mut R,
    test_fraction: f32,
) -> (Interactions, Interactions) {
    interactions.shuffle(rng);

    let (test, train) = interactions.split_at((test_fraction * interactions.len() as f32) as usize);

    (train, test)
}

/// A collection of interactions together with the size of the user and
/// item id spaces they live in.
#[derive(Clone, Debug)]
pub struct Interactions {
    num_users: usize,
    num_items: usize,
    interactions: Vec<Interaction>,
}

impl Interactions {
    /// An empty collection with the given shape.
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Interactions {
            num_users,
            num_items,
            interactions: Vec::new(),
        }
    }

    /// Add an interaction, growing the shape if needed.
    pub fn push(&mut self, interaction: Interaction) {
        self.num_users = cmp::max(self.num_users, interaction.user_id() + 1);
        self.num_items = cmp::max(self.num_items, interaction.item_id() + 1);
        self.interactions.push(interaction);
    }

    /// The underlying interactions.
    pub fn data(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether there are no interactions.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Shuffle the interactions in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.interactions.shuffle(rng);
    }

    /// Split at `idx`, keeping the shape on both halves.
    pub fn split_at(&self, idx: usize) -> (Self, Self) {
        let head = Interactions {
            num_users: self.num_users,
            num_items: self.num_items,
            interactions: self.interactions[..idx].to_owned(),
        };
        let tail = Interactions {
            num_users: self.num_users,
            num_items: self.num_items,
            interactions: self.interactions[idx..].to_owned(),
        };

        (head, tail)
    }

    /// Largest relevance grade present, if any.
    pub fn max_relevance(&self) -> Option<Relevance> {
        self.interactions.iter().map(|x| x.relevance()).max()
    }

    /// Count of interactions per relevance grade, indexed by grade.
    pub fn relevance_counts(&self, max_relevance: Relevance) -> Vec<usize> {
        let mut counts = vec![0; max_relevance + 1];

        for interaction in &self.interactions {
            if let Some(count) = counts.get_mut(interaction.relevance()) {
                *count += 1;
            }
        }

        counts
    }

    /// Widen the shape so that both `self` and `other` fit inside it.
    pub fn align_shape(&mut self, other: &mut Interactions) {
        let num_users = cmp::max(self.num_users, other.num_users);
        let num_items = cmp::max(self.num_items, other.num_items);

        self.num_users = num_users;
        self.num_items = num_items;
        other.num_users = num_users;
        other.num_items = num_items;
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// `(num_users, num_items)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }
}

impl From<Vec<Interaction>> for Interactions {
    fn from(data: Vec<Interaction>) -> Interactions {
        let num_users = data.iter().map(|x| x.user_id() + 1).max().unwrap_or(0);
        let num_items = data.iter().map(|x| x.item_id() + 1).max().unwrap_or(0);

        Interactions {
            num_users,
            num_items,
            interactions: data,
        }
    }
}

/// One query: a list of candidate documents with their features and
/// ground-truth relevance grades, in logged display order.
#[derive(Clone, Debug)]
pub struct Query {
    /// Document features, `(num_docs, num_features)`.
    pub features: Array2<f32>,
    /// Relevance grade per document.
    pub relevance: Vec<Relevance>,
}

impl Query {
    /// Build a query. `features` must have one row per relevance grade.
    pub fn new(features: Array2<f32>, relevance: Vec<Relevance>) -> Self {
        debug_assert_eq!(features.nrows(), relevance.len());
        Query {
            features,
            relevance,
        }
    }

    /// Number of documents.
    pub fn num_docs(&self) -> usize {
        self.relevance.len()
    }
}

/// A query-grouped learning-to-rank dataset.
#[derive(Clone, Debug)]
pub struct RankingDataset {
    num_features: usize,
    queries: Vec<Query>,
}

impl RankingDataset {
    /// Build a dataset from queries sharing `num_features` feature columns.
    pub fn new(num_features: usize, queries: Vec<Query>) -> Self {
        RankingDataset {
            num_features,
            queries,
        }
    }

    /// The queries.
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether there are no queries.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Feature dimension.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Append zero-valued feature columns up to `num_features`. Narrower
    /// targets leave the dataset unchanged.
    pub fn pad_features(&mut self, num_features: usize) {
        if num_features <= self.num_features {
            return;
        }

        for query in &mut self.queries {
            let mut features = Array2::zeros((query.num_docs(), num_features));
            features
                .slice_mut(s![.., ..query.features.ncols()])
                .assign(&query.features);
            query.features = features;
        }

        self.num_features = num_features;
    }

    /// Pad both datasets to the wider of the two feature dimensions.
    pub fn align_features(&mut self, other: &mut RankingDataset) {
        let num_features = cmp::max(self.num_features, other.num_features);

        self.pad_features(num_features);
        other.pad_features(num_features);
    }

    /// A freshly shuffled visiting order over the queries.
    pub fn shuffled_order<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.queries.len()).collect();
        order.shuffle(rng);
        order
    }

    /// Iterate over padded minibatches visiting queries in `order`.
    pub fn iter_minibatch<'a>(
        &'a self,
        order: &'a [usize],
        minibatch_size: usize,
    ) -> RankingMinibatchIterator<'a> {
        RankingMinibatchIterator {
            dataset: self,
            order,
            idx: 0,
            minibatch_size,
        }
    }
}

/// A padded batch of queries.
///
/// Every query is padded to the longest one in the batch; padded
/// documents have zero features and relevance 0 and must be excluded
/// using `num_docs`.
#[derive(Clone, Debug)]
pub struct RankingBatch {
    /// `(batch, docs, num_features)`.
    pub features: Array3<f32>,
    /// `(batch, docs)`.
    pub relevance: Array2<Relevance>,
    /// Number of valid documents per query.
    pub num_docs: Vec<usize>,
}

impl RankingBatch {
    /// Collate queries into a single padded batch.
    pub fn collate(queries: &[&Query], num_features: usize) -> Self {
        let max_docs = queries.iter().map(|q| q.num_docs()).max().unwrap_or(0);

        let mut features = Array3::zeros((queries.len(), max_docs, num_features));
        let mut relevance = Array2::zeros((queries.len(), max_docs));
        let mut num_docs = Vec::with_capacity(queries.len());

        for (query, mut features_row, mut relevance_row) in izip!(
            queries,
            features.axis_iter_mut(Axis(0)),
            relevance.axis_iter_mut(Axis(0))
        ) {
            let n = query.num_docs();
            features_row
                .slice_mut(s![..n, ..])
                .assign(&query.features);
            for (dst, &src) in relevance_row.iter_mut().zip(&query.relevance) {
                *dst = src;
            }
            num_docs.push(n);
        }

        RankingBatch {
            features,
            relevance,
            num_docs,
        }
    }

    /// Number of queries in the batch.
    pub fn len(&self) -> usize {
        self.num_docs.len()
    }

    /// Whether the batch holds no queries.
    pub fn is_empty(&self) -> bool {
        self.num_docs.is_empty()
    }
}

/// Iterator over padded minibatches. The final batch may be smaller.
#[derive(Clone, Debug)]
pub struct RankingMinibatchIterator<'a> {
    dataset: &'a RankingDataset,
    order: &'a [usize],
    idx: usize,
    minibatch_size: usize,
}

impl<'a> Iterator for RankingMinibatchIterator<'a> {
    type Item = RankingBatch;
    fn next(&mut self) -> Option<Self::Item> {
        if self.minibatch_size == 0 || self.idx >= self.order.len() {
            return None;
        }

        let stop = cmp::min(self.idx + self.minibatch_size, self.order.len());
        let queries: Vec<&Query> = self.order[self.idx..stop]
            .iter()
            .map(|&q| &self.dataset.queries[q])
            .collect();

        self.idx = stop;

        Some(RankingBatch::collate(&queries, self.dataset.num_features))
    }
}
