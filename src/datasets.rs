//! Dataset loaders and synthetic data.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use failure::{self, Fail};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;

use super::data::{Interaction, Interactions, Query, RankingDataset};
use super::Relevance;

/// Dataset error types.
#[derive(Debug, Fail)]
pub enum DatasetError {
    /// A line could not be parsed.
    #[fail(display = "Malformed line {}: {}.", line, reason)]
    Malformed {
        /// 1-indexed line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// A relevance grade is outside `0..=max`.
    #[fail(
        display = "Relevance grade {} on line {} exceeds the maximum of {}.",
        grade, line, max
    )]
    InvalidRelevance {
        /// 1-indexed line number.
        line: usize,
        /// The offending grade.
        grade: Relevance,
        /// Largest accepted grade.
        max: Relevance,
    },
    /// The input holds no data.
    #[fail(display = "No data found.")]
    Empty,
}

fn malformed(line: usize, reason: &str) -> DatasetError {
    DatasetError::Malformed {
        line,
        reason: reason.to_owned(),
    }
}

/// Load interactions from a CSV file with a `user_id,item_id,relevance`
/// header.
pub fn load_interactions<P: AsRef<Path>>(path: P) -> Result<Interactions, failure::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let interactions: Vec<Interaction> = reader.deserialize().collect::<Result<Vec<_>, _>>()?;

    if interactions.is_empty() {
        return Err(DatasetError::Empty.into());
    }

    Ok(Interactions::from(interactions))
}

/// Load an SVMrank / LETOR formatted file.
///
/// See [`parse_svmrank`] for the format.
pub fn load_svmrank<P: AsRef<Path>>(
    path: P,
    max_relevance: Relevance,
    normalize: bool,
) -> Result<RankingDataset, failure::Error> {
    let file = File::open(path)?;
    parse_svmrank(BufReader::new(file), max_relevance, normalize)
}

struct RawDocument {
    relevance: Relevance,
    features: Vec<(usize, f32)>,
}

fn parse_line(
    line_number: usize,
    content: &str,
    max_relevance: Relevance,
) -> Result<(String, RawDocument), DatasetError> {
    let mut tokens = content.split_whitespace();

    let relevance: Relevance = tokens
        .next()
        .ok_or_else(|| malformed(line_number, "missing relevance"))?
        .parse()
        .map_err(|_| malformed(line_number, "relevance is not a non-negative integer"))?;

    if relevance > max_relevance {
        return Err(DatasetError::InvalidRelevance {
            line: line_number,
            grade: relevance,
            max: max_relevance,
        });
    }

    let qid = tokens
        .next()
        .and_then(|token| token.strip_prefix("qid:"))
        .ok_or_else(|| malformed(line_number, "missing qid"))?
        .to_owned();

    let features = tokens
        .map(|token| {
            let mut parts = token.splitn(2, ':');
            let index: usize = parts
                .next()
                .and_then(|x| x.parse().ok())
                .filter(|&x| x > 0)
                .ok_or_else(|| malformed(line_number, "feature ids must be positive integers"))?;
            let value: f32 = parts
                .next()
                .and_then(|x| x.parse().ok())
                .ok_or_else(|| malformed(line_number, "feature values must be numbers"))?;
            Ok((index, value))
        })
        .collect::<Result<Vec<_>, DatasetError>>()?;

    Ok((qid, RawDocument { relevance, features }))
}

/// Min-max scale every feature column within one query. Constant columns
/// become zero.
fn normalize_query(features: &mut Array2<f32>) {
    for mut column in features.axis_iter_mut(Axis(1)) {
        let min = column.fold(std::f32::INFINITY, |acc, &x| acc.min(x));
        let max = column.fold(std::f32::NEG_INFINITY, |acc, &x| acc.max(x));
        let range = max - min;

        column.mapv_inplace(|x| if range > 0.0 { (x - min) / range } else { 0.0 });
    }
}

/// Parse SVMrank / LETOR text: one document per line,
/// `<relevance> qid:<id> <feature>:<value> ... [# comment]`.
///
/// Consecutive lines with the same qid form one query, in file order.
/// Feature ids are 1-indexed; missing features are zero. With `normalize`
/// every feature is min-max scaled within its query.
pub fn parse_svmrank<R: BufRead>(
    reader: R,
    max_relevance: Relevance,
    normalize: bool,
) -> Result<RankingDataset, failure::Error> {
    let mut groups: Vec<(String, Vec<RawDocument>)> = Vec::new();
    let mut num_features = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let content = line.split('#').next().unwrap_or("").trim();

        if content.is_empty() {
            continue;
        }

        let (qid, document) = parse_line(idx + 1, content, max_relevance)?;

        num_features = document
            .features
            .iter()
            .map(|&(index, _)| index)
            .fold(num_features, usize::max);

        let starts_query = groups.last().map_or(true, |(last, _)| *last != qid);
        if starts_query {
            groups.push((qid, Vec::new()));
        }
        if let Some((_, documents)) = groups.last_mut() {
            documents.push(document);
        }
    }

    if groups.is_empty() {
        return Err(DatasetError::Empty.into());
    }

    let queries = groups
        .into_iter()
        .map(|(_, documents)| {
            let mut features = Array2::zeros((documents.len(), num_features));
            for (row, document) in documents.iter().enumerate() {
                for &(index, value) in &document.features {
                    features[[row, index - 1]] = value;
                }
            }
            if normalize {
                normalize_query(&mut features);
            }
            let relevance = documents.iter().map(|x| x.relevance).collect();
            Query::new(features, relevance)
        })
        .collect();

    Ok(RankingDataset::new(num_features, queries))
}

/// Generator of queries whose relevance is a noisy linear function of
/// uniform random features.
///
/// The weights are fixed when the generator is built, so every sample
/// (train and test alike) shares the same relevance function. Within every
/// query the noisy utility is min-max scaled and rounded onto
/// `0..=max_relevance`.
#[derive(Clone, Debug)]
pub struct SyntheticRanking {
    weights: Array1<f32>,
    max_relevance: Relevance,
    noise: f32,
}

impl SyntheticRanking {
    /// Draw weights uniformly from `[-1, 1)` for `num_features` features.
    pub fn new<R: Rng>(num_features: usize, max_relevance: Relevance, rng: &mut R) -> Self {
        let weights = Array1::from_shape_fn(num_features, |_| rng.gen_range(-1.0f32..1.0));
        Self::with_weights(weights, max_relevance)
    }

    /// Use the given weights.
    pub fn with_weights(weights: Array1<f32>, max_relevance: Relevance) -> Self {
        SyntheticRanking {
            weights,
            max_relevance,
            noise: 0.1,
        }
    }

    /// Set the amplitude of the uniform noise added to every utility.
    pub fn noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// The relevance weights.
    pub fn weights(&self) -> &Array1<f32> {
        &self.weights
    }

    /// Number of features of every sampled document.
    pub fn num_features(&self) -> usize {
        self.weights.len()
    }

    fn grade(&self, utility: &Array1<f32>) -> Vec<Relevance> {
        let min = utility.fold(std::f32::INFINITY, |acc, &x| acc.min(x));
        let max = utility.fold(std::f32::NEG_INFINITY, |acc, &x| acc.max(x));
        let range = max - min;

        utility
            .iter()
            .map(|&x| {
                if range > 0.0 {
                    ((x - min) / range * self.max_relevance as f32).round() as Relevance
                } else {
                    0
                }
            })
            .collect()
    }

    /// Sample `num_queries` queries of `num_docs` documents each.
    pub fn sample<R: Rng>(&self, num_queries: usize, num_docs: usize, rng: &mut R) -> RankingDataset {
        let num_features = self.num_features();
        let noise = self.noise;

        let queries = (0..num_queries)
            .map(|_| {
                let features = Array2::from_shape_fn((num_docs, num_features), |_| rng.gen::<f32>());
                let utility = features
                    .dot(&self.weights)
                    .mapv(|x| x + noise * rng.gen_range(-1.0f32..1.0));
                let relevance = self.grade(&utility);

                Query::new(features, relevance)
            })
            .collect();

        RankingDataset::new(num_features, queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use ndarray::arr1;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use tempfile::NamedTempFile;

    const SVMRANK: &str = "\
2 qid:1 1:0.5 3:1.0 # first
0 qid:1 1:1.5 2:2.0
4 qid:2 2:1.0

1 qid:2 1:3.0 2:5.0 3:1.0
";

    #[test]
    fn parses_svmrank() {
        let dataset = parse_svmrank(Cursor::new(SVMRANK), 4, false).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.num_features(), 3);

        let first = &dataset.queries()[0];
        assert_eq!(first.relevance, vec![2, 0]);
        assert_eq!(first.features[[0, 0]], 0.5);
        assert_eq!(first.features[[0, 1]], 0.0);
        assert_eq!(first.features[[0, 2]], 1.0);
        assert_eq!(first.features[[1, 1]], 2.0);

        let second = &dataset.queries()[1];
        assert_eq!(second.relevance, vec![4, 1]);
        assert_eq!(second.features[[1, 1]], 5.0);
    }

    #[test]
    fn normalizes_within_queries() {
        let dataset = parse_svmrank(Cursor::new(SVMRANK), 4, true).unwrap();

        let first = &dataset.queries()[0];
        assert_eq!(first.features[[0, 0]], 0.0);
        assert_eq!(first.features[[1, 0]], 1.0);
        assert_eq!(first.features[[1, 2]], 0.0);

        let second = &dataset.queries()[1];
        assert_eq!(second.features[[0, 1]], 0.0);
        assert_eq!(second.features[[1, 1]], 1.0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_svmrank(Cursor::new("5 qid:1 1:0.5\n"), 4, false).is_err());
        assert!(parse_svmrank(Cursor::new("1 1:0.5\n"), 4, false).is_err());
        assert!(parse_svmrank(Cursor::new("1 qid:1 0:0.5\n"), 4, false).is_err());
        assert!(parse_svmrank(Cursor::new("1 qid:1 1:abc\n"), 4, false).is_err());
        assert!(parse_svmrank(Cursor::new("# only a comment\n"), 4, false).is_err());
    }

    #[test]
    fn loads_interactions_from_csv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "user_id,item_id,relevance").unwrap();
        writeln!(file, "0,1,5").unwrap();
        writeln!(file, "2,0,3").unwrap();
        file.flush().unwrap();

        let data = load_interactions(file.path()).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.shape(), (3, 2));
        assert_eq!(data.data()[0], Interaction::new(0, 1, 5));
    }

    #[test]
    fn synthetic_relevance_spans_grades() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let dataset = SyntheticRanking::new(4, 4, &mut rng).sample(10, 20, &mut rng);

        assert_eq!(dataset.len(), 10);
        for query in dataset.queries() {
            assert_eq!(query.features.dim(), (20, 4));
            assert!(query.relevance.iter().all(|&r| r <= 4));
            assert!(query.relevance.contains(&0));
            assert!(query.relevance.contains(&4));
        }
    }

    #[test]
    fn synthetic_samples_share_relevance_function() {
        let mut rng = XorShiftRng::seed_from_u64(2);
        let generator = SyntheticRanking::with_weights(arr1(&[1.0, 0.0]), 4).noise(0.0);

        let train = generator.sample(8, 10, &mut rng);
        let test = generator.sample(8, 10, &mut rng);

        // Relevance is monotone in the first feature in every sample.
        for query in train.queries().iter().chain(test.queries()) {
            let mut order: Vec<usize> = (0..query.num_docs()).collect();
            order.sort_by(|&a, &b| {
                query.features[[a, 0]]
                    .partial_cmp(&query.features[[b, 0]])
                    .unwrap()
            });

            for pair in order.windows(2) {
                assert!(query.relevance[pair[0]] <= query.relevance[pair[1]]);
            }
        }
        assert_eq!(generator.weights(), &arr1(&[1.0, 0.0]));
    }

    #[test]
    fn generator_weights_are_drawn_once() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        let generator = SyntheticRanking::new(5, 4, &mut rng);
        let weights = generator.weights().clone();

        generator.sample(4, 6, &mut rng);
        generator.sample(4, 6, &mut rng);

        assert_eq!(generator.weights(), &weights);
        assert_eq!(generator.num_features(), 5);
        assert!(weights.iter().all(|&w| w >= -1.0 && w < 1.0));
    }
}
