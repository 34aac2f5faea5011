extern crate clap;
extern crate env_logger;
extern crate failure;
#[macro_use]
extern crate log;
extern crate serde;
extern crate serde_json;
extern crate unbiased_rec;
#[macro_use]
extern crate serde_derive;

use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;

use unbiased_rec::datasets::load_svmrank;
use unbiased_rec::models::mlp;
use unbiased_rec::models::ranker::{train_platform_ranker, TrainingConfig};
use unbiased_rec::models::{Objective, PlatformEstimator};

/// Train a listwise MLP ranker on conversions simulated under
/// recommendation exposure and report the test nDCG@k per epoch.
#[derive(Parser, Debug)]
struct Args {
    /// SVMrank formatted training queries.
    #[arg(long)]
    train: PathBuf,
    /// SVMrank formatted test queries.
    #[arg(long)]
    test: PathBuf,
    /// One of naive, ips-via-rec, ips-platform.
    #[arg(long, default_value = "ips-platform")]
    estimator: String,
    /// One of via-rec, platform.
    #[arg(long, default_value = "platform")]
    objective: String,
    #[arg(long, default_value_t = 4)]
    max_relevance: usize,
    #[arg(long, value_delimiter = ',', default_value = "10,5")]
    hidden_layer_sizes: Vec<usize>,
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    #[arg(long, default_value_t = 30)]
    num_epochs: usize,
    #[arg(long, default_value_t = 10)]
    k: usize,
    #[arg(long, default_value_t = 12345)]
    random_state: u64,
    /// Also write the results as JSON here.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Run {
    estimator: PlatformEstimator,
    objective: Objective,
    elapsed: Duration,
    test_ndcg: Vec<f32>,
    config: TrainingConfig,
    hyperparameters: mlp::Hyperparameters,
}

fn main() -> Result<(), failure::Error> {
    env_logger::init();
    let args = Args::parse();

    let estimator: PlatformEstimator = args.estimator.parse()?;
    let objective: Objective = args.objective.parse()?;

    let mut train = load_svmrank(&args.train, args.max_relevance, true)?;
    let mut test = load_svmrank(&args.test, args.max_relevance, true)?;

    if train.num_features() != test.num_features() {
        warn!(
            "Train data has {} features but test data has {}, padding with zeros",
            train.num_features(),
            test.num_features()
        );
        train.align_features(&mut test);
    }

    info!(
        "{} train and {} test queries with {} features",
        train.len(),
        test.len(),
        train.num_features()
    );

    let config = TrainingConfig::new()
        .batch_size(args.batch_size)
        .num_epochs(args.num_epochs)
        .k(args.k)
        .random_state(args.random_state);

    let hyper = mlp::Hyperparameters::new(train.num_features(), args.hidden_layer_sizes.clone())
        .learning_rate(args.learning_rate)
        .random_state(args.random_state);
    let mut model = hyper.clone().build();

    let start = Instant::now();
    let test_ndcg = train_platform_ranker(&mut model, estimator, objective, &train, &test, &config)?;
    let elapsed = start.elapsed();

    info!(
        "{} / {}: final nDCG@{} {:?}",
        estimator,
        objective,
        args.k,
        test_ndcg.last()
    );

    let run = Run {
        estimator,
        objective,
        elapsed,
        test_ndcg,
        config,
        hyperparameters: hyper,
    };

    println!("{}", serde_json::to_string_pretty(&run)?);

    if let Some(path) = args.output {
        serde_json::to_writer_pretty(File::create(path)?, &run)?;
    }

    Ok(())
}
