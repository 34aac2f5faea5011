extern crate clap;
extern crate env_logger;
extern crate failure;
#[macro_use]
extern crate log;
extern crate rand;
extern crate rand_xorshift;
extern crate serde;
extern crate serde_json;
extern crate unbiased_rec;
#[macro_use]
extern crate serde_derive;

use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use unbiased_rec::data::train_test_split;
use unbiased_rec::datasets::load_interactions;
use unbiased_rec::models::factorization::{self, FitHistory};
use unbiased_rec::propensity::estimate_relevance_propensity;

/// Fit rating matrix factorization on missing-not-at-random data, with and
/// without inverse propensity weighting, and report test MSE per epoch.
#[derive(Parser, Debug)]
struct Args {
    /// CSV of biased (user-selected) ratings, `user_id,item_id,relevance`.
    #[arg(long)]
    train: PathBuf,
    /// CSV of ratings collected uniformly at random.
    #[arg(long)]
    test: PathBuf,
    /// Fraction of the biased data held out for validation.
    #[arg(long, default_value_t = 0.1)]
    validation_fraction: f32,
    /// Fraction of the random data used to estimate propensities.
    #[arg(long, default_value_t = 0.05)]
    propensity_fraction: f32,
    #[arg(long, default_value_t = 5)]
    max_relevance: usize,
    #[arg(long, default_value_t = 10)]
    latent_dim: usize,
    #[arg(long, default_value_t = 10)]
    num_epochs: usize,
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,
    #[arg(long, default_value_t = 1e-5)]
    l2_penalty: f32,
    #[arg(long, default_value_t = 12345)]
    random_state: u64,
    /// Also write the results as JSON here.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Run {
    estimator: String,
    elapsed: Duration,
    history: FitHistory,
    hyperparameters: factorization::Hyperparameters,
}

fn main() -> Result<(), failure::Error> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = XorShiftRng::seed_from_u64(args.random_state);

    let mut biased = load_interactions(&args.train)?;
    let mut unbiased = load_interactions(&args.test)?;
    biased.align_shape(&mut unbiased);

    let (train, validation) = train_test_split(&mut biased, &mut rng, args.validation_fraction);
    let (test, propensity_sample) = train_test_split(&mut unbiased, &mut rng, args.propensity_fraction);

    info!(
        "{} train, {} validation, {} test and {} propensity interactions",
        train.len(),
        validation.len(),
        test.len(),
        propensity_sample.len()
    );

    let pscore = estimate_relevance_propensity(&train, &propensity_sample, args.max_relevance)?;
    info!("Estimated propensities {:?}", pscore);

    let hyper = factorization::Hyperparameters::new(args.latent_dim)
        .learning_rate(args.learning_rate)
        .l2_penalty(args.l2_penalty)
        .num_epochs(args.num_epochs)
        .random_state(args.random_state);

    let mut runs = Vec::new();

    for (estimator, weights) in vec![("naive", None), ("ips", Some(pscore.as_slice()))] {
        let mut model = hyper.clone().build();

        let start = Instant::now();
        let history = model.fit(&train, &validation, &test, weights)?;
        let elapsed = start.elapsed();

        info!(
            "{}: final test MSE {:?} in {:?}",
            estimator,
            history.test_loss.last(),
            elapsed
        );

        runs.push(Run {
            estimator: estimator.to_owned(),
            elapsed,
            history,
            hyperparameters: hyper.clone(),
        });
    }

    println!("{}", serde_json::to_string_pretty(&runs)?);

    if let Some(path) = args.output {
        serde_json::to_writer_pretty(File::create(path)?, &runs)?;
    }

    Ok(())
}
