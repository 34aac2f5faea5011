#[macro_use]
extern crate criterion;

extern crate ndarray;
extern crate rand;
extern crate rand_xorshift;
extern crate unbiased_rec;

use criterion::Criterion;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use unbiased_rec::data::{train_test_split, Interaction, Interactions};
use unbiased_rec::datasets::SyntheticRanking;
use unbiased_rec::loss::listwise_loss;
use unbiased_rec::models::factorization::Hyperparameters;
use unbiased_rec::models::mlp;
use unbiased_rec::models::ranker::{train_ranker, TrainingConfig};
use unbiased_rec::models::Estimator;

fn random_ratings<R: Rng>(num_users: usize, num_items: usize, sample_size: usize, rng: &mut R) -> Interactions {
    let interactions: Vec<Interaction> = (0..sample_size)
        .map(|_| {
            Interaction::new(
                rng.gen_range(0..num_users),
                rng.gen_range(0..num_items),
                rng.gen_range(1..=5),
            )
        })
        .collect();

    Interactions::from(interactions)
}

fn bench_factorization(c: &mut Criterion) {
    c.bench_function("factorization", |b| {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let mut data = random_ratings(500, 500, 20_000, &mut rng);
        let (train, validation) = train_test_split(&mut data, &mut rng, 0.1);
        let pscore = vec![0.05, 0.1, 0.2, 0.3, 0.4];

        let mut model = Hyperparameters::new(16).num_epochs(1).build();

        b.iter(|| {
            model.fit(&train, &validation, &validation, Some(pscore.as_slice())).unwrap();
        })
    });
}

fn bench_listwise_loss(c: &mut Criterion) {
    c.bench_function("listwise_loss", |b| {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let scores = Array2::from_shape_fn((32, 100), |_| rng.gen::<f32>());
        let clicks = Array2::from_shape_fn((32, 100), |_| if rng.gen::<f32>() < 0.1 { 1.0 } else { 0.0 });
        let propensity = Array1::from_shape_fn(100, |idx| 0.9 / (idx + 1) as f32);
        let num_docs = vec![100; 32];

        b.iter(|| listwise_loss(scores.view(), clicks.view(), &num_docs, Some(propensity.view())))
    });
}

fn bench_ranker(c: &mut Criterion) {
    c.bench_function("ranker", |b| {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let generator = SyntheticRanking::new(20, 4, &mut rng);
        let train = generator.sample(256, 50, &mut rng);
        let test = generator.sample(64, 50, &mut rng);

        let mut model = mlp::Hyperparameters::new(20, vec![10, 5]).build();
        let config = TrainingConfig::new().num_epochs(1);

        b.iter(|| {
            train_ranker(&mut model, Estimator::Ips, &train, &test, &config).unwrap();
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_factorization, bench_listwise_loss, bench_ranker
}
criterion_main!(benches);
