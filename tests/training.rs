use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use sruppt::data::Dataset;
use sruppt::scalars::{ScalarLog, SCALARS_FILE};
use sruppt::training::{run_training, TrainConfig};
use sruppt::ClassifierConfig;
use std::fs;

type TrainBackend = Autodiff<NdArray<f32>>;

fn write_tiny_mr(dir: &std::path::Path) {
    let positive = ["a fine warm film", "great acting and story", "warm and funny"];
    let negative = ["a dull flat film", "bad acting and story", "flat and boring"];
    let mut lines = Vec::new();
    for round in 0..8 {
        lines.push(format!("1 {}", positive[round % positive.len()]));
        lines.push(format!("0 {}", negative[round % negative.len()]));
    }
    fs::write(dir.join("rt-polarity.all"), lines.join("\n")).unwrap();
    fs::write(
        dir.join("vectors.txt"),
        "4 3\nfilm 0.1 0.2 0.3\ngreat 0.9 0.1 0.0\nbad -0.9 0.1 0.0\nflat -0.5 0.0 0.2\n",
    )
    .unwrap();
}

#[test]
fn one_epoch_exports_scalars() {
    let dir = tempfile::tempdir().unwrap();
    write_tiny_mr(dir.path());
    let log_dir = dir.path().join("logs");

    let config = TrainConfig {
        batch_size: 4,
        max_epoch: 1,
        lr: 0.01,
        classifier: ClassifierConfig {
            hidden_size: 8,
            depth: 1,
            dropout: 0.0,
            ..ClassifierConfig::default()
        },
        ..TrainConfig::new(
            Dataset::Mr,
            dir.path().to_path_buf(),
            dir.path().join("vectors.txt"),
            log_dir.clone(),
        )
    };
    let device = NdArrayDevice::default();
    let summary = run_training::<TrainBackend>(&config, &device).unwrap();

    assert!(summary.iterations > 0);
    assert!((0.0..=1.0).contains(&summary.best_valid));
    assert!((0.0..=1.0).contains(&summary.test_err));
    assert_eq!(summary.scalars_path, log_dir.join(SCALARS_FILE));

    let log = ScalarLog::load(&summary.scalars_path).unwrap();
    let losses = log.get("train_loss").expect("train_loss series");
    assert_eq!(losses.len(), summary.iterations);
    assert!(losses.iter().all(|(_, loss)| loss.is_finite()));
}

#[test]
fn missing_corpus_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainConfig::new(
        Dataset::Subj,
        dir.path().to_path_buf(),
        dir.path().join("vectors.txt"),
        dir.path().join("logs"),
    );
    let device = NdArrayDevice::default();
    assert!(run_training::<TrainBackend>(&config, &device).is_err());
}
