//! Classifier training: Adam over left-padded batches, per-epoch validation,
//! test error at the best validation point and a JSON scalar export.

use crate::data::{
    create_batches, load_dataset, load_word_vectors, make_splits, Batch, Corpus, Dataset,
    EmbeddingTable,
};
use crate::model::classifier::{ClassifierConfig, TextClassifier};
use crate::perf::{self, Metric};
use crate::scalars::ScalarLog;
use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::ElementConversion;
use std::path::PathBuf;

/// Everything a training run needs.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub dataset: Dataset,
    /// Directory holding the corpus files.
    pub data_dir: PathBuf,
    /// Text-format word vectors.
    pub embedding: PathBuf,
    /// Directory receiving `all_scalars.json`.
    pub log_dir: PathBuf,
    pub batch_size: usize,
    pub max_epoch: usize,
    pub lr: f64,
    /// Multiplier applied to the learning rate after each epoch; 0 disables decay.
    pub lr_decay: f64,
    /// Cross-validation fold.
    pub cv: usize,
    pub seed: u64,
    pub classifier: ClassifierConfig,
}

impl TrainConfig {
    pub fn new(dataset: Dataset, data_dir: PathBuf, embedding: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            dataset,
            data_dir,
            embedding,
            log_dir,
            batch_size: 32,
            max_epoch: 10,
            lr: 0.001,
            lr_decay: 0.0,
            cv: 0,
            seed: crate::data::corpus::DEFAULT_SEED,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Batches and embeddings ready for training.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub table: EmbeddingTable,
    pub num_classes: usize,
    pub train: Vec<Batch>,
    pub valid: Vec<Batch>,
    pub test: Vec<Batch>,
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub best_valid: f64,
    /// Test error measured when validation error last improved.
    pub test_err: f64,
    pub iterations: usize,
    pub scalars: ScalarLog,
    pub scalars_path: PathBuf,
}

/// Read the corpus and word vectors, split, and batch.
pub fn prepare_data(config: &TrainConfig) -> Result<PreparedData> {
    let raw = load_dataset(config.dataset, &config.data_dir, config.seed)?;
    let vectors = load_word_vectors(&config.embedding)?;
    let table = EmbeddingTable::build(&vectors, raw.all_sentences(), config.seed);
    let splits = make_splits(raw, config.cv, config.seed)?;
    let num_classes = splits.train.num_classes();
    if num_classes < 2 {
        bail!("training set has {num_classes} classes; need at least 2");
    }
    tracing::info!(
        dataset = %config.dataset,
        vocab = table.vocab.len(),
        train = splits.train.len(),
        valid = splits.valid.len(),
        test = splits.test.len(),
        "prepared data"
    );

    let sort = config.dataset.sort_batches();
    let batch = |corpus: &Corpus| create_batches(corpus, config.batch_size, &table.vocab, sort, config.seed);
    let (train, valid, test) = (
        batch(&splits.train),
        batch(&splits.valid),
        batch(&splits.test),
    );
    Ok(PreparedData {
        num_classes,
        train,
        valid,
        test,
        table,
    })
}

/// Error rate of `model` over `batches`.
pub fn evaluate<B: Backend>(
    model: &TextClassifier<B>,
    batches: &[Batch],
    device: &B::Device,
) -> Result<f64> {
    let _span = perf::span(Metric::TrainEvaluate);
    let mut errors = 0usize;
    let mut total = 0usize;
    for batch in batches {
        let (tokens, labels) = batch.to_tensors::<B>(device);
        errors += model.count_errors(tokens, labels)?;
        total += batch.batch;
    }
    if total == 0 {
        bail!("cannot evaluate on an empty set");
    }
    Ok(errors as f64 / total as f64)
}

/// Train a classifier on prepared data.
pub fn train<B: AutodiffBackend>(
    config: &TrainConfig,
    data: &PreparedData,
    device: &B::Device,
) -> Result<TrainSummary> {
    let mut model: TextClassifier<B> =
        config
            .classifier
            .init(data.table.to_tensor(device), data.num_classes, device)?;
    let mut optim = AdamConfig::new().init();
    let mut scalars = ScalarLog::new();
    let mut lr = config.lr;
    let mut best_valid = f64::INFINITY;
    let mut test_err = f64::INFINITY;
    let mut niter = 0usize;

    for epoch in 0..config.max_epoch {
        let mut train_loss = f64::NAN;
        for batch in &data.train {
            let _span = perf::span(Metric::TrainStep);
            niter += 1;
            let (tokens, labels) = batch.to_tensors::<B>(device);
            let (loss, _) = model.forward_loss(tokens, labels)?;
            train_loss = loss.clone().into_scalar().elem::<f64>();
            scalars.add("train_loss", niter, train_loss);
            perf::add_count(Metric::TrainExamples, batch.batch as u64);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);
            tracing::debug!(iter = niter, loss = train_loss, "train step");
        }

        let valid_model = model.valid();
        let valid_err = evaluate(&valid_model, &data.valid, device)?;
        scalars.add("valid_err", niter, valid_err);
        tracing::info!(
            "Epoch={} iter={} lr={:.6} train_loss={:.6} valid_err={:.6}",
            epoch,
            niter,
            lr,
            train_loss,
            valid_err
        );

        if valid_err < best_valid {
            best_valid = valid_err;
            test_err = evaluate(&valid_model, &data.test, device)?;
            scalars.add("test_err", niter, test_err);
        }
        if config.lr_decay > 0.0 {
            lr *= config.lr_decay;
        }
    }

    tracing::info!("best_valid: {:.6}", best_valid);
    tracing::info!("test_err: {:.6}", test_err);
    let scalars_path = scalars.export(&config.log_dir)?;
    Ok(TrainSummary {
        best_valid,
        test_err,
        iterations: niter,
        scalars,
        scalars_path,
    })
}

/// Load data and train in one call.
pub fn run_training<B: AutodiffBackend>(config: &TrainConfig, device: &B::Device) -> Result<TrainSummary> {
    let data = prepare_data(config)?;
    train::<B>(config, &data, device)
}
