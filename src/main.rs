//! Command-line interface for SRU++ streaming encoders and the text classifier.
//!
//! `train` runs the sentence classification benchmark, `stream` pushes random
//! input through an encoder chunk by chunk and compares against a one-shot
//! run, and `describe` prints the layer layout of a configured encoder.

use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn::module::Module;
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Parser, Subcommand};
use sruppt::config::load_config;
use sruppt::data::Dataset;
use sruppt::perf;
use sruppt::training::{run_training, TrainConfig};
use sruppt::{ClassifierConfig, EncoderConfig, Incremental, SruppEncoder, StreamingSession};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

type CpuBackend = NdArray<f32>;
type TrainBackend = Autodiff<CpuBackend>;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "sruppt")]
#[command(about = "SRU++ transducer cells with chunked streaming", long_about = None)]
struct Cli {
    /// Print performance summary at the end of the run.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Train a sentence classifier.
    Train {
        /// Benchmark dataset: mr, subj, cr, mpqa, trec or sst.
        #[arg(long, default_value = "mr")]
        dataset: Dataset,
        /// Directory with the corpus files.
        #[arg(long)]
        path: PathBuf,
        /// Text-format word vectors.
        #[arg(long)]
        embedding: PathBuf,
        /// Directory for `all_scalars.json`.
        #[arg(long)]
        log: PathBuf,
        /// Optional YAML with a `classifier:` block; flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long = "batch-size", alias = "batch", default_value_t = 32)]
        batch_size: usize,
        #[arg(long, default_value_t = 10)]
        max_epoch: usize,
        /// Hidden size.
        #[arg(long)]
        d: Option<usize>,
        #[arg(long)]
        dropout: Option<f64>,
        #[arg(long)]
        depth: Option<usize>,
        /// Use attention transforms in every layer.
        #[arg(long)]
        attention: bool,
        #[arg(long, default_value_t = 0.001)]
        lr: f64,
        #[arg(long, default_value_t = 0.0)]
        lr_decay: f64,
        /// Cross-validation fold.
        #[arg(long, default_value_t = 0)]
        cv: usize,
        #[arg(long, default_value_t = sruppt::data::corpus::DEFAULT_SEED)]
        seed: u64,
    },
    /// Stream random input through an encoder and check it against a full run.
    Stream {
        /// Model configuration YAML.
        #[arg(long)]
        config: PathBuf,
        /// Total timesteps.
        #[arg(long, default_value_t = 32)]
        steps: usize,
        /// Timesteps per pushed chunk.
        #[arg(long, default_value_t = 4)]
        chunk: usize,
        /// Parallel streams.
        #[arg(long, default_value_t = 1)]
        batch: usize,
    },
    /// Print the layer layout of the configured encoder.
    Describe {
        /// Model configuration YAML.
        #[arg(long)]
        config: PathBuf,
    },
}

/// Entry point for the CLI.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sruppt=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let verbose = cli.verbose;
    let device = NdArrayDevice::default();

    match cli.command {
        Commands::Train {
            dataset,
            path,
            embedding,
            log,
            config,
            batch_size,
            max_epoch,
            d,
            dropout,
            depth,
            attention,
            lr,
            lr_decay,
            cv,
            seed,
        } => {
            let mut classifier = match config {
                Some(config) => load_config(config)?.classifier,
                None => ClassifierConfig::default(),
            };
            if let Some(d) = d {
                classifier.hidden_size = d;
            }
            if let Some(dropout) = dropout {
                classifier.dropout = dropout;
            }
            if let Some(depth) = depth {
                classifier.depth = depth;
            }
            classifier.has_attention |= attention;

            let train_config = TrainConfig {
                batch_size,
                max_epoch,
                lr,
                lr_decay,
                cv,
                seed,
                classifier,
                ..TrainConfig::new(dataset, path, embedding, log)
            };
            tracing::info!(?train_config, "starting training");
            let summary = run_training::<TrainBackend>(&train_config, &device)?;
            println!("best_valid: {:.6}", summary.best_valid);
            println!("test_err: {:.6}", summary.test_err);
            println!("scalars: {}", summary.scalars_path.display());
        }
        Commands::Stream {
            config,
            steps,
            chunk,
            batch,
        } => {
            let config = load_config(&config)?;
            run_stream(&config.encoder, steps, chunk, batch, &device)?;
        }
        Commands::Describe { config } => {
            let config = load_config(&config)?;
            let encoder = config
                .encoder
                .init::<CpuBackend>(&device)
                .context("building encoder")?;
            print!("{}", describe(&config.encoder, &encoder));
        }
    }

    if verbose {
        eprintln!("{}", perf::report());
    }

    Ok(())
}

fn run_stream(
    config: &EncoderConfig,
    steps: usize,
    chunk: usize,
    batch: usize,
    device: &NdArrayDevice,
) -> Result<()> {
    if chunk == 0 {
        anyhow::bail!("--chunk must be at least 1");
    }
    let encoder = config.init::<CpuBackend>(device)?;
    let input = Tensor::<CpuBackend, 3>::random(
        [steps, batch, config.input_size],
        Distribution::Normal(0.0, 1.0),
        device,
    );
    let full = encoder.forward(input.clone(), None, None, None, Incremental::Full)?;

    let mut session = StreamingSession::new(&encoder, batch, device);
    let mut outputs = Vec::new();
    let mut offset = 0;
    while offset < steps {
        let len = chunk.min(steps - offset);
        let hidden = session.push(input.clone().narrow(0, offset, len))?;
        println!(
            "chunk at {offset:>4}: pushed {len} emitted {} held {}",
            hidden.dims()[0],
            session.held_steps()
        );
        offset += len;
        outputs.push(hidden);
    }
    let tail = session.drain()?;
    println!("drain: emitted {}", tail.dims()[0]);
    outputs.push(tail);
    outputs.retain(|hidden| hidden.dims()[0] > 0);
    if outputs.is_empty() {
        println!("no steps emitted");
        return Ok(());
    }

    let streamed = Tensor::cat(outputs, 0);
    let max_diff = streamed
        .sub(full.hidden)
        .abs()
        .max()
        .into_scalar();
    println!(
        "emitted {} of {steps} steps, max |stream - full| = {max_diff:.3e}{}",
        session.emitted_steps(),
        if config.causal { "" } else { " (non-causal attention)" }
    );
    Ok(())
}

fn describe(config: &EncoderConfig, encoder: &SruppEncoder<CpuBackend>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "encoder: {} layers, input {}, hidden {}, causal {}\n",
        encoder.num_layers(),
        encoder.input_size,
        encoder.hidden_size,
        encoder.causal
    ));
    for (index, layer) in encoder.layers.iter().enumerate() {
        let cell = config.cell_config(index);
        out.push_str(&format!(
            "  layer {index}: {} transform, input {}, k={}, right_window {}\n",
            if layer.has_attention() { "attention" } else { "linear" },
            cell.input_size,
            cell.num_matrices(),
            layer.right_window()
        ));
    }
    out.push_str(&format!(
        "total_right_window: {}\nparameters: {}\n",
        encoder.total_right_window(),
        encoder.num_params()
    ));
    out
}
