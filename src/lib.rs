//! # sruppt - SRU++ transducer cells with chunked streaming
//!
//! A Rust implementation of SRU++ recurrent cells whose input projection is a
//! self-attention (or low-rank linear) transform, built on `burn`.
//!
//! ## Architecture Overview
//!
//! 1. **Transforms** ([`SruppAttention`], [`ProjectedLinear`]): map a chunk of
//!    input `(time, batch, features)` to the recurrence input `U`. In streaming
//!    mode they hold back the last `right_window` steps and cache keys and
//!    values of everything they released.
//!
//! 2. **Cell** ([`SruppCell`]): wraps a transform and runs the gated
//!    recurrence, threading an explicit carry `(batch, hidden)` between calls.
//!
//! 3. **Encoder** ([`SruppEncoder`]) and **session** ([`StreamingSession`]):
//!    stack cells and drive one stream chunk by chunk.
//!
//! 4. **Classifier** ([`TextClassifier`]) with the data pipeline and training
//!    loop used for the sentence classification benchmarks.
//!
//! ## Streaming
//!
//! ```no_run
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use burn::tensor::{Distribution, Tensor};
//! use sruppt::{EncoderConfig, StreamingSession};
//!
//! let device = NdArrayDevice::default();
//! let config = EncoderConfig {
//!     right_window: 2,
//!     causal: true,
//!     ..EncoderConfig::new(2, 16, 16, 8)
//! };
//! let encoder = config.init::<NdArray<f32>>(&device).unwrap();
//! let mut session = StreamingSession::new(&encoder, 1, &device);
//! for _ in 0..4 {
//!     let chunk = Tensor::random([3, 1, 16], Distribution::Default, &device);
//!     let hidden = session.push(chunk).unwrap();
//!     println!("released {} steps", hidden.dims()[0]);
//! }
//! let tail = session.drain().unwrap();
//! assert_eq!(session.held_steps(), 0);
//! # let _ = tail;
//! ```
//!
//! Chunked and one-shot runs agree when attention is causal: every released
//! step equals the matching step of a full-sequence call.

pub mod config;
pub mod data;
pub mod error;
pub mod perf;
pub mod scalars;
pub mod session;
pub mod training;

// Building blocks - public for integration tests and custom stacks.
#[doc(hidden)]
pub mod model;
#[doc(hidden)]
pub mod modules;
#[doc(hidden)]
pub mod state;

pub use config::{load_config, Config};
pub use error::{Error, ErrorKind, Result};
pub use model::classifier::{ClassifierConfig, ClassifierOutput, TextClassifier};
pub use model::encoder::{EncoderConfig, EncoderOutput, EncoderState, SruppEncoder};
pub use modules::attention::{AttentionConfig, AttentionState, SruppAttention};
pub use modules::cell::{CellConfig, CellOutput, CellState, SruppCell};
pub use modules::cursor::{ChunkCursor, CursorSplit};
pub use modules::linear::chunk_from_data;
pub use modules::projected::{LinearState, ProjectedLinear, ProjectedLinearConfig};
pub use modules::transform::{Transform, TransformModule, TransformState};
pub use session::StreamingSession;
pub use state::{Incremental, StreamingModule};
