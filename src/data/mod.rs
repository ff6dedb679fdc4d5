//! Text classification data: corpus readers, word vectors and batching.

pub mod batch;
pub mod corpus;
pub mod embedding;

pub use batch::{create_batches, Batch};
pub use corpus::{clean_str, load_dataset, make_splits, Corpus, Dataset, RawDataset, Splits};
pub use embedding::{load_word_vectors, EmbeddingTable, Vocabulary, WordVectors};
