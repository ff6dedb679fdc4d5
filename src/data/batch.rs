//! Left-padded mini-batches of token ids.

use crate::data::corpus::Corpus;
use crate::data::embedding::Vocabulary;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One batch laid out time-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Row-major `(len, batch)` token ids; short sentences are padded on the left.
    pub tokens: Vec<i64>,
    pub labels: Vec<i64>,
    pub len: usize,
    pub batch: usize,
}

impl Batch {
    /// Pad and map one group of sentences.
    pub fn new(sentences: &[&[String]], labels: &[usize], vocab: &Vocabulary) -> Self {
        let batch = sentences.len();
        let len = sentences.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
        let pad = vocab.pad_id() as i64;
        let mut tokens = vec![pad; len * batch];
        for (column, sentence) in sentences.iter().enumerate() {
            let offset = len - sentence.len();
            for (step, word) in sentence.iter().enumerate() {
                tokens[(offset + step) * batch + column] = vocab.id(word) as i64;
            }
        }
        Self {
            tokens,
            labels: labels.iter().map(|&l| l as i64).collect(),
            len,
            batch,
        }
    }

    /// Token ids `(len, batch)` and labels `(batch)` on `device`.
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 2, Int>, Tensor<B, 1, Int>) {
        let tokens = TensorData::new(self.tokens.clone(), [self.len, self.batch]);
        let labels = TensorData::new(self.labels.clone(), [self.batch]);
        (
            Tensor::from_data(tokens, device),
            Tensor::from_data(labels, device),
        )
    }
}

/// Split a corpus into batches of `batch_size`.
///
/// With `sort` the examples are ordered by length first and the batch order is
/// shuffled with `seed` afterwards.
pub fn create_batches(
    corpus: &Corpus,
    batch_size: usize,
    vocab: &Vocabulary,
    sort: bool,
    seed: u64,
) -> Vec<Batch> {
    let mut order: Vec<usize> = (0..corpus.len()).collect();
    if sort {
        order.sort_by_key(|&i| corpus.sentences[i].len());
    }
    let mut batches: Vec<Batch> = order
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let sentences: Vec<&[String]> =
                chunk.iter().map(|&i| corpus.sentences[i].as_slice()).collect();
            let labels: Vec<usize> = chunk.iter().map(|&i| corpus.labels[i]).collect();
            Batch::new(&sentences, &labels, vocab)
        })
        .collect();
    if sort {
        batches.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn corpus() -> Corpus {
        Corpus {
            sentences: vec![words("a b c"), words("b"), words("c a"), words("d")],
            labels: vec![1, 0, 1, 0],
        }
    }

    #[test]
    fn pads_on_the_left_and_maps_oov() {
        let corpus = corpus();
        let vocab = Vocabulary::build(&words("a b c"), std::iter::empty());
        let batches = create_batches(&corpus, 2, &vocab, false, 0);
        assert_eq!(batches.len(), 2);
        let first = &batches[0];
        assert_eq!((first.len, first.batch), (3, 2));
        let pad = vocab.pad_id() as i64;
        // columns: "a b c" and "<pad> <pad> b"
        assert_eq!(first.tokens, vec![0, pad, 1, pad, 2, 1]);
        assert_eq!(first.labels, vec![1, 0]);
        let second = &batches[1];
        assert_eq!(second.tokens, vec![2, pad, 0, vocab.oov_id() as i64]);
    }

    #[test]
    fn sorted_batches_group_similar_lengths() {
        let corpus = corpus();
        let vocab = Vocabulary::build(&[], corpus.sentences.iter().map(Vec::as_slice));
        let batches = create_batches(&corpus, 2, &vocab, true, 3);
        let mut lens: Vec<usize> = batches.iter().map(|b| b.len).collect();
        lens.sort();
        assert_eq!(lens, vec![1, 3]);
    }

    #[test]
    fn converts_to_int_tensors() {
        let corpus = corpus();
        let vocab = Vocabulary::build(&[], corpus.sentences.iter().map(Vec::as_slice));
        let batch = &create_batches(&corpus, 4, &vocab, false, 0)[0];
        let device = NdArrayDevice::default();
        let (tokens, labels) = batch.to_tensors::<NdArray<f32>>(&device);
        assert_eq!(tokens.dims(), [3, 4]);
        assert_eq!(labels.dims(), [4]);
    }
}
