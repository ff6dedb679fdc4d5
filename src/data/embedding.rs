//! Pretrained word vectors and the vocabulary/embedding table built from them.

use crate::data::corpus::read_text;
use anyhow::{bail, Context, Result};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::Path;

/// Token used for words missing from the vocabulary.
pub const OOV_TOKEN: &str = "<oov>";
/// Token used to left-pad short sentences.
pub const PAD_TOKEN: &str = "<pad>";

/// Word vectors in file order.
#[derive(Debug, Clone, Default)]
pub struct WordVectors {
    pub words: Vec<String>,
    /// Row-major `(words.len(), dim)`.
    pub values: Vec<f32>,
    pub dim: usize,
}

impl WordVectors {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Load text-format vectors: one `word v1 ... vd` per line, with an optional
/// `count dim` header. Repeated words keep their first vector.
pub fn load_word_vectors(path: &Path) -> Result<WordVectors> {
    let text = read_text(path)?;
    let mut vectors = WordVectors::default();
    let mut seen = HashMap::new();
    for (line_no, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            continue;
        };
        let values = parts
            .map(str::parse::<f32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("{}:{}: invalid vector", path.display(), line_no + 1))?;
        if line_no == 0 && values.len() == 1 && word.parse::<usize>().is_ok() {
            continue;
        }
        if vectors.dim == 0 {
            vectors.dim = values.len();
        }
        if values.len() != vectors.dim || values.is_empty() {
            bail!(
                "{}:{}: vector has {} values, expected {}",
                path.display(),
                line_no + 1,
                values.len(),
                vectors.dim
            );
        }
        if seen.insert(word.to_string(), vectors.words.len()).is_some() {
            tracing::warn!(word, "duplicate word vector ignored");
            continue;
        }
        vectors.words.push(word.to_string());
        vectors.values.extend(values);
    }
    if vectors.is_empty() {
        bail!("no word vectors found in {}", path.display());
    }
    tracing::info!(words = vectors.len(), dim = vectors.dim, "loaded word vectors");
    Ok(vectors)
}

/// Word to id mapping with reserved OOV and padding ids.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: Vec<String>,
    ids: HashMap<String, usize>,
    oov_id: usize,
    pad_id: usize,
}

impl Vocabulary {
    /// Pretrained words first, then unseen corpus words, then OOV and padding.
    pub fn build<'a>(
        pretrained: &[String],
        sentences: impl IntoIterator<Item = &'a [String]>,
    ) -> Self {
        let mut words: Vec<String> = Vec::new();
        let mut ids: HashMap<String, usize> = HashMap::new();
        let mut add = |word: &str| {
            if !ids.contains_key(word) {
                ids.insert(word.to_string(), words.len());
                words.push(word.to_string());
            }
        };
        for word in pretrained {
            add(word);
        }
        for sentence in sentences {
            for word in sentence {
                add(word);
            }
        }
        add(OOV_TOKEN);
        add(PAD_TOKEN);
        let oov_id = ids[OOV_TOKEN];
        let pad_id = ids[PAD_TOKEN];
        Self {
            words,
            ids,
            oov_id,
            pad_id,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Id of `word`, or the OOV id.
    pub fn id(&self, word: &str) -> usize {
        self.ids.get(word).copied().unwrap_or(self.oov_id)
    }

    pub fn oov_id(&self) -> usize {
        self.oov_id
    }

    pub fn pad_id(&self) -> usize {
        self.pad_id
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        self.words.get(id).map(String::as_str)
    }
}

/// Initial embedding matrix for a vocabulary.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    pub vocab: Vocabulary,
    /// Row-major `(vocab.len(), dim)`.
    pub weights: Vec<f32>,
    pub dim: usize,
}

impl EmbeddingTable {
    /// Uniform(-0.25, 0.25) rows, pretrained rows copied in, every row scaled
    /// to unit L2 norm.
    pub fn build<'a>(
        vectors: &WordVectors,
        sentences: impl IntoIterator<Item = &'a [String]>,
        seed: u64,
    ) -> Self {
        let vocab = Vocabulary::build(&vectors.words, sentences);
        let dim = vectors.dim;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut weights: Vec<f32> = (0..vocab.len() * dim)
            .map(|_| rng.random_range(-0.25f32..0.25))
            .collect();
        weights[..vectors.values.len()].copy_from_slice(&vectors.values);
        for row in weights.chunks_mut(dim) {
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|v| *v /= norm);
            }
        }
        Self { vocab, weights, dim }
    }

    /// Embedding matrix as a `(vocab, dim)` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let data = TensorData::new(self.weights.clone(), [self.vocab.len(), self.dim]);
        Tensor::from_data(data, device)
    }
}
