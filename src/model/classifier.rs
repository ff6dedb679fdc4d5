//! Sentence classifier: frozen word embeddings, an SRU++ encoder and a linear
//! head over the last timestep.

use crate::error::Result;
use crate::model::encoder::{EncoderConfig, SruppEncoder};
use crate::perf::{self, Metric};
use crate::state::Incremental;
use burn::module::{Module, Param};
use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};
use burn_nn::loss::CrossEntropyLossConfig;
use burn_nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use serde::{Deserialize, Serialize};

/// Classifier hyperparameters as they appear in the `classifier:` config block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Encoder hidden size.
    pub hidden_size: usize,
    /// Number of stacked cells.
    pub depth: usize,
    pub dropout: f64,
    /// Use the attention transform in every layer.
    pub has_attention: bool,
    /// Transform bottleneck width. 0 picks `hidden_size / 4` for attention
    /// and a full-rank width `max(embedding_dim, hidden_size)` for the plain
    /// linear transform.
    pub projection_size: usize,
    pub num_heads: usize,
    pub right_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            hidden_size: 128,
            depth: 2,
            dropout: 0.5,
            has_attention: false,
            projection_size: 0,
            num_heads: 1,
            right_window: 0,
        }
    }
}

impl ClassifierConfig {
    /// Encoder topology for word vectors of width `embedding_dim`.
    ///
    /// Attention layers look at the whole sentence, so the encoder is not causal.
    pub fn encoder_config(&self, embedding_dim: usize) -> EncoderConfig {
        let projection_size = match (self.projection_size, self.has_attention) {
            (0, true) => (self.hidden_size / 4).max(1),
            (0, false) => embedding_dim.max(self.hidden_size),
            (size, _) => size,
        };
        EncoderConfig {
            num_layers: self.depth,
            input_size: embedding_dim,
            hidden_size: self.hidden_size,
            projection_size,
            num_heads: self.num_heads,
            dropout: self.dropout,
            layer_norm: false,
            right_window: self.right_window,
            attn_every_n_layers: usize::from(self.has_attention),
            causal: false,
            ..EncoderConfig::default()
        }
    }

    /// Build the classifier around pretrained `(vocab, dim)` embeddings.
    pub fn init<B: Backend>(
        &self,
        embeddings: Tensor<B, 2>,
        num_classes: usize,
        device: &B::Device,
    ) -> Result<TextClassifier<B>> {
        let [vocab_size, embedding_dim] = embeddings.dims();
        let mut embedding = EmbeddingConfig::new(vocab_size, embedding_dim).init(device);
        embedding.weight = Param::from_tensor(embeddings);
        Ok(TextClassifier {
            embedding: embedding.no_grad(),
            dropout: DropoutConfig::new(self.dropout).init(),
            encoder: self.encoder_config(embedding_dim).init(device)?,
            output: LinearConfig::new(self.hidden_size, num_classes).init(device),
        })
    }
}

/// Embedding, dropout, encoder, last-step readout and linear head.
#[derive(Module, Debug)]
pub struct TextClassifier<B: Backend> {
    pub embedding: Embedding<B>,
    pub dropout: Dropout,
    pub encoder: SruppEncoder<B>,
    pub output: Linear<B>,
}

/// Logits plus the encoder carries computed for this batch.
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// `(batch, num_classes)`.
    pub logits: Tensor<B, 2>,
    pub carries: Vec<Tensor<B, 2>>,
}

impl<B: Backend> TextClassifier<B> {
    /// Classify left-padded token ids of shape `(len, batch)`.
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Result<ClassifierOutput<B>> {
        let _span = perf::span(Metric::ClassifierForward);
        let [len, batch] = tokens.dims();
        let embedded = self.dropout.forward(self.embedding.forward(tokens));
        let encoded = self
            .encoder
            .forward(embedded, None, None, None, Incremental::Full)?;
        let hidden_size = self.encoder.hidden_size;
        let last = encoded
            .hidden
            .narrow(0, len.saturating_sub(1), 1)
            .reshape([batch, hidden_size]);
        let logits = self.output.forward(self.dropout.forward(last));
        Ok(ClassifierOutput {
            logits,
            carries: encoded.carries,
        })
    }

    /// Forward pass plus mean cross-entropy against `labels` of shape `(batch)`.
    pub fn forward_loss(
        &self,
        tokens: Tensor<B, 2, Int>,
        labels: Tensor<B, 1, Int>,
    ) -> Result<(Tensor<B, 1>, ClassifierOutput<B>)> {
        let output = self.forward(tokens)?;
        let loss = CrossEntropyLossConfig::new()
            .init(&output.logits.device())
            .forward(output.logits.clone(), labels);
        Ok((loss, output))
    }

    /// Number of wrong predictions in a batch.
    pub fn count_errors(&self, tokens: Tensor<B, 2, Int>, labels: Tensor<B, 1, Int>) -> Result<usize> {
        let output = self.forward(tokens)?;
        let batch = labels.dims()[0];
        let predicted = output.logits.argmax(1).reshape([batch]);
        let correct = predicted
            .equal(labels)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        Ok(batch - correct as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, TensorData};
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn classifier(has_attention: bool) -> TextClassifier<TestBackend> {
        let device = NdArrayDevice::default();
        let config = ClassifierConfig {
            hidden_size: 8,
            dropout: 0.0,
            has_attention,
            num_heads: 2,
            ..ClassifierConfig::default()
        };
        let embeddings = Tensor::random([10, 6], Distribution::Default, &device);
        config.init(embeddings, 3, &device).unwrap()
    }

    #[test]
    fn logits_have_one_row_per_sentence() {
        let device = NdArrayDevice::default();
        for has_attention in [false, true] {
            let model = classifier(has_attention);
            let tokens = Tensor::<TestBackend, 2, Int>::from_data(
                TensorData::new(vec![0i64, 1, 2, 3, 4, 5, 6, 7], [4, 2]),
                &device,
            );
            let output = model.forward(tokens).unwrap();
            assert_eq!(output.logits.dims(), [2, 3]);
            assert_eq!(output.carries.len(), 2);
        }
    }

    #[test]
    fn loss_is_finite_and_errors_are_bounded() {
        let device = NdArrayDevice::default();
        let model = classifier(false);
        let tokens = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![1i64, 2, 3, 4, 5, 6], [2, 3]),
            &device,
        );
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 2], [3]), &device);
        let (loss, _) = model.forward_loss(tokens.clone(), labels.clone()).unwrap();
        let loss = loss.into_scalar();
        assert!(loss.is_finite() && loss > 0.0);
        assert!(model.count_errors(tokens, labels).unwrap() <= 3);
    }

    #[test]
    fn default_projection_depends_on_transform() {
        let config = ClassifierConfig::default().encoder_config(300);
        assert_eq!(config.projection_size, 300);
        assert_eq!(config.input_size, 300);
        assert_eq!(config.attn_every_n_layers, 0);

        let narrow = ClassifierConfig::default().encoder_config(64);
        assert_eq!(narrow.projection_size, 128);

        let attention = ClassifierConfig {
            has_attention: true,
            ..ClassifierConfig::default()
        }
        .encoder_config(300);
        assert_eq!(attention.projection_size, 32);
        assert_eq!(attention.attn_every_n_layers, 1);

        let explicit = ClassifierConfig {
            projection_size: 16,
            ..ClassifierConfig::default()
        }
        .encoder_config(300);
        assert_eq!(explicit.projection_size, 16);
    }
}
