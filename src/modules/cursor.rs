//! Look-ahead bookkeeping for chunked streaming.
//!
//! A cursor merges the timesteps held back by the previous call with a new
//! chunk, releases everything except the trailing `right_window` steps, and
//! holds those for the next call. Held buffers are `None` when empty.

use crate::error::{Error, Result};
use crate::modules::linear::time_len;
use crate::perf::{self, Metric};
use burn::tensor::{backend::Backend, Tensor};

/// Splits streamed chunks into ready and held-back timesteps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCursor {
    /// Number of trailing steps that must wait for more context.
    pub right_window: usize,
}

/// Outcome of advancing a cursor by one chunk.
#[derive(Debug, Clone)]
pub struct CursorSplit<B: Backend> {
    /// Steps released by this call `(ready, batch, features)`.
    pub ready: Option<Tensor<B, 3>>,
    /// Steps held back for the next call.
    pub held: Option<Tensor<B, 3>>,
    /// Held-back plus incoming length, before the split.
    pub total: usize,
}

impl<B: Backend> CursorSplit<B> {
    /// Number of steps released by this call.
    pub fn num_ready(&self) -> usize {
        time_len(self.ready.as_ref())
    }

    /// Number of steps held back after this call.
    pub fn num_held(&self) -> usize {
        time_len(self.held.as_ref())
    }
}

impl ChunkCursor {
    /// Create a cursor with the given look-ahead window.
    pub fn new(right_window: usize) -> Self {
        Self { right_window }
    }

    /// Steps that can be released when `total` steps are available.
    pub fn num_ready(&self, total: usize) -> usize {
        total.saturating_sub(self.right_window)
    }

    /// Append `incoming` to the held steps and split off the ready prefix.
    pub fn advance<B: Backend>(
        &self,
        held: Option<Tensor<B, 3>>,
        incoming: Tensor<B, 3>,
    ) -> CursorSplit<B> {
        let _span = perf::span(Metric::CursorAdvance);
        let incoming = (incoming.dims()[0] > 0).then_some(incoming);
        let all = match (held, incoming) {
            (Some(held), Some(incoming)) => Some(Tensor::cat(vec![held, incoming], 0)),
            (held, incoming) => held.or(incoming),
        };
        let Some(all) = all else {
            return CursorSplit {
                ready: None,
                held: None,
                total: 0,
            };
        };

        let total = all.dims()[0];
        let ready_len = self.num_ready(total);
        let (ready, held) = if ready_len == 0 {
            (None, Some(all))
        } else if ready_len == total {
            (Some(all), None)
        } else {
            (
                Some(all.clone().narrow(0, 0, ready_len)),
                Some(all.narrow(0, ready_len, total - ready_len)),
            )
        };
        perf::add_count(Metric::ReadySteps, ready_len as u64);

        CursorSplit { ready, held, total }
    }

    /// Slice the rows of an additive `(rows, src_len)` mask that belong to the
    /// ready queries of `split`.
    ///
    /// Rows are matched from the end, so the last row of the mask is the last
    /// step seen so far. Must only be called when `split` released steps.
    pub fn align_mask<B: Backend>(
        &self,
        mask: Tensor<B, 2>,
        split: &CursorSplit<B>,
    ) -> Result<Tensor<B, 2>> {
        let [rows, cols] = mask.dims();
        if rows < split.total {
            return Err(Error::AttnMaskShape {
                actual: [rows, cols],
                expected: [split.total, cols],
            });
        }
        let start = rows - split.total;
        let end = rows - split.num_held();
        debug_assert!(end > start, "align_mask called without ready steps");
        Ok(mask.narrow(0, start, end - start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::assert_close;
    use burn::tensor::TensorData;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn steps(start: usize, len: usize, device: &NdArrayDevice) -> Tensor<TestBackend, 3> {
        let values: Vec<f32> = (start..start + len).map(|v| v as f32).collect();
        Tensor::from_data(TensorData::new(values, [len, 1, 1]), device)
    }

    fn values(tensor: &Option<Tensor<TestBackend, 3>>) -> Vec<f32> {
        tensor
            .as_ref()
            .map(|t| t.to_data().to_vec::<f32>().unwrap())
            .unwrap_or_default()
    }

    #[test]
    fn holds_back_right_window() {
        let device = NdArrayDevice::default();
        let cursor = ChunkCursor::new(2);

        let split = cursor.advance(None, steps(0, 3, &device));
        assert_eq!(values(&split.ready), vec![0.0]);
        assert_eq!(values(&split.held), vec![1.0, 2.0]);

        let split = cursor.advance(split.held, steps(3, 3, &device));
        assert_eq!(split.total, 5);
        assert_eq!(values(&split.ready), vec![1.0, 2.0, 3.0]);
        assert_eq!(values(&split.held), vec![4.0, 5.0]);
    }

    #[test]
    fn starved_chunk_releases_nothing() {
        let device = NdArrayDevice::default();
        let cursor = ChunkCursor::new(4);
        let split = cursor.advance(None, steps(0, 3, &device));
        assert!(split.ready.is_none());
        assert_eq!(split.num_held(), 3);

        let split = cursor.advance(split.held, steps(3, 0, &device));
        assert_eq!(split.num_ready(), 0);
        assert_eq!(split.num_held(), 3);
    }

    #[test]
    fn zero_window_releases_everything() {
        let device = NdArrayDevice::default();
        let split = ChunkCursor::new(0).advance(None, steps(0, 4, &device));
        assert_eq!(split.num_ready(), 4);
        assert!(split.held.is_none());
    }

    #[test]
    fn mask_rows_align_by_absolute_step() {
        let device = NdArrayDevice::default();
        let cursor = ChunkCursor::new(1);
        let first = cursor.advance(None, steps(0, 2, &device));
        let split = cursor.advance(first.held, steps(2, 2, &device));
        // Steps 1..=3 are in the cursor, steps 1 and 2 are ready.
        let rows: Vec<f32> = (0..4).map(|r| r as f32).collect();
        let mask = Tensor::<TestBackend, 2>::from_data(TensorData::new(rows, [4, 1]), &device);
        let aligned = cursor.align_mask(mask, &split).unwrap();
        let expected = TensorData::new(vec![1.0f32, 2.0], [2, 1]);
        assert_close(&aligned.into_data(), &expected, 0.0);
    }

    #[test]
    fn short_mask_is_rejected() {
        let device = NdArrayDevice::default();
        let cursor = ChunkCursor::new(0);
        let split = cursor.advance(None, steps(0, 3, &device));
        let mask = Tensor::<TestBackend, 2>::zeros([2, 3], &device);
        assert!(matches!(
            cursor.align_mask(mask, &split),
            Err(Error::AttnMaskShape { .. })
        ));
    }
}
