//! Shared test utilities for chunked streaming comparisons.

#![allow(dead_code)]

use burn::tensor::{Distribution, Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use sruppt::{Incremental, SruppCell, SruppEncoder};

pub type TestBackend = NdArray<f32>;

pub const FIXTURE_DIR: &str = "tests/fixtures";

/// Assert two tensor data slices are element-wise close within tolerance.
pub fn assert_close(a: &TensorData, b: &TensorData, tol: f32) {
    assert_eq!(a.shape, b.shape, "shape mismatch");
    let a_slice = a.as_slice::<f32>().expect("a slice");
    let b_slice = b.as_slice::<f32>().expect("b slice");
    for (idx, (x, y)) in a_slice.iter().zip(b_slice.iter()).enumerate() {
        if (x - y).abs() > tol {
            panic!(
                "mismatch at {idx}: {x} vs {y} (diff: {}, tol: {tol})",
                (x - y).abs()
            );
        }
    }
}

/// Random `(len, batch, features)` input.
pub fn random_input(
    len: usize,
    batch: usize,
    features: usize,
    device: &NdArrayDevice,
) -> Tensor<TestBackend, 3> {
    Tensor::random([len, batch, features], Distribution::Normal(0.0, 1.0), device)
}

/// Concatenate released chunks, skipping empty ones.
pub fn concat(chunks: Vec<Tensor<TestBackend, 3>>) -> Tensor<TestBackend, 3> {
    let chunks: Vec<_> = chunks.into_iter().filter(|c| c.dims()[0] > 0).collect();
    Tensor::cat(chunks, 0)
}

/// Per-call record of a chunked cell run.
pub struct CellRun {
    pub outputs: Vec<Tensor<TestBackend, 3>>,
    pub ready: Vec<usize>,
    pub held: Vec<usize>,
}

/// Feed `input` to `cell` in chunks of `sizes`, threading carry and state.
pub fn stream_cell(
    cell: &SruppCell<TestBackend>,
    input: &Tensor<TestBackend, 3>,
    sizes: &[usize],
) -> CellRun {
    use sruppt::StreamingModule;

    let mut state = cell.streaming();
    let mut carry = None;
    let mut run = CellRun {
        outputs: Vec::new(),
        ready: Vec::new(),
        held: Vec::new(),
    };
    let mut offset = 0;
    for &len in sizes {
        let chunk = input.clone().narrow(0, offset, len);
        offset += len;
        let out = cell
            .forward(chunk, carry, None, None, state)
            .expect("streaming cell call");
        run.ready.push(out.hidden.dims()[0]);
        run.held
            .push(out.state.as_state().expect("streaming state").held_len());
        run.outputs.push(out.hidden);
        carry = Some(out.carry);
        state = out.state;
    }
    run
}

/// Full-sequence encoder output.
pub fn encoder_full(
    encoder: &SruppEncoder<TestBackend>,
    input: Tensor<TestBackend, 3>,
) -> Tensor<TestBackend, 3> {
    encoder
        .forward(input, None, None, None, Incremental::Full)
        .expect("full encoder call")
        .hidden
}
