mod common;

use burn_ndarray::NdArrayDevice;
use common::{assert_close, concat, encoder_full, random_input, stream_cell, TestBackend};
use sruppt::modules::mask::streaming_causal_mask;
use sruppt::{
    CellConfig, EncoderConfig, Incremental, StreamingModule, StreamingSession, TransformState,
};

#[test]
fn linear_cell_releases_all_but_right_window() {
    let device = NdArrayDevice::default();
    let cell = CellConfig {
        has_attention: false,
        right_window: 2,
        ..CellConfig::new(4, 4, 2)
    }
    .init::<TestBackend>(&device)
    .unwrap();
    let input = random_input(11, 2, 4, &device);

    let run = stream_cell(&cell, &input, &[3, 3, 3, 2]);
    assert_eq!(run.ready, vec![1, 3, 3, 2]);
    assert_eq!(run.held, vec![2, 2, 2, 2]);

    let full = cell
        .forward(input, None, None, None, Incremental::Full)
        .unwrap();
    assert_close(
        &concat(run.outputs).into_data(),
        &full.hidden.narrow(0, 0, 9).into_data(),
        1e-5,
    );
}

#[test]
fn chunk_boundaries_do_not_change_linear_outputs() {
    let device = NdArrayDevice::default();
    let cell = CellConfig {
        has_attention: false,
        right_window: 3,
        ..CellConfig::new(3, 5, 4)
    }
    .init::<TestBackend>(&device)
    .unwrap();
    let input = random_input(12, 1, 3, &device);

    let a = stream_cell(&cell, &input, &[1; 12]);
    let b = stream_cell(&cell, &input, &[5, 2, 5]);
    assert_eq!(a.ready.iter().sum::<usize>(), 9);
    assert_close(
        &concat(a.outputs).into_data(),
        &concat(b.outputs).into_data(),
        1e-5,
    );
}

fn check_attention_cell_streams_like_full_run(normalize_after: bool) {
    let device = NdArrayDevice::default();
    let cell = CellConfig {
        num_heads: 2,
        right_window: 1,
        rezero_init_alpha: 0.5,
        layer_norm: true,
        normalize_after,
        ..CellConfig::new(4, 4, 4)
    }
    .init::<TestBackend>(&device)
    .unwrap();
    let input = random_input(8, 2, 4, &device);
    let full_mask = sruppt::modules::mask::causal_mask::<TestBackend>(8, 8, 0, &device);
    let full = cell
        .forward(input.clone(), None, None, Some(full_mask), Incremental::Full)
        .unwrap();

    let mut state = cell.streaming();
    let mut carry = None;
    let mut outputs = Vec::new();
    let mut offset = 0;
    for len in [2, 3, 3] {
        let cache = state.as_state().unwrap();
        let TransformState::Attention(attention) = &cache.transform else {
            panic!("expected attention state");
        };
        let mask = streaming_causal_mask::<TestBackend>(
            attention.seen_len(),
            attention.held_len(),
            len,
            1,
            &device,
        );
        let out = cell
            .forward(input.clone().narrow(0, offset, len), carry, None, mask, state)
            .unwrap();
        offset += len;
        outputs.push(out.hidden);
        carry = Some(out.carry);
        state = out.state;
    }
    assert_close(
        &concat(outputs).into_data(),
        &full.hidden.narrow(0, 0, 7).into_data(),
        1e-4,
    );
}

#[test]
fn post_norm_attention_cell_matches_full_run() {
    check_attention_cell_streams_like_full_run(true);
}

#[test]
fn pre_norm_attention_cell_matches_full_run() {
    check_attention_cell_streams_like_full_run(false);
}

#[test]
fn causal_encoder_streams_like_full_run() {
    let device = NdArrayDevice::default();
    let encoder = EncoderConfig {
        num_heads: 2,
        right_window: 1,
        attn_every_n_layers: 2,
        rezero_init_alpha: 0.5,
        causal: true,
        ..EncoderConfig::new(3, 5, 6, 4)
    }
    .init::<TestBackend>(&device)
    .unwrap();
    assert_eq!(encoder.total_right_window(), 3);
    let input = random_input(12, 2, 5, &device);
    let full = encoder_full(&encoder, input.clone());

    let mut session = StreamingSession::new(&encoder, 2, &device);
    let mut outputs = Vec::new();
    let mut offset = 0;
    for len in [2, 5, 1, 4] {
        outputs.push(session.push(input.clone().narrow(0, offset, len)).unwrap());
        offset += len;
        assert_eq!(session.emitted_steps(), offset.saturating_sub(3));
    }
    outputs.push(session.drain().unwrap());
    assert_eq!(session.emitted_steps(), 12);
    assert_close(&concat(outputs).into_data(), &full.into_data(), 1e-4);
}

#[test]
fn encoder_cache_grows_monotonically_within_window() {
    let device = NdArrayDevice::default();
    let encoder = EncoderConfig {
        right_window: 2,
        causal: true,
        ..EncoderConfig::new(2, 3, 4, 2)
    }
    .init::<TestBackend>(&device)
    .unwrap();
    let input = random_input(10, 1, 3, &device);

    let mut state = encoder.streaming();
    let mut carries = None;
    let mut previous_keys = vec![0; 2];
    let mut offset = 0;
    for len in [1, 4, 2, 3] {
        let out = encoder
            .forward(input.clone().narrow(0, offset, len), carries, None, None, state)
            .unwrap();
        offset += len;
        let cache = out.state.as_state().unwrap();
        for (layer, cell_state) in cache.layers.iter().enumerate() {
            assert!(cell_state.held_len() <= 2);
            assert_eq!(cell_state.held_len(), cell_state.transform.held_len());
            let keys = cell_state.transform.seen_len();
            assert!(keys >= previous_keys[layer]);
            previous_keys[layer] = keys;
        }
        carries = Some(out.carries);
        state = out.state;
    }
    // Layer 0 released everything but two steps; layer 1 lags two more.
    assert_eq!(previous_keys, vec![8, 6]);
}
