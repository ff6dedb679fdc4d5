//! Additive attention masks.

use burn::tensor::{backend::Backend, Bool, Int, Tensor};

/// Causal additive mask of shape `(rows, cols)`.
///
/// Row `r` is the query at absolute step `row_offset + r`; column `j` is the
/// key at absolute step `j`. Keys after the query get `-inf`, the rest `0`.
pub fn causal_mask<B: Backend>(
    rows: usize,
    cols: usize,
    row_offset: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let queries: Tensor<B, 2, Int> =
        Tensor::<B, 1, Int>::arange(row_offset as i64..(row_offset + rows) as i64, device)
            .unsqueeze_dim::<2>(1)
            .repeat_dim(1, cols);
    let keys: Tensor<B, 2, Int> = Tensor::<B, 1, Int>::arange(0..cols as i64, device)
        .unsqueeze_dim::<2>(0)
        .repeat_dim(0, rows);
    let blocked: Tensor<B, 2, Bool> = keys.greater(queries);
    Tensor::<B, 2>::zeros([rows, cols], device).mask_fill(blocked, f32::NEG_INFINITY)
}

/// Causal mask for one streaming call of an attention transform.
///
/// `seen` keys were cached by earlier calls, `held` queries are waiting in the
/// cursor and `incoming` steps arrive now. Returns `None` when the call will
/// not release any query.
pub fn streaming_causal_mask<B: Backend>(
    seen: usize,
    held: usize,
    incoming: usize,
    right_window: usize,
    device: &B::Device,
) -> Option<Tensor<B, 2>> {
    let total = held + incoming;
    let ready = total.saturating_sub(right_window);
    (ready > 0).then(|| causal_mask(total, seen + ready, seen, device))
}
