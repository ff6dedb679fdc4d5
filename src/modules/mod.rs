//! Building blocks of the SRU++ cell.
//!
//! The transforms produce the `U` projection from a chunk of input, the
//! recurrence turns `U` into hidden states, and the cursor and mask helpers
//! implement the look-ahead part of the streaming protocol.

pub mod attention;
pub mod cell;
pub mod cursor;
pub mod linear;
pub mod mask;
pub mod projected;
pub mod recurrence;
pub mod rezero;
pub mod transform;
