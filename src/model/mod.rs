//! Models built from SRU++ cells.
//!
//! `encoder` stacks cells into a streaming encoder; `classifier` puts word
//! embeddings in front of an encoder and a linear head on top.

pub mod classifier;
pub mod encoder;
