//! Error types for the streaming transform and recurrent cell modules.
//!
//! Application code (config loading, data, training) reports failures through
//! `anyhow`; everything that sits on the tensor path returns [`Error`] so
//! callers can tell configuration mistakes from contract violations.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid module topology, raised at construction time.
    Configuration,
    /// Caller broke the call contract (masks, state, carry).
    ContractViolation,
    /// Input chunk has the wrong rank or feature size.
    Dimensionality,
}

/// Errors raised by the transform, cell and encoder modules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Attention heads do not evenly split the projection width.
    #[error("config: proj_features ({proj_features}) must be divisible by num_heads ({num_heads})")]
    HeadsNotDivisible {
        proj_features: usize,
        num_heads: usize,
    },

    /// Any other invalid construction parameter.
    #[error("config: {0}")]
    Config(String),

    /// A pad mask was supplied together with an incremental state.
    #[error("mask_pad must not be set when decoding incrementally")]
    PadMaskWhileStreaming,

    /// Additive attention mask does not match `(tgt_len, src_len)`.
    #[error("attn_mask has size {actual:?} but expect {expected:?}")]
    AttnMaskShape {
        actual: [usize; 2],
        expected: [usize; 2],
    },

    /// Pad mask does not match `(src_len, batch)`.
    #[error("mask_pad has size {actual:?} but expect {expected:?}")]
    PadMaskShape {
        actual: [usize; 2],
        expected: [usize; 2],
    },

    /// A cached slot the protocol relies on is absent.
    #[error("incremental state is missing `{0}`")]
    MissingSlot(&'static str),

    /// A cached slot has an unexpected number of timesteps.
    #[error("cached `{slot}` has {actual} steps but expect {expected}")]
    SlotLength {
        slot: &'static str,
        actual: usize,
        expected: usize,
    },

    /// The incremental state belongs to a different transform variant.
    #[error("incremental state was created for the {found} transform, not the {expected} transform")]
    StateMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// One caller mask was given to several attention layers while streaming.
    #[error("attn_mask cannot be shared by {attention_layers} attention layers when decoding incrementally")]
    SharedMaskWhileStreaming { attention_layers: usize },

    /// A chunk's batch axis differs from the session's batch size.
    #[error("chunk has batch size {actual} but the session was started with {expected}")]
    BatchMismatch { actual: usize, expected: usize },

    /// The session was drained and takes no more input.
    #[error("streaming session was already drained")]
    SessionDrained,

    /// Carry does not match `(batch, hidden_size)`.
    #[error("carry has size {actual:?} but expect {expected:?}")]
    CarryShape {
        actual: [usize; 2],
        expected: [usize; 2],
    },

    /// Input is not `(length, batch, features)`.
    #[error("input must be 3 dimensional (length, bsz, d), got shape {0:?}")]
    NotThreeDimensional(Vec<usize>),

    /// Input feature axis does not match the module's input size.
    #[error("input has {actual} features but the module expects {expected}")]
    FeatureSize { actual: usize, expected: usize },
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::HeadsNotDivisible { .. } | Error::Config(_) => ErrorKind::Configuration,
            Error::NotThreeDimensional(_) | Error::FeatureSize { .. } => ErrorKind::Dimensionality,
            Error::PadMaskWhileStreaming
            | Error::AttnMaskShape { .. }
            | Error::PadMaskShape { .. }
            | Error::MissingSlot(_)
            | Error::SlotLength { .. }
            | Error::StateMismatch { .. }
            | Error::SharedMaskWhileStreaming { .. }
            | Error::BatchMismatch { .. }
            | Error::SessionDrained
            | Error::CarryShape { .. } => ErrorKind::ContractViolation,
        }
    }
}
