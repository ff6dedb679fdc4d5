//! Streaming state helpers shared by the transforms, cells and encoder.
//!
//! A call either sees the whole sequence at once ([`Incremental::Full`]) or is
//! one step of a streaming session ([`Incremental::Streaming`]) that carries a
//! typed cache in and out by value.

use burn::tensor::backend::Backend;

/// Trait implemented by modules that keep per-session streaming state.
pub trait StreamingModule<B: Backend> {
    /// Concrete state type for this module.
    type State;

    /// Allocate an empty state for a new session.
    fn init_state(&self) -> Self::State;

    /// Start a streaming session with an empty state.
    fn streaming(&self) -> Incremental<Self::State> {
        Incremental::Streaming(self.init_state())
    }
}

/// Present/absent wrapper for incremental state.
#[derive(Debug, Clone)]
pub enum Incremental<S> {
    /// Non-streaming call over the full sequence; nothing is cached.
    Full,
    /// Incremental call; the state is consumed and returned updated.
    Streaming(S),
}

impl<S> Default for Incremental<S> {
    fn default() -> Self {
        Incremental::Full
    }
}

impl<S> Incremental<S> {
    /// Returns true when the call is part of a streaming session.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Incremental::Streaming(_))
    }

    /// Borrow the state, if any.
    pub fn as_state(&self) -> Option<&S> {
        match self {
            Incremental::Full => None,
            Incremental::Streaming(state) => Some(state),
        }
    }

    /// Take the state out, if any.
    pub fn into_state(self) -> Option<S> {
        match self {
            Incremental::Full => None,
            Incremental::Streaming(state) => Some(state),
        }
    }

    /// Transform the carried state, keeping the mode.
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Incremental<T> {
        match self {
            Incremental::Full => Incremental::Full,
            Incremental::Streaming(state) => Incremental::Streaming(f(state)),
        }
    }
}

impl<S> From<Option<S>> for Incremental<S> {
    fn from(state: Option<S>) -> Self {
        match state {
            Some(state) => Incremental::Streaming(state),
            None => Incremental::Full,
        }
    }
}
