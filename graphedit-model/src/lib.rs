//! # graphedit-model
//!
//! Neural graph-edit generation: given a source graph and a natural-language
//! modification instruction, produce a target graph autoregressively — first
//! the node sequence, then an edge-type sequence over node pairs.
//!
//! This crate provides:
//! - Structural attention masks exposing graph adjacency to a text encoder
//! - Pair index tables turning a node sequence into the edge-generation order
//! - Weight-tied embedding tables shared between lookup and output scoring
//! - GRU-based node and edge generators with attention over encoder memory
//! - The joint node/edge cross-entropy loss and the top-level [`GraphEditor`]
//!
//! The pretrained text encoder is consumed behind the [`encoder::TextEncoder`]
//! trait; [`encoder::HashedBowEncoder`] is a deterministic stand-in for tests
//! and self-contained experiments.

use thiserror::Error;

pub mod attention;
pub mod batch;
pub mod decoder;
pub mod embedding;
pub mod encoder;
pub mod loss;
pub mod mask;
pub mod model;
pub mod pairing;
pub mod rnn;

pub use batch::{EncoderBatch, Sample, TrainBatch};
pub use embedding::{EmbeddingTable, Resizer};
pub use encoder::{EncoderSpec, HashedBowEncoder, Memory, TextEncoder};
pub use model::{GraphEditor, ModelConfig};

// ============================================================================
// Error Types
// ============================================================================

/// Errors in the model forward path.
///
/// Every variant is a caller contract violation surfaced synchronously; the
/// forward pass never retries or recovers internally.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },
    #[error("{what} index {index} out of range for length {len}")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("id {id} outside vocabulary of size {vocab}")]
    Vocabulary { id: usize, vocab: usize },
    #[error("graph error: {0}")]
    Graph(#[from] graphedit_core::GraphError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

pub(crate) fn shape_mismatch(
    what: &'static str,
    expected: impl ToString,
    found: impl ToString,
) -> ModelError {
    ModelError::ShapeMismatch {
        what,
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
