//! Weight-tied embedding table and optional dimension resizers.
//!
//! The same matrix serves input lookup and output scoring: `project` is a
//! multiplication by the transpose of the matrix `lookup` indexes into, so
//! the tying invariant holds by construction rather than by convention.

use crate::{shape_mismatch, ModelError, ModelResult};
use ndarray::{s, Array1, Array2, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One embedding matrix shared between id lookup and logit projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingTable {
    /// Embedding matrix: [vocab, dim]
    weight: Array2<f32>,
}

impl EmbeddingTable {
    /// Create a table with Xavier-style uniform initialization
    pub fn new(vocab: usize, dim: usize) -> Self {
        let mut rng = rand::thread_rng();
        let scale = (2.0 / (vocab + dim) as f32).sqrt();
        let weight = Array2::from_shape_fn((vocab, dim), |_| rng.gen_range(-scale..scale));
        Self { weight }
    }

    /// Vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.weight.nrows()
    }

    /// Embedding width
    pub fn dim(&self) -> usize {
        self.weight.ncols()
    }

    /// Number of learnable parameters
    pub fn param_count(&self) -> usize {
        self.weight.len()
    }

    /// Embedding vector for a single id
    pub fn row(&self, id: usize) -> ModelResult<Array1<f32>> {
        if id >= self.vocab_size() {
            return Err(ModelError::Vocabulary {
                id,
                vocab: self.vocab_size(),
            });
        }
        Ok(self.weight.row(id).to_owned())
    }

    /// Look up a batch of id sequences: [bsz, len] -> [bsz, len, dim].
    ///
    /// An id outside the vocabulary is fatal; clamping would silently corrupt
    /// supervision.
    pub fn lookup(&self, ids: &Array2<usize>) -> ModelResult<Array3<f32>> {
        let (bsz, len) = ids.dim();
        let mut out = Array3::zeros((bsz, len, self.dim()));
        for b in 0..bsz {
            for t in 0..len {
                let id = ids[[b, t]];
                if id >= self.vocab_size() {
                    return Err(ModelError::Vocabulary {
                        id,
                        vocab: self.vocab_size(),
                    });
                }
                out.slice_mut(s![b, t, ..]).assign(&self.weight.row(id));
            }
        }
        Ok(out)
    }

    /// Score the vocabulary through the transposed embedding matrix:
    /// [bsz, len, dim] -> [bsz, len, vocab].
    pub fn project(&self, x: &Array3<f32>) -> ModelResult<Array3<f32>> {
        let (bsz, len, dim) = x.dim();
        if dim != self.dim() {
            return Err(shape_mismatch("tied projection input", self.dim(), dim));
        }
        let mut out = Array3::zeros((bsz, len, self.vocab_size()));
        for b in 0..bsz {
            let logits = x.index_axis(Axis(0), b).dot(&self.weight.t());
            out.index_axis_mut(Axis(0), b).assign(&logits);
        }
        Ok(out)
    }

    /// Single-vector variant of [`EmbeddingTable::project`]
    pub fn project_row(&self, x: &Array1<f32>) -> ModelResult<Array1<f32>> {
        if x.len() != self.dim() {
            return Err(shape_mismatch("tied projection input", self.dim(), x.len()));
        }
        Ok(self.weight.dot(x))
    }
}

/// Optional dimension adapter, selected once at construction.
///
/// `Identity` when widths already agree, `Linear` otherwise — call sites never
/// branch on a nullable projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Resizer {
    Identity,
    Linear {
        /// Weight matrix: [out_dim, in_dim]
        weight: Array2<f32>,
        /// Bias: [out_dim]
        bias: Array1<f32>,
    },
}

impl Resizer {
    /// Identity when `in_dim == out_dim`, a learnable linear map otherwise
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        if in_dim == out_dim {
            return Resizer::Identity;
        }
        let mut rng = rand::thread_rng();
        let scale = (2.0 / (in_dim + out_dim) as f32).sqrt();
        let weight = Array2::from_shape_fn((out_dim, in_dim), |_| rng.gen_range(-scale..scale));
        let bias = Array1::zeros(out_dim);
        Resizer::Linear { weight, bias }
    }

    /// Output width for a given input width
    pub fn out_dim(&self, in_dim: usize) -> usize {
        match self {
            Resizer::Identity => in_dim,
            Resizer::Linear { weight, .. } => weight.nrows(),
        }
    }

    /// Number of learnable parameters
    pub fn param_count(&self) -> usize {
        match self {
            Resizer::Identity => 0,
            Resizer::Linear { weight, bias } => weight.len() + bias.len(),
        }
    }

    /// Apply over the last axis of [bsz, len, in_dim]
    pub fn apply3(&self, x: &Array3<f32>) -> Array3<f32> {
        match self {
            Resizer::Identity => x.clone(),
            Resizer::Linear { weight, bias } => {
                let (bsz, len, _) = x.dim();
                let mut out = Array3::zeros((bsz, len, weight.nrows()));
                for b in 0..bsz {
                    let y = x.index_axis(Axis(0), b).dot(&weight.t()) + bias;
                    out.index_axis_mut(Axis(0), b).assign(&y);
                }
                out
            }
        }
    }

    /// Apply to a single vector
    pub fn apply1(&self, x: &Array1<f32>) -> Array1<f32> {
        match self {
            Resizer::Identity => x.clone(),
            Resizer::Linear { weight, bias } => weight.dot(x) + bias,
        }
    }
}
