//! Joint text-graph encoding glue around an external text encoder.
//!
//! The pretrained encoder itself is a black box behind [`TextEncoder`]: token
//! ids + per-token-pair attention mask + segment ids in, per-token hidden
//! states out. Which encoder backs the trait is an [`EncoderSpec`] supplied
//! at construction, never a module-level constant, so tests can substitute
//! [`HashedBowEncoder`].

use crate::batch::EncoderBatch;
use crate::embedding::EmbeddingTable;
use crate::mask::structural_mask;
use crate::{shape_mismatch, ModelError, ModelResult};
use ndarray::{s, Array1, Array2, Array3, Array4};
use serde::{Deserialize, Serialize};

/// Identity and dimensions of the external text encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSpec {
    /// Model source identifier (checkpoint name, URL, or a test-double tag)
    pub source: String,
    /// Width of the per-token hidden states
    pub hidden_dim: usize,
    /// Token vocabulary size
    pub vocab_size: usize,
}

impl Default for EncoderSpec {
    fn default() -> Self {
        Self {
            source: "hashed-bow".to_string(),
            hidden_dim: 64,
            vocab_size: 4096,
        }
    }
}

/// External text encoder consumed by the joint encoder.
///
/// Implementations must honor the full per-token-pair attention mask, not a
/// per-token summary of it.
pub trait TextEncoder {
    /// The encoder's identity and dimensions
    fn spec(&self) -> &EncoderSpec;

    /// Encode [bsz, seq] token ids under a [bsz, seq, seq] visibility mask
    /// and [bsz, seq] segment flags into [bsz, seq, hidden] states
    fn encode(
        &self,
        token_ids: &Array2<usize>,
        attention_mask: &Array3<bool>,
        segment_ids: &Array2<usize>,
    ) -> ModelResult<Array3<f32>>;
}

/// Encoder output consumed read-only by both generators.
#[derive(Debug, Clone)]
pub struct Memory {
    /// Per-token hidden states: [bsz, seq, hidden]
    pub states: Array3<f32>,
    /// Token validity (id != pad): [bsz, seq]
    pub mask: Array2<bool>,
}

/// Glue that turns an [`EncoderBatch`] into [`Memory`].
///
/// Stateless: nothing is retained between calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointEncoder {
    pad: usize,
    blank: usize,
}

impl JointEncoder {
    /// Create with the shared pad and blank-edge ids
    pub fn new(pad: usize, blank: usize) -> Self {
        Self { pad, blank }
    }

    /// Adjacency indicator: an edge-type id that is neither pad nor blank,
    /// with the diagonal forced true (every node is self-adjacent).
    pub fn adjacency(&self, edges: &Array3<usize>) -> Array3<bool> {
        let (bsz, n, _) = edges.dim();
        let mut adj = edges.mapv(|id| id != self.pad && id != self.blank);
        for b in 0..bsz {
            for i in 0..n {
                adj[[b, i, i]] = true;
            }
        }
        adj
    }

    /// Edge embedding tensor [bsz, n, n, dim] through the shared node/edge
    /// table, zeroed at pad and blank positions (both carry no information).
    pub fn edge_embeddings(
        &self,
        table: &EmbeddingTable,
        edges: &Array3<usize>,
    ) -> ModelResult<Array4<f32>> {
        let (bsz, n, _) = edges.dim();
        let mut out = Array4::zeros((bsz, n, n, table.dim()));
        for b in 0..bsz {
            for u in 0..n {
                for v in 0..n {
                    let id = edges[[b, u, v]];
                    if id == self.pad || id == self.blank {
                        continue;
                    }
                    let row = table.row(id)?;
                    out.slice_mut(s![b, u, v, ..]).assign(&row);
                }
            }
        }
        Ok(out)
    }

    /// Run the external encoder over the joint sequence.
    ///
    /// Returns the memory (last-layer states + validity mask) and the edge
    /// embedding tensor for conditioning.
    pub fn encode<E: TextEncoder>(
        &self,
        text_encoder: &E,
        table: &EmbeddingTable,
        batch: &EncoderBatch,
    ) -> ModelResult<(Memory, Array4<f32>)> {
        let adjacency = self.adjacency(&batch.edges);
        let edge_embed = self.edge_embeddings(table, &batch.edges)?;

        let visibility = structural_mask(
            &adjacency,
            &batch.spans,
            &batch.joint_ids,
            batch.text_len,
            self.pad,
        )?;
        let states = text_encoder.encode(&batch.joint_ids, &visibility, &batch.segment_ids)?;

        let (bsz, seq) = batch.joint_ids.dim();
        if states.dim() != (bsz, seq, text_encoder.spec().hidden_dim) {
            return Err(shape_mismatch(
                "encoder states",
                format!("({bsz}, {seq}, {})", text_encoder.spec().hidden_dim),
                format!("{:?}", states.dim()),
            ));
        }

        let mask = batch.joint_ids.mapv(|id| id != self.pad);
        Ok((Memory { states, mask }, edge_embed))
    }
}

// ============================================================================
// Deterministic test-double encoder
// ============================================================================

/// A deterministic, mask-respecting stand-in for a pretrained encoder.
///
/// Each token id hashes to a fixed unit embedding; one mixing pass averages
/// the embeddings each position is allowed to see. Good enough to make mask
/// effects observable in tests and self-contained experiments.
#[derive(Debug, Clone)]
pub struct HashedBowEncoder {
    spec: EncoderSpec,
}

impl HashedBowEncoder {
    /// Create a test-double encoder with the given dimensions
    pub fn new(hidden_dim: usize, vocab_size: usize) -> Self {
        Self {
            spec: EncoderSpec {
                source: "hashed-bow".to_string(),
                hidden_dim,
                vocab_size,
            },
        }
    }

    // Fixed pseudo-random unit vector for (token, segment), LCG-driven.
    fn unit(&self, id: usize, segment: usize) -> Array1<f32> {
        let mut state = (id as u64)
            .wrapping_mul(2654435761)
            .wrapping_add(segment as u64 + 1);
        Array1::from_shape_fn(self.spec.hidden_dim, |_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            ((state >> 16) & 0x7fff) as f32 / 16384.0 - 1.0
        })
    }
}

impl TextEncoder for HashedBowEncoder {
    fn spec(&self) -> &EncoderSpec {
        &self.spec
    }

    fn encode(
        &self,
        token_ids: &Array2<usize>,
        attention_mask: &Array3<bool>,
        segment_ids: &Array2<usize>,
    ) -> ModelResult<Array3<f32>> {
        let (bsz, seq) = token_ids.dim();
        if attention_mask.dim() != (bsz, seq, seq) {
            return Err(shape_mismatch(
                "attention mask",
                format!("({bsz}, {seq}, {seq})"),
                format!("{:?}", attention_mask.dim()),
            ));
        }
        if segment_ids.dim() != (bsz, seq) {
            return Err(shape_mismatch(
                "segment ids",
                format!("({bsz}, {seq})"),
                format!("{:?}", segment_ids.dim()),
            ));
        }

        let dim = self.spec.hidden_dim;
        let mut out = Array3::zeros((bsz, seq, dim));
        for b in 0..bsz {
            let units: Vec<Array1<f32>> = (0..seq)
                .map(|i| {
                    let id = token_ids[[b, i]];
                    if id >= self.spec.vocab_size {
                        return Err(ModelError::Vocabulary {
                            id,
                            vocab: self.spec.vocab_size,
                        });
                    }
                    Ok(self.unit(id, segment_ids[[b, i]]))
                })
                .collect::<ModelResult<_>>()?;

            for i in 0..seq {
                // isolated positions (pad) stay zero
                if !attention_mask[[b, i, i]] {
                    continue;
                }
                let mut mixed = Array1::zeros(dim);
                let mut visible = 0usize;
                for (j, unit) in units.iter().enumerate() {
                    if j != i && attention_mask[[b, i, j]] {
                        mixed += unit;
                        visible += 1;
                    }
                }
                let own = &units[i];
                let row = if visible > 0 {
                    own * 0.5 + &(mixed * (0.5 / visible as f32))
                } else {
                    own.clone()
                };
                out.slice_mut(s![b, i, ..]).assign(&row);
            }
        }
        Ok(out)
    }
}
