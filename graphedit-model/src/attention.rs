//! Additive-tanh attention over encoder memory.
//!
//! The scorer is Luong-style: score(q, m) = v . tanh(W q + U m). Masked
//! memory positions receive -inf before the softmax, so their post-softmax
//! weight is exactly zero. The output projection folds the context vector and
//! the query back to the query's width.

use crate::{shape_mismatch, ModelResult};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Attention module shared by the node and edge generators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attention {
    /// Query projection: [mem_dim, input_dim], no bias
    linear_q: Array2<f32>,
    /// Memory projection: [mem_dim, mem_dim]
    linear_c: Array2<f32>,
    /// Memory projection bias: [mem_dim]
    bias_c: Array1<f32>,
    /// Score vector: [mem_dim]
    v: Array1<f32>,
    /// Output projection: [input_dim, mem_dim + input_dim]
    out_weight: Array2<f32>,
    /// Output projection bias: [input_dim]
    out_bias: Array1<f32>,
}

impl Attention {
    /// Create an attention module for queries of width `input_dim` over
    /// memory of width `mem_dim`
    pub fn new(input_dim: usize, mem_dim: usize) -> Self {
        let mut rng = rand::thread_rng();
        let scale = (2.0 / (input_dim + mem_dim) as f32).sqrt();
        let linear_q =
            Array2::from_shape_fn((mem_dim, input_dim), |_| rng.gen_range(-scale..scale));
        let linear_c = Array2::from_shape_fn((mem_dim, mem_dim), |_| rng.gen_range(-scale..scale));
        let out_weight = Array2::from_shape_fn((input_dim, mem_dim + input_dim), |_| {
            rng.gen_range(-scale..scale)
        });
        let v = Array1::from_shape_fn(mem_dim, |_| rng.gen_range(-scale..scale));
        Self {
            linear_q,
            linear_c,
            bias_c: Array1::zeros(mem_dim),
            v,
            out_weight,
            out_bias: Array1::zeros(input_dim),
        }
    }

    /// Number of learnable parameters
    pub fn param_count(&self) -> usize {
        self.linear_q.len()
            + self.linear_c.len()
            + self.bias_c.len()
            + self.v.len()
            + self.out_weight.len()
            + self.out_bias.len()
    }

    /// Precompute the projected memory for one batch element: [s, mem_dim].
    ///
    /// The projection is query-independent, so decoders prepare it once per
    /// sequence rather than once per step.
    pub fn prepare(&self, memory: &ArrayView2<f32>) -> Array2<f32> {
        memory.dot(&self.linear_c.t()) + &self.bias_c
    }

    /// Attend with a single query over one batch element's memory.
    ///
    /// Returns the projected attention output (query width) and the
    /// normalized weights. A fully masked memory yields zero weights and a
    /// zero context.
    pub fn attend(
        &self,
        query: &ArrayView1<f32>,
        prepared: &Array2<f32>,
        memory: &ArrayView2<f32>,
        mask: &ArrayView1<bool>,
    ) -> (Array1<f32>, Array1<f32>) {
        let src_len = memory.nrows();
        let wq = self.linear_q.dot(query);

        let mut scores = Array1::from_elem(src_len, f32::NEG_INFINITY);
        for s in 0..src_len {
            if mask[s] {
                let hidden = (&wq + &prepared.row(s)).mapv(f32::tanh);
                scores[s] = hidden.dot(&self.v);
            }
        }

        let max = scores.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let mut weights = Array1::zeros(src_len);
        if max.is_finite() {
            let mut sum = 0.0;
            for s in 0..src_len {
                if scores[s].is_finite() {
                    let e = (scores[s] - max).exp();
                    weights[s] = e;
                    sum += e;
                }
            }
            weights /= sum;
        }

        let mut context = Array1::zeros(memory.ncols());
        for s in 0..src_len {
            if weights[s] != 0.0 {
                context.scaled_add(weights[s], &memory.row(s));
            }
        }

        let mut cat = Array1::zeros(context.len() + query.len());
        cat.slice_mut(ndarray::s![..context.len()]).assign(&context);
        cat.slice_mut(ndarray::s![context.len()..]).assign(query);
        let out = self.out_weight.dot(&cat) + &self.out_bias;

        (out, weights)
    }

    /// Batched attention: queries [bsz, tgt_len, input_dim] over memory
    /// [bsz, src_len, mem_dim] with validity mask [bsz, src_len].
    ///
    /// Returns (outputs [bsz, tgt_len, input_dim], weights [bsz, tgt_len, src_len]).
    pub fn forward(
        &self,
        inputs: &Array3<f32>,
        memory: &Array3<f32>,
        memory_mask: &Array2<bool>,
    ) -> ModelResult<(Array3<f32>, Array3<f32>)> {
        let (bsz, tgt_len, input_dim) = inputs.dim();
        let (mem_bsz, src_len, mem_dim) = memory.dim();
        if bsz != mem_bsz {
            return Err(shape_mismatch("attention batch", bsz, mem_bsz));
        }
        if input_dim != self.linear_q.ncols() {
            return Err(shape_mismatch(
                "attention query width",
                self.linear_q.ncols(),
                input_dim,
            ));
        }
        if mem_dim != self.linear_c.ncols() {
            return Err(shape_mismatch(
                "attention memory width",
                self.linear_c.ncols(),
                mem_dim,
            ));
        }
        if memory_mask.dim() != (bsz, src_len) {
            return Err(shape_mismatch(
                "attention memory mask",
                format!("({bsz}, {src_len})"),
                format!("{:?}", memory_mask.dim()),
            ));
        }

        let mut outputs = Array3::zeros((bsz, tgt_len, input_dim));
        let mut weights = Array3::zeros((bsz, tgt_len, src_len));
        for b in 0..bsz {
            let mem = memory.index_axis(Axis(0), b);
            let mask = memory_mask.index_axis(Axis(0), b);
            let prepared = self.prepare(&mem);
            for t in 0..tgt_len {
                let query = inputs.slice(ndarray::s![b, t, ..]);
                let (out, w) = self.attend(&query, &prepared, &mem, &mask);
                outputs.slice_mut(ndarray::s![b, t, ..]).assign(&out);
                weights.slice_mut(ndarray::s![b, t, ..]).assign(&w);
            }
        }
        Ok((outputs, weights))
    }
}
