//! Two-stage autoregressive decoder: node generation, then edge generation
//! over node-pair representations.
//!
//! Both generators share one pattern: embed the teacher-forced input through
//! the tied table, run a GRU stack, attend over encoder memory, and score the
//! vocabulary through the transposed embedding matrix. The edge generator's
//! per-step input additionally carries the source and target node states
//! selected by the pair index tables.

use crate::attention::Attention;
use crate::embedding::{EmbeddingTable, Resizer};
use crate::encoder::Memory;
use crate::rnn::GruStack;
use crate::{shape_mismatch, ModelResult};
use ndarray::{s, Array1, Array2, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

fn dropout3(x: &mut Array3<f32>, p: f32) {
    if p <= 0.0 {
        return;
    }
    let mut rng = rand::thread_rng();
    let keep = 1.0 - p;
    for v in x.iter_mut() {
        if rng.gen::<f32>() < p {
            *v = 0.0;
        } else {
            *v /= keep;
        }
    }
}

/// Per-sequence decoding state: GRU layer states plus the projected memory
/// reused by the attention scorer at every step.
#[derive(Debug, Clone)]
pub struct DecodeState {
    gru: Vec<Array1<f32>>,
    prepared: Array2<f32>,
}

/// Autoregressive node-sequence generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGenerator {
    input_resize: Resizer,
    rnn: GruStack,
    attention: Attention,
    output_resize: Resizer,
    dropout: f32,
}

impl NodeGenerator {
    /// `enc_dim` is the shared embedding / memory width, `embed_dim` the GRU
    /// input width, `hidden` the recurrent width
    pub fn new(
        enc_dim: usize,
        embed_dim: usize,
        hidden: usize,
        layers: usize,
        dropout: f32,
    ) -> Self {
        Self {
            input_resize: Resizer::new(enc_dim, embed_dim),
            rnn: GruStack::new(embed_dim, hidden, layers, dropout),
            attention: Attention::new(hidden, enc_dim),
            output_resize: Resizer::new(hidden, enc_dim),
            dropout,
        }
    }

    /// Recurrent hidden width
    pub fn hidden_dim(&self) -> usize {
        self.rnn.hidden_dim()
    }

    /// Number of learnable parameters
    pub fn param_count(&self) -> usize {
        self.input_resize.param_count()
            + self.rnn.param_count()
            + self.attention.param_count()
            + self.output_resize.param_count()
    }

    /// Teacher-forced pass.
    ///
    /// Returns per-step hidden states [bsz, steps, hidden] (reused as pair
    /// operands) and vocabulary logits [bsz, steps, vocab].
    pub fn forward(
        &self,
        table: &EmbeddingTable,
        memory: &Memory,
        node_in: &Array2<usize>,
        lengths: &[usize],
        train: bool,
    ) -> ModelResult<(Array3<f32>, Array3<f32>)> {
        let embedded = table.lookup(node_in)?;
        let embedded = self.input_resize.apply3(&embedded);
        let states = self.rnn.forward(&embedded, lengths, train)?;
        let (context, _) = self
            .attention
            .forward(&states, &memory.states, &memory.mask)?;
        let mut projected = self.output_resize.apply3(&context);
        if train {
            dropout3(&mut projected, self.dropout);
        }
        let logits = table.project(&projected)?;
        Ok((states, logits))
    }

    /// Start a step-by-step decode over batch element `b`'s memory
    pub fn begin_decode(&self, memory: &Memory, b: usize) -> DecodeState {
        DecodeState {
            gru: self.rnn.zero_state(),
            prepared: self
                .attention
                .prepare(&memory.states.index_axis(Axis(0), b)),
        }
    }

    /// One generation step: consume the previously emitted node id, return
    /// the new hidden state and vocabulary logits. Dropout is never drawn.
    pub fn step(
        &self,
        table: &EmbeddingTable,
        memory: &Memory,
        b: usize,
        state: &mut DecodeState,
        prev_id: usize,
    ) -> ModelResult<(Array1<f32>, Array1<f32>)> {
        let embedded = table.row(prev_id)?;
        let x = self.input_resize.apply1(&embedded);
        let hidden = self.rnn.step(&x, &mut state.gru, false);

        let mem = memory.states.index_axis(Axis(0), b);
        let mask = memory.mask.index_axis(Axis(0), b);
        let (context, _) = self
            .attention
            .attend(&hidden.view(), &state.prepared, &mem, &mask);
        let projected = self.output_resize.apply1(&context);
        let logits = table.project_row(&projected)?;
        Ok((hidden, logits))
    }
}

/// Autoregressive edge-type generator over the flat pair sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeGenerator {
    input_resize: Resizer,
    rnn: GruStack,
    attention: Attention,
    output_resize: Resizer,
    node_hidden: usize,
    dropout: f32,
}

impl EdgeGenerator {
    /// `node_hidden` is the width of the node-generator states concatenated
    /// into each step's input
    pub fn new(
        enc_dim: usize,
        embed_dim: usize,
        node_hidden: usize,
        hidden: usize,
        layers: usize,
        dropout: f32,
    ) -> Self {
        Self {
            input_resize: Resizer::new(enc_dim, embed_dim),
            rnn: GruStack::new(embed_dim + 2 * node_hidden, hidden, layers, dropout),
            attention: Attention::new(hidden, enc_dim),
            output_resize: Resizer::new(hidden, enc_dim),
            node_hidden,
            dropout,
        }
    }

    /// Number of learnable parameters
    pub fn param_count(&self) -> usize {
        self.input_resize.param_count()
            + self.rnn.param_count()
            + self.attention.param_count()
            + self.output_resize.param_count()
    }

    fn step_input(
        &self,
        edge_embed: &Array1<f32>,
        src: &ndarray::ArrayView1<f32>,
        tgt: &ndarray::ArrayView1<f32>,
    ) -> Array1<f32> {
        let e = edge_embed.len();
        let n = src.len();
        let mut x = Array1::zeros(e + 2 * n);
        x.slice_mut(s![..e]).assign(edge_embed);
        x.slice_mut(s![e..e + n]).assign(src);
        x.slice_mut(s![e + n..]).assign(tgt);
        x
    }

    /// One flat teacher-forced pass over the whole pair sequence.
    ///
    /// `src_states` / `tgt_states` are the node hidden states gathered via
    /// the pair index tables; no additional masking is applied to the pair
    /// sequence.
    pub fn forward(
        &self,
        table: &EmbeddingTable,
        memory: &Memory,
        edge_in: &Array2<usize>,
        src_states: &Array3<f32>,
        tgt_states: &Array3<f32>,
        train: bool,
    ) -> ModelResult<(Array3<f32>, Array3<f32>)> {
        let (bsz, pairs) = edge_in.dim();
        if src_states.dim() != (bsz, pairs, self.node_hidden)
            || tgt_states.dim() != src_states.dim()
        {
            return Err(shape_mismatch(
                "pair operand states",
                format!("({bsz}, {pairs}, {})", self.node_hidden),
                format!("{:?} / {:?}", src_states.dim(), tgt_states.dim()),
            ));
        }

        let embedded = table.lookup(edge_in)?;
        let embedded = self.input_resize.apply3(&embedded);
        let embed_dim = embedded.dim().2;

        let mut inputs = Array3::zeros((bsz, pairs, embed_dim + 2 * self.node_hidden));
        for b in 0..bsz {
            for k in 0..pairs {
                let x = self.step_input(
                    &embedded.slice(s![b, k, ..]).to_owned(),
                    &src_states.slice(s![b, k, ..]),
                    &tgt_states.slice(s![b, k, ..]),
                );
                inputs.slice_mut(s![b, k, ..]).assign(&x);
            }
        }

        let lengths = vec![pairs; bsz];
        let states = self.rnn.forward(&inputs, &lengths, train)?;
        let (context, _) = self
            .attention
            .forward(&states, &memory.states, &memory.mask)?;
        let mut projected = self.output_resize.apply3(&context);
        if train {
            dropout3(&mut projected, self.dropout);
        }
        let logits = table.project(&projected)?;
        Ok((states, logits))
    }

    /// Start a step-by-step decode over batch element `b`'s memory
    pub fn begin_decode(&self, memory: &Memory, b: usize) -> DecodeState {
        DecodeState {
            gru: self.rnn.zero_state(),
            prepared: self
                .attention
                .prepare(&memory.states.index_axis(Axis(0), b)),
        }
    }

    /// One generation step for the pair (src, tgt), consuming the previously
    /// emitted edge id.
    pub fn step(
        &self,
        table: &EmbeddingTable,
        memory: &Memory,
        b: usize,
        state: &mut DecodeState,
        prev_edge: usize,
        src: &ndarray::ArrayView1<f32>,
        tgt: &ndarray::ArrayView1<f32>,
    ) -> ModelResult<(Array1<f32>, Array1<f32>)> {
        let embedded = table.row(prev_edge)?;
        let embedded = self.input_resize.apply1(&embedded);
        let x = self.step_input(&embedded, src, tgt);
        let hidden = self.rnn.step(&x, &mut state.gru, false);

        let mem = memory.states.index_axis(Axis(0), b);
        let mask = memory.mask.index_axis(Axis(0), b);
        let (context, _) = self
            .attention
            .attend(&hidden.view(), &state.prepared, &mem, &mask);
        let projected = self.output_resize.apply1(&context);
        let logits = table.project_row(&projected)?;
        Ok((hidden, logits))
    }
}
