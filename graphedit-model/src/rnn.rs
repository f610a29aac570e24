//! Multi-layer GRU with inter-layer dropout.
//!
//! Both generators decode through a [`GruStack`]: a step API drives
//! autoregressive generation, and a sequence API runs teacher forcing without
//! advancing recurrent state past a sequence's true length.

use crate::{shape_mismatch, ModelResult};
use ndarray::{s, Array1, Array2, Array3, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn dropout_inplace(x: &mut Array1<f32>, p: f32, rng: &mut impl Rng) {
    if p <= 0.0 {
        return;
    }
    let keep = 1.0 - p;
    for v in x.iter_mut() {
        if rng.gen::<f32>() < p {
            *v = 0.0;
        } else {
            *v /= keep;
        }
    }
}

/// A single GRU layer.
///
/// Gate rows are stacked reset / update / candidate in `w_ih`/`w_hh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruCell {
    /// Input weights: [3 * hidden, input_dim]
    w_ih: Array2<f32>,
    /// Recurrent weights: [3 * hidden, hidden]
    w_hh: Array2<f32>,
    /// Input bias: [3 * hidden]
    b_ih: Array1<f32>,
    /// Recurrent bias: [3 * hidden]
    b_hh: Array1<f32>,
    hidden: usize,
}

impl GruCell {
    /// Create a cell with Xavier-style uniform initialization
    pub fn new(input_dim: usize, hidden: usize) -> Self {
        let mut rng = rand::thread_rng();
        let scale = (2.0 / (input_dim + hidden) as f32).sqrt();
        Self {
            w_ih: Array2::from_shape_fn((3 * hidden, input_dim), |_| {
                rng.gen_range(-scale..scale)
            }),
            w_hh: Array2::from_shape_fn((3 * hidden, hidden), |_| rng.gen_range(-scale..scale)),
            b_ih: Array1::zeros(3 * hidden),
            b_hh: Array1::zeros(3 * hidden),
            hidden,
        }
    }

    /// Hidden width
    pub fn hidden_dim(&self) -> usize {
        self.hidden
    }

    /// Input width
    pub fn input_dim(&self) -> usize {
        self.w_ih.ncols()
    }

    /// Number of learnable parameters
    pub fn param_count(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }

    /// Advance one step: h' = (1 - z) * n + z * h
    pub fn step(&self, x: &ArrayView1<f32>, h: &ArrayView1<f32>) -> Array1<f32> {
        let d = self.hidden;
        let gi = self.w_ih.dot(x) + &self.b_ih;
        let gh = self.w_hh.dot(h) + &self.b_hh;

        let r = (&gi.slice(s![..d]) + &gh.slice(s![..d])).mapv(sigmoid);
        let z = (&gi.slice(s![d..2 * d]) + &gh.slice(s![d..2 * d])).mapv(sigmoid);
        let n = (&gi.slice(s![2 * d..]) + &(&r * &gh.slice(s![2 * d..]))).mapv(f32::tanh);

        let mut out = n;
        for i in 0..d {
            out[i] += z[i] * (h[i] - out[i]);
        }
        out
    }
}

/// A stack of GRU layers with dropout between layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruStack {
    layers: Vec<GruCell>,
    dropout: f32,
}

impl GruStack {
    /// Create `num_layers` stacked cells; layers past the first take the
    /// hidden width as input
    pub fn new(input_dim: usize, hidden: usize, num_layers: usize, dropout: f32) -> Self {
        let mut layers = Vec::with_capacity(num_layers.max(1));
        let mut width = input_dim;
        for _ in 0..num_layers.max(1) {
            layers.push(GruCell::new(width, hidden));
            width = hidden;
        }
        Self { layers, dropout }
    }

    /// Hidden width of the stack
    pub fn hidden_dim(&self) -> usize {
        self.layers[0].hidden_dim()
    }

    /// Expected input width
    pub fn input_dim(&self) -> usize {
        self.layers[0].input_dim()
    }

    /// Number of learnable parameters
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(|l| l.param_count()).sum()
    }

    /// Fresh all-zero state, one vector per layer
    pub fn zero_state(&self) -> Vec<Array1<f32>> {
        self.layers
            .iter()
            .map(|l| Array1::zeros(l.hidden_dim()))
            .collect()
    }

    /// Advance one step, mutating `state` in place and returning the top
    /// layer's output. Dropout is drawn only between layers and only when
    /// `train` is set.
    pub fn step(&self, x: &Array1<f32>, state: &mut [Array1<f32>], train: bool) -> Array1<f32> {
        let mut rng = rand::thread_rng();
        let last = self.layers.len() - 1;
        let mut h = x.clone();
        for (l, cell) in self.layers.iter().enumerate() {
            let next = cell.step(&h.view(), &state[l].view());
            state[l] = next.clone();
            h = next;
            if train && l < last {
                dropout_inplace(&mut h, self.dropout, &mut rng);
            }
        }
        h
    }

    /// Teacher-forced pass over [bsz, len, input_dim].
    ///
    /// Steps at or past a row's true length neither advance state nor write
    /// output, so trailing outputs stay zero (matching padded unpacking).
    pub fn forward(
        &self,
        inputs: &Array3<f32>,
        lengths: &[usize],
        train: bool,
    ) -> ModelResult<Array3<f32>> {
        let (bsz, len, width) = inputs.dim();
        if width != self.input_dim() {
            return Err(shape_mismatch("gru input width", self.input_dim(), width));
        }
        if lengths.len() != bsz {
            return Err(shape_mismatch("gru lengths", bsz, lengths.len()));
        }

        let mut out = Array3::zeros((bsz, len, self.hidden_dim()));
        for b in 0..bsz {
            let mut state = self.zero_state();
            for t in 0..lengths[b].min(len) {
                let x = inputs.slice(s![b, t, ..]).to_owned();
                let h = self.step(&x, &mut state, train);
                out.slice_mut(s![b, t, ..]).assign(&h);
            }
        }
        Ok(out)
    }
}
