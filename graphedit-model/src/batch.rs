//! Tensor assembly: padding samples into the rectangular batches the
//! encoder and generators consume.

use crate::pairing::{flatten_edge_labels, pair_count};
use crate::{shape_mismatch, ModelResult};
use graphedit_core::{build_joint, pad_rows, shifted_pair, Graph};
use ndarray::{Array2, Array3};

/// One training example: an instruction over a source graph, supervised by
/// the target graph.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Instruction token ids (text dictionary)
    pub instruction: Vec<usize>,
    /// The graph to edit
    pub source: Graph,
    /// The edited graph
    pub target: Graph,
}

fn rows_to_array(rows: Vec<Vec<usize>>) -> Array2<usize> {
    let bsz = rows.len();
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    Array2::from_shape_fn((bsz, width), |(b, i)| rows[b][i])
}

/// Encoder-side tensors: the joint sequence plus the source graphs'
/// edge matrices and node spans.
#[derive(Debug, Clone)]
pub struct EncoderBatch {
    /// Joint token ids [bsz, text_len + graph_len]
    pub joint_ids: Array2<usize>,
    /// Segment flags, 0 text / 1 graph [bsz, seq]
    pub segment_ids: Array2<usize>,
    /// Width of the text prefix
    pub text_len: usize,
    /// Source edge-type ids [bsz, n, n], padded with the pad id
    pub edges: Array3<usize>,
    /// Per-element node spans into the graph suffix
    pub spans: Vec<Vec<(usize, usize)>>,
}

impl EncoderBatch {
    /// Assemble encoder tensors from instructions and source graphs
    pub fn new(
        instructions: &[Vec<usize>],
        sources: &[&Graph],
        pad: usize,
    ) -> ModelResult<Self> {
        if instructions.is_empty() || instructions.len() != sources.len() {
            return Err(shape_mismatch(
                "encoder batch",
                format!("{} instructions", sources.len().max(1)),
                instructions.len(),
            ));
        }
        for source in sources {
            source.validate()?;
        }

        let graph_rows: Vec<Vec<usize>> =
            sources.iter().map(|g| g.node_tokens.clone()).collect();
        let joint = build_joint(instructions, &graph_rows, pad);

        let n_max = sources.iter().map(|g| g.node_count()).max().unwrap_or(0);
        let mut edges = Array3::from_elem((sources.len(), n_max, n_max), pad);
        for (b, source) in sources.iter().enumerate() {
            for (u, row) in source.edges.iter().enumerate() {
                for (v, &id) in row.iter().enumerate() {
                    edges[[b, u, v]] = id;
                }
            }
        }

        Ok(Self {
            joint_ids: rows_to_array(joint.ids),
            segment_ids: rows_to_array(joint.segments),
            text_len: joint.text_len,
            edges,
            spans: sources.iter().map(|g| g.spans.clone()).collect(),
        })
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.joint_ids.nrows()
    }
}

/// Teacher-forcing tensors for a training step.
#[derive(Debug, Clone)]
pub struct TrainBatch {
    /// Encoder-side tensors
    pub enc: EncoderBatch,
    /// Decoder input node ids (start-shifted) [bsz, steps]
    pub node_in: Array2<usize>,
    /// Node supervision [bsz, steps]
    pub node_out: Array2<usize>,
    /// True decode length per element
    pub node_lens: Vec<usize>,
    /// Decoder input edge ids (blank-led shift of the labels) [bsz, pairs]
    pub edge_in: Array2<usize>,
    /// Edge supervision in canonical pair order [bsz, pairs]
    pub edge_out: Array2<usize>,
}

impl TrainBatch {
    /// Assemble a full teacher-forced batch.
    ///
    /// `start` is the node-dictionary id fed at decode step 0; node rows are
    /// padded to the longest target, and edge labels are flattened in the
    /// canonical pair order over that padded length.
    pub fn new(samples: &[Sample], start: usize, pad: usize, blank: usize) -> ModelResult<Self> {
        let instructions: Vec<Vec<usize>> =
            samples.iter().map(|s| s.instruction.clone()).collect();
        let sources: Vec<&Graph> = samples.iter().map(|s| &s.source).collect();
        let enc = EncoderBatch::new(&instructions, &sources, pad)?;

        let mut in_rows = Vec::with_capacity(samples.len());
        let mut out_rows = Vec::with_capacity(samples.len());
        for sample in samples {
            sample.target.validate()?;
            let (input, output) = shifted_pair(&sample.target.nodes, start);
            in_rows.push(input);
            out_rows.push(output);
        }
        let (in_rows, node_lens) = pad_rows(&in_rows, None, pad);
        let (out_rows, _) = pad_rows(&out_rows, None, pad);
        let steps = in_rows.first().map(|r| r.len()).unwrap_or(0);

        let mut edge_out_rows = Vec::with_capacity(samples.len());
        let mut edge_in_rows = Vec::with_capacity(samples.len());
        for sample in samples {
            let labels = flatten_edge_labels(&sample.target.edges, steps, pad);
            let mut shifted = Vec::with_capacity(labels.len());
            shifted.push(blank);
            shifted.extend_from_slice(&labels[..labels.len() - 1]);
            edge_in_rows.push(shifted);
            edge_out_rows.push(labels);
        }
        debug_assert_eq!(
            edge_out_rows[0].len(),
            pair_count(steps),
            "edge labels must follow the pair enumeration"
        );

        Ok(Self {
            enc,
            node_in: rows_to_array(in_rows),
            node_out: rows_to_array(out_rows),
            node_lens,
            edge_in: rows_to_array(edge_in_rows),
            edge_out: rows_to_array(edge_out_rows),
        })
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.enc.batch_size()
    }

    /// Teacher-forced decode length
    pub fn steps(&self) -> usize {
        self.node_in.ncols()
    }
}
