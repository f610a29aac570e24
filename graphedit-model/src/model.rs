//! The top-level graph editor: joint encoder, node generator, edge generator
//! and loss behind one forward surface.

use crate::batch::{EncoderBatch, Sample, TrainBatch};
use crate::decoder::{EdgeGenerator, NodeGenerator};
use crate::embedding::EmbeddingTable;
use crate::encoder::{EncoderSpec, JointEncoder, Memory, TextEncoder};
use crate::loss::edit_loss;
use crate::pairing::{pair_indices, select_pairs};
use crate::{shape_mismatch, ModelResult};
use graphedit_core::{Dictionary, Graph};
use ndarray::{Array1, Array4};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Model hyperparameters.
///
/// The external encoder's identity travels in `encoder` — supplied at
/// construction, never a hard-coded constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// External text encoder identity and dimensions
    pub encoder: EncoderSpec,
    /// Node-generator GRU input width
    pub node_embed_dim: usize,
    /// Node-generator recurrent width
    pub node_hidden_dim: usize,
    /// Edge-generator embedding input width
    pub edge_embed_dim: usize,
    /// Edge-generator recurrent width
    pub edge_hidden_dim: usize,
    /// GRU layers per generator
    pub decoder_layers: usize,
    /// Dropout rate inside the generators
    pub dropout: f32,
    /// Generation cap on emitted nodes
    pub max_nodes: usize,
    /// Node symbol fed at decode step 0
    pub start_symbol: String,
    /// Node symbol terminating generation
    pub stop_symbol: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderSpec::default(),
            node_embed_dim: 64,
            node_hidden_dim: 64,
            edge_embed_dim: 64,
            edge_hidden_dim: 64,
            decoder_layers: 2,
            dropout: 0.1,
            max_nodes: 48,
            start_symbol: "<s>".to_string(),
            stop_symbol: "</s>".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ModelState {
    config: ModelConfig,
    embeddings: EmbeddingTable,
    joint: JointEncoder,
    node_gen: NodeGenerator,
    edge_gen: EdgeGenerator,
    start_id: usize,
    stop_id: usize,
    pad_id: usize,
    blank_id: usize,
}

/// Graph-edit model: `forward` yields the teacher-forced training loss,
/// `encode` the standalone memory, `generate` a greedy edit.
pub struct GraphEditor<E: TextEncoder> {
    config: ModelConfig,
    text_encoder: E,
    embeddings: EmbeddingTable,
    joint: JointEncoder,
    node_gen: NodeGenerator,
    edge_gen: EdgeGenerator,
    start_id: usize,
    stop_id: usize,
    pad_id: usize,
    blank_id: usize,
}

fn argmax(row: &Array1<f32>) -> usize {
    row.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

impl<E: TextEncoder> GraphEditor<E> {
    /// Build a model over the node and edge dictionaries.
    ///
    /// One embedding table serves both vocabularies (they share an id space
    /// sized by the larger), keeping the input lookup and both output
    /// projections tied to the same weights.
    pub fn new(
        config: ModelConfig,
        node_dict: &Dictionary,
        edge_dict: &Dictionary,
        text_encoder: E,
    ) -> ModelResult<Self> {
        let enc_dim = config.encoder.hidden_dim;
        let vocab = node_dict.len().max(edge_dict.len());
        let embeddings = EmbeddingTable::new(vocab, enc_dim);

        let start_id = node_dict.require(&config.start_symbol)?;
        let stop_id = node_dict.require(&config.stop_symbol)?;

        let node_gen = NodeGenerator::new(
            enc_dim,
            config.node_embed_dim,
            config.node_hidden_dim,
            config.decoder_layers,
            config.dropout,
        );
        let edge_gen = EdgeGenerator::new(
            enc_dim,
            config.edge_embed_dim,
            config.node_hidden_dim,
            config.edge_hidden_dim,
            config.decoder_layers,
            config.dropout,
        );

        Ok(Self {
            joint: JointEncoder::new(node_dict.pad(), edge_dict.blank()),
            pad_id: node_dict.pad(),
            blank_id: edge_dict.blank(),
            config,
            text_encoder,
            embeddings,
            node_gen,
            edge_gen,
            start_id,
            stop_id,
        })
    }

    /// The model configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Total learnable parameters
    pub fn param_count(&self) -> usize {
        self.embeddings.param_count()
            + self.node_gen.param_count()
            + self.edge_gen.param_count()
    }

    /// Encode a batch into memory, usable standalone for decoding loops.
    ///
    /// Also returns the zeroed edge embedding tensor for conditioning.
    pub fn encode(&self, batch: &EncoderBatch) -> ModelResult<(Memory, Array4<f32>)> {
        self.joint
            .encode(&self.text_encoder, &self.embeddings, batch)
    }

    /// Teacher-forced forward pass returning the scalar edit loss.
    pub fn forward(&self, batch: &TrainBatch, train: bool) -> ModelResult<f32> {
        let bsz = batch.batch_size();
        if batch.node_in.nrows() != bsz || batch.edge_in.nrows() != bsz {
            return Err(shape_mismatch(
                "train batch",
                bsz,
                format!("{} / {}", batch.node_in.nrows(), batch.edge_in.nrows()),
            ));
        }

        let (memory, _edge_embed) = self.encode(&batch.enc)?;

        let (node_states, node_logits) = self.node_gen.forward(
            &self.embeddings,
            &memory,
            &batch.node_in,
            &batch.node_lens,
            train,
        )?;

        let (src_idx, tgt_idx) = pair_indices(batch.steps());
        if batch.edge_in.ncols() != src_idx.len() {
            return Err(shape_mismatch(
                "edge label sequence",
                src_idx.len(),
                batch.edge_in.ncols(),
            ));
        }
        let (src_states, tgt_states) = select_pairs(&node_states, &src_idx, &tgt_idx)?;

        let (_, edge_logits) = self.edge_gen.forward(
            &self.embeddings,
            &memory,
            &batch.edge_in,
            &src_states,
            &tgt_states,
            train,
        )?;

        edit_loss(
            &node_logits,
            &batch.node_out,
            &edge_logits,
            &batch.edge_out,
            self.pad_id,
            self.pad_id,
        )
    }

    /// Single-example convenience over [`GraphEditor::forward`]
    pub fn forward_sample(&self, sample: &Sample, train: bool) -> ModelResult<f32> {
        let batch = TrainBatch::new(
            std::slice::from_ref(sample),
            self.start_id,
            self.pad_id,
            self.blank_id,
        )?;
        self.forward(&batch, train)
    }

    /// Greedy autoregressive edit: decode nodes until the stop symbol (or
    /// the configured cap), then one edge type per node pair.
    pub fn generate(&self, instruction: &[usize], source: &Graph) -> ModelResult<Graph> {
        let enc = EncoderBatch::new(&[instruction.to_vec()], &[source], self.pad_id)?;
        let (memory, _) = self.encode(&enc)?;

        let mut ids = Vec::new();
        let mut states: Vec<Array1<f32>> = Vec::new();
        let mut decode = self.node_gen.begin_decode(&memory, 0);
        let mut prev = self.start_id;
        for _ in 0..self.config.max_nodes {
            let (hidden, logits) =
                self.node_gen
                    .step(&self.embeddings, &memory, 0, &mut decode, prev)?;
            let next = argmax(&logits);
            states.push(hidden);
            ids.push(next);
            prev = next;
            if next == self.stop_id {
                break;
            }
        }
        if ids.last() != Some(&self.stop_id) {
            ids.push(self.stop_id);
        }

        let n = ids.len();
        let (src_idx, tgt_idx) = pair_indices(n);
        let mut edges = vec![vec![self.blank_id; n]; n];
        if states.is_empty() {
            return Ok(Graph {
                nodes: ids,
                edges,
                node_tokens: Vec::new(),
                spans: Vec::new(),
            });
        }
        let mut decode = self.edge_gen.begin_decode(&memory, 0);
        let mut prev_edge = self.blank_id;
        for (&i, &j) in src_idx.iter().zip(tgt_idx.iter()) {
            let (_, logits) = self.edge_gen.step(
                &self.embeddings,
                &memory,
                0,
                &mut decode,
                prev_edge,
                &states[i].view(),
                &states[j].view(),
            )?;
            let label = argmax(&logits);
            edges[i][j] = label;
            prev_edge = label;
        }

        Ok(Graph {
            nodes: ids,
            edges,
            node_tokens: Vec::new(),
            spans: Vec::new(),
        })
    }

    /// Persist the learnable state as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ModelResult<()> {
        let state = ModelState {
            config: self.config.clone(),
            embeddings: self.embeddings.clone(),
            joint: self.joint.clone(),
            node_gen: self.node_gen.clone(),
            edge_gen: self.edge_gen.clone(),
            start_id: self.start_id,
            stop_id: self.stop_id,
            pad_id: self.pad_id,
            blank_id: self.blank_id,
        };
        let json = serde_json::to_string(&state)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Restore a saved model around a freshly constructed text encoder
    pub fn load<P: AsRef<Path>>(path: P, text_encoder: E) -> ModelResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let state: ModelState = serde_json::from_str(&json)?;
        Ok(Self {
            config: state.config,
            text_encoder,
            embeddings: state.embeddings,
            joint: state.joint,
            node_gen: state.node_gen,
            edge_gen: state.edge_gen,
            start_id: state.start_id,
            stop_id: state.stop_id,
            pad_id: state.pad_id,
            blank_id: state.blank_id,
        })
    }
}
