//! Benchmarks for graphedit-model
//!
//! Covers:
//! - Structural mask building (the quadratic encoding hot path)
//! - Pair index construction and operand gathering
//! - A full teacher-forced forward pass on a small model

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graphedit_core::{Dictionary, GraphBuilder, Graph, PAD_ID};
use graphedit_model::batch::{Sample, TrainBatch};
use graphedit_model::mask::structural_mask;
use graphedit_model::pairing::{pair_indices, select_pairs};
use graphedit_model::{EncoderSpec, GraphEditor, HashedBowEncoder, ModelConfig};
use ndarray::{Array2, Array3};

fn dicts(node_symbols: usize) -> (Dictionary, Dictionary) {
    let names: Vec<String> = (0..node_symbols).map(|i| format!("n{i}")).collect();
    let mut all = vec!["<s>".to_string(), "</s>".to_string()];
    all.extend(names);
    let nodes = Dictionary::new(all).unwrap();
    let edges = Dictionary::new(["modifies"]).unwrap();
    (nodes, edges)
}

fn ring(node_dict: &Dictionary, edge_dict: &Dictionary, n: usize) -> Graph {
    let mut builder = GraphBuilder::new(node_dict, edge_dict);
    let mut indices = Vec::with_capacity(n);
    for i in 0..n {
        indices.push(builder.node(&format!("n{i}"), &[50 + i]).unwrap());
    }
    for i in 0..n {
        builder.link(indices[i], indices[(i + 1) % n], "modifies").unwrap();
    }
    builder.finish("</s>").unwrap()
}

// ============================================================================
// Structural mask
// ============================================================================

fn bench_mask_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural_mask");

    for nodes in [4usize, 16, 32].iter() {
        let seq = 8 + nodes;
        let ids = Array2::from_shape_fn((4, seq), |(_, i)| i + 2);
        let adjacency = Array3::from_shape_fn((4, *nodes, *nodes), |(_, u, v)| {
            u == v || (u + 1) % nodes == v
        });
        let spans: Vec<Vec<(usize, usize)>> =
            (0..4).map(|_| (0..*nodes).map(|i| (i, i + 1)).collect()).collect();

        group.bench_with_input(BenchmarkId::new("nodes", nodes), nodes, |b, _| {
            b.iter(|| {
                structural_mask(
                    black_box(&adjacency),
                    black_box(&spans),
                    black_box(&ids),
                    8,
                    PAD_ID,
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

// ============================================================================
// Pair index tables
// ============================================================================

fn bench_pair_indices(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_indices");

    for n in [8usize, 32, 64].iter() {
        group.bench_with_input(BenchmarkId::new("nodes", n), n, |b, &n| {
            b.iter(|| pair_indices(black_box(n)))
        });
    }

    group.finish();
}

fn bench_select_pairs(c: &mut Criterion) {
    let states = Array3::from_shape_fn((4, 32, 64), |(b, t, d)| (b + t + d) as f32 * 0.01);
    let (src, tgt) = pair_indices(32);

    c.bench_function("select_pairs_32", |b| {
        b.iter(|| select_pairs(black_box(&states), black_box(&src), black_box(&tgt)).unwrap())
    });
}

// ============================================================================
// Forward pass
// ============================================================================

fn bench_forward_pass(c: &mut Criterion) {
    let (node_dict, edge_dict) = dicts(8);
    let config = ModelConfig {
        encoder: EncoderSpec {
            source: "hashed-bow".to_string(),
            hidden_dim: 32,
            vocab_size: 256,
        },
        node_embed_dim: 32,
        node_hidden_dim: 32,
        edge_embed_dim: 32,
        edge_hidden_dim: 32,
        decoder_layers: 2,
        dropout: 0.0,
        ..ModelConfig::default()
    };
    let encoder = HashedBowEncoder::new(32, 256);
    let model = GraphEditor::new(config, &node_dict, &edge_dict, encoder).unwrap();

    let samples: Vec<Sample> = (0..4)
        .map(|_| Sample {
            instruction: vec![10, 11, 12, 13, 14],
            source: ring(&node_dict, &edge_dict, 6),
            target: ring(&node_dict, &edge_dict, 6),
        })
        .collect();
    let start = node_dict.index("<s>").unwrap();
    let batch = TrainBatch::new(&samples, start, node_dict.pad(), edge_dict.blank()).unwrap();

    c.bench_function("forward_pass_b4_n6", |b| {
        b.iter(|| model.forward(black_box(&batch), false).unwrap())
    });
}

criterion_group!(
    benches,
    bench_mask_scaling,
    bench_pair_indices,
    bench_select_pairs,
    bench_forward_pass,
);

criterion_main!(benches);
