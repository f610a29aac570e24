//! End-to-end checks over the full encode -> decode -> loss pipeline.

use graphedit_core::{Dictionary, GraphBuilder, Graph};
use graphedit_model::batch::{EncoderBatch, Sample, TrainBatch};
use graphedit_model::{EncoderSpec, GraphEditor, HashedBowEncoder, ModelConfig};

fn dicts() -> (Dictionary, Dictionary) {
    let nodes = Dictionary::new(["<s>", "</s>", "start", "mid", "end"]).unwrap();
    let edges = Dictionary::new(["modifies"]).unwrap();
    (nodes, edges)
}

/// Fully connected 3-node graph, one serialized token per node.
fn fully_connected(node_dict: &Dictionary, edge_dict: &Dictionary) -> Graph {
    let mut builder = GraphBuilder::new(node_dict, edge_dict);
    let a = builder.node("start", &[20]).unwrap();
    let b = builder.node("mid", &[21]).unwrap();
    let c = builder.node("end", &[22]).unwrap();
    for &(u, v) in &[(a, b), (b, a), (a, c), (c, a), (b, c), (c, b)] {
        builder.link(u, v, "modifies").unwrap();
    }
    builder.finish("</s>").unwrap()
}

fn model(node_dict: &Dictionary, edge_dict: &Dictionary) -> GraphEditor<HashedBowEncoder> {
    let config = ModelConfig {
        encoder: EncoderSpec {
            source: "hashed-bow".to_string(),
            hidden_dim: 24,
            vocab_size: 128,
        },
        node_embed_dim: 24,
        node_hidden_dim: 16,
        edge_embed_dim: 12,
        edge_hidden_dim: 16,
        decoder_layers: 2,
        dropout: 0.1,
        max_nodes: 10,
        ..ModelConfig::default()
    };
    let encoder = HashedBowEncoder::new(24, 128);
    GraphEditor::new(config, node_dict, edge_dict, encoder).unwrap()
}

#[test]
fn fully_connected_source_yields_all_true_memory_mask() {
    let (node_dict, edge_dict) = dicts();
    let editor = model(&node_dict, &edge_dict);
    let source = fully_connected(&node_dict, &edge_dict);

    // 5-token instruction + 3 node tokens => joint sequence of 8, no padding
    let instruction = vec![10usize, 11, 12, 13, 14];
    let enc = EncoderBatch::new(&[instruction], &[&source], node_dict.pad()).unwrap();
    assert_eq!(enc.text_len, 5);

    let (memory, edge_embed) = editor.encode(&enc).unwrap();
    assert_eq!(memory.states.dim(), (1, 8, 24));
    assert_eq!(memory.mask.dim(), (1, 8));
    assert!(memory.mask.iter().all(|&m| m), "no padding, all valid");
    assert_eq!(edge_embed.dim(), (1, 4, 4, 24));
}

#[test]
fn fully_connected_source_yields_all_true_structural_mask() {
    use graphedit_model::encoder::JointEncoder;
    use graphedit_model::mask::structural_mask;
    use graphedit_core::{BLANK_ID, PAD_ID};

    let (node_dict, edge_dict) = dicts();
    let source = fully_connected(&node_dict, &edge_dict);

    let instruction = vec![10usize, 11, 12, 13, 14];
    let enc = EncoderBatch::new(&[instruction], &[&source], PAD_ID).unwrap();

    let joint = JointEncoder::new(PAD_ID, BLANK_ID);
    let adjacency = joint.adjacency(&enc.edges);
    let mask = structural_mask(&adjacency, &enc.spans, &enc.joint_ids, enc.text_len, PAD_ID)
        .unwrap();

    assert_eq!(mask.dim(), (1, 8, 8));
    assert!(
        mask.iter().all(|&m| m),
        "text rules plus full adjacency must light every entry"
    );
}

#[test]
fn train_and_generate_round_trip() {
    let (node_dict, edge_dict) = dicts();
    let editor = model(&node_dict, &edge_dict);
    let source = fully_connected(&node_dict, &edge_dict);

    let sample = Sample {
        instruction: vec![10, 11, 12, 13, 14],
        source: source.clone(),
        target: fully_connected(&node_dict, &edge_dict),
    };
    let start = node_dict.index("<s>").unwrap();
    let batch = TrainBatch::new(&[sample], start, node_dict.pad(), edge_dict.blank()).unwrap();

    let loss = editor.forward(&batch, true).unwrap();
    assert!(loss.is_finite() && loss > 0.0);

    let edited = editor.generate(&[10, 11, 12, 13, 14], &source).unwrap();
    edited.validate().unwrap();
    let stop = node_dict.index("</s>").unwrap();
    assert_eq!(*edited.nodes.last().unwrap(), stop);
    // every generated edge id is a valid edge-dictionary entry
    for row in &edited.edges {
        for &id in row {
            assert!(id < edge_dict.len().max(node_dict.len()));
        }
    }
}

#[test]
fn degenerate_single_node_target_still_trains() {
    let (node_dict, edge_dict) = dicts();
    let editor = model(&node_dict, &edge_dict);

    // target with a single real node: decode length 2, pairing falls back
    // to the trivial (0, 0) pair
    let mut builder = GraphBuilder::new(&node_dict, &edge_dict);
    builder.node("start", &[20]).unwrap();
    let target = builder.finish("</s>").unwrap();

    let sample = Sample {
        instruction: vec![10, 11],
        source: fully_connected(&node_dict, &edge_dict),
        target,
    };
    let start = node_dict.index("<s>").unwrap();
    let batch = TrainBatch::new(&[sample], start, node_dict.pad(), edge_dict.blank()).unwrap();

    assert_eq!(batch.edge_out.dim(), (1, 1));
    let loss = editor.forward(&batch, false).unwrap();
    assert!(loss.is_finite());
}
