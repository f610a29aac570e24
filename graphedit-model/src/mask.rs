//! Structural attention mask over the joint [text | graph-token] sequence.
//!
//! Visibility rules, in application order:
//! 1. text rows and columns are fully visible (text attends everything,
//!    everything attends text),
//! 2. the diagonal is visible (self-attention),
//! 3. pad positions are isolated — their whole row and column go false,
//!    overriding the rules above (including self-visibility),
//! 4. for every adjacent node pair, the rectangular block spanned by the two
//!    nodes' token spans (offset by `text_len`) goes true. Pad positions fall
//!    outside any valid span, so painting cannot undo rule 3. A node the
//!    adjacency refers to but missing from the span table is skipped.
//!
//! Painting is O(bsz * nodes^2) and dominates encoding cost; batch elements
//! are independent, so the builder fans out across them with rayon.

use crate::{shape_mismatch, ModelResult};
use ndarray::{s, Array2, Array3, Axis};
use rayon::prelude::*;

/// Build the boolean visibility mask [bsz, seq, seq] from graph adjacency,
/// node token spans and the joint token ids.
pub fn structural_mask(
    adjacency: &Array3<bool>,
    spans: &[Vec<(usize, usize)>],
    token_ids: &Array2<usize>,
    text_len: usize,
    pad: usize,
) -> ModelResult<Array3<bool>> {
    let (bsz, seq) = token_ids.dim();
    let (adj_bsz, nodes, nodes_b) = adjacency.dim();
    if adj_bsz != bsz || spans.len() != bsz {
        return Err(shape_mismatch(
            "mask batch",
            bsz,
            format!("adjacency {adj_bsz}, spans {}", spans.len()),
        ));
    }
    if nodes != nodes_b {
        return Err(shape_mismatch(
            "adjacency matrix",
            format!("{nodes}x{nodes}"),
            format!("{nodes}x{nodes_b}"),
        ));
    }
    if text_len > seq {
        return Err(shape_mismatch("text prefix", format!("<= {seq}"), text_len));
    }

    let planes: Vec<Array2<bool>> = (0..bsz)
        .into_par_iter()
        .map(|b| {
            let mut plane = Array2::from_elem((seq, seq), false);

            plane.slice_mut(s![..text_len, ..]).fill(true);
            plane.slice_mut(s![.., ..text_len]).fill(true);
            for i in 0..seq {
                plane[[i, i]] = true;
            }

            for p in 0..seq {
                if token_ids[[b, p]] == pad {
                    plane.slice_mut(s![p, ..]).fill(false);
                    plane.slice_mut(s![.., p]).fill(false);
                }
            }

            let spans_b = &spans[b];
            for u in 0..nodes {
                for v in 0..nodes {
                    if !adjacency[[b, u, v]] {
                        continue;
                    }
                    let (Some(&(su, eu)), Some(&(sv, ev))) = (spans_b.get(u), spans_b.get(v))
                    else {
                        continue;
                    };
                    let (su, eu) = ((su + text_len).min(seq), (eu + text_len).min(seq));
                    let (sv, ev) = ((sv + text_len).min(seq), (ev + text_len).min(seq));
                    plane.slice_mut(s![su..eu, sv..ev]).fill(true);
                }
            }

            plane
        })
        .collect();

    let mut mask = Array3::from_elem((bsz, seq, seq), false);
    for (b, plane) in planes.into_iter().enumerate() {
        mask.index_axis_mut(Axis(0), b).assign(&plane);
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphedit_core::PAD_ID;
    use ndarray::arr2;

    fn diag_adjacency(bsz: usize, n: usize) -> Array3<bool> {
        Array3::from_shape_fn((bsz, n, n), |(_, u, v)| u == v)
    }

    #[test]
    fn test_text_rows_and_columns_fully_visible() {
        let ids = arr2(&[[5usize, 6, 7, 20, 21, 22]]);
        let spans = vec![vec![(0, 2), (2, 3)]];
        let mask = structural_mask(&diag_adjacency(1, 2), &spans, &ids, 3, PAD_ID).unwrap();

        for i in 0..6 {
            for j in 0..6 {
                if i < 3 || j < 3 {
                    assert!(mask[[0, i, j]], "text rule failed at ({i}, {j})");
                }
            }
        }
    }

    #[test]
    fn test_pad_isolation_overrides_everything() {
        // pad inside the text prefix and at the end of the graph suffix
        let ids = arr2(&[[5usize, PAD_ID, 20, 21, PAD_ID]]);
        let spans = vec![vec![(0, 2)]];
        let mask = structural_mask(&diag_adjacency(1, 1), &spans, &ids, 2, PAD_ID).unwrap();

        for &p in &[1usize, 4] {
            assert!(!mask[[0, p, p]], "pad self-visibility must be false");
            for q in 0..5 {
                assert!(!mask[[0, p, q]]);
                assert!(!mask[[0, q, p]]);
            }
        }
    }

    #[test]
    fn test_self_loops_only_paint_diagonal_blocks() {
        // two single-token nodes, no edges beyond forced self-loops
        let ids = arr2(&[[5usize, 6, 20, 21]]);
        let spans = vec![vec![(0, 1), (1, 2)]];
        let mask = structural_mask(&diag_adjacency(1, 2), &spans, &ids, 2, PAD_ID).unwrap();

        // off-diagonal between the two node blocks stays dark
        assert!(!mask[[0, 2, 3]]);
        assert!(!mask[[0, 3, 2]]);
        // diagonal survives
        assert!(mask[[0, 2, 2]]);
        assert!(mask[[0, 3, 3]]);
    }

    #[test]
    fn test_adjacent_nodes_paint_full_blocks() {
        let ids = arr2(&[[5usize, 20, 21, 22, 23]]);
        let spans = vec![vec![(0, 2), (2, 4)]];
        let mut adjacency = diag_adjacency(1, 2);
        adjacency[[0, 0, 1]] = true;

        let mask = structural_mask(&adjacency, &spans, &ids, 1, PAD_ID).unwrap();

        // node 0 tokens (abs 1..3) see node 1 tokens (abs 3..5)
        for i in 1..3 {
            for j in 3..5 {
                assert!(mask[[0, i, j]], "block not painted at ({i}, {j})");
            }
        }
        // but not the reverse: the edge was directed
        assert!(!mask[[0, 3, 2]]);
    }

    #[test]
    fn test_node_without_span_is_skipped() {
        // adjacency knows 2 nodes but only node 0 has a span; token 30 at
        // position 3 belongs to the spanless node
        let ids = arr2(&[[5usize, 20, 21, 30]]);
        let spans = vec![vec![(0, 2)]];
        let mut adjacency = diag_adjacency(1, 2);
        adjacency[[0, 0, 1]] = true;
        adjacency[[0, 1, 0]] = true;

        let mask = structural_mask(&adjacency, &spans, &ids, 1, PAD_ID).unwrap();
        // no block was painted toward or from the spanless node's token
        assert!(!mask[[0, 3, 1]]);
        assert!(!mask[[0, 1, 3]]);
        // its self-visibility still holds
        assert!(mask[[0, 3, 3]]);
    }

    #[test]
    fn test_batch_mismatch_rejected() {
        let ids = arr2(&[[5usize, 20]]);
        let spans: Vec<Vec<(usize, usize)>> = vec![];
        assert!(structural_mask(&diag_adjacency(1, 1), &spans, &ids, 1, PAD_ID).is_err());
    }
}
