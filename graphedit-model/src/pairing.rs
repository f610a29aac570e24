//! Node-pair index tables for edge generation.
//!
//! The edge generator scores one edge type per node pair, in a single flat
//! sequence. The pair order is the canonical strictly-lower-triangular
//! enumeration: source index i from 1 to n-2 (node 0 is the start sentinel,
//! node n-1 the stop sentinel; neither is a source), and for each i, target
//! index j from 0 to i-1. Teacher-forced edge labels are flattened in the
//! same order, so the two sides cannot silently diverge.
//!
//! The tables are derived data: recomputed from the node-sequence length on
//! every forward pass, never persisted.

use crate::{ModelError, ModelResult};
use ndarray::{s, Array3};

/// Number of pairs produced for a node-sequence length
pub fn pair_count(n: usize) -> usize {
    if n <= 2 {
        1
    } else {
        (n - 1) * (n - 2) / 2
    }
}

/// Build the (source, target) index tables for a node-sequence length.
///
/// A degenerate sequence (n <= 2) falls back to the single trivial pair
/// (0, 0) so the edge generator always receives at least one step.
pub fn pair_indices(n: usize) -> (Vec<usize>, Vec<usize>) {
    if n <= 2 {
        return (vec![0], vec![0]);
    }
    let count = pair_count(n);
    let mut src = Vec::with_capacity(count);
    let mut tgt = Vec::with_capacity(count);
    for i in 1..n - 1 {
        for j in 0..i {
            src.push(i);
            tgt.push(j);
        }
    }
    (src, tgt)
}

/// Flatten a square edge-type matrix into the canonical pair order.
///
/// `n` is the (padded) node-sequence length driving the enumeration; pairs
/// whose indices fall outside the true matrix are labelled `pad` so the loss
/// ignores them.
pub fn flatten_edge_labels(edges: &[Vec<usize>], n: usize, pad: usize) -> Vec<usize> {
    let (src, tgt) = pair_indices(n);
    src.iter()
        .zip(tgt.iter())
        .map(|(&i, &j)| {
            edges
                .get(i)
                .and_then(|row| row.get(j))
                .copied()
                .unwrap_or(pad)
        })
        .collect()
}

/// Gather (source, target) operand states for every pair from the node
/// generator's hidden-state tensor [bsz, steps, hidden].
///
/// An index past the available steps is fatal: once generation has begun
/// there is no valid fallback.
pub fn select_pairs(
    states: &Array3<f32>,
    src: &[usize],
    tgt: &[usize],
) -> ModelResult<(Array3<f32>, Array3<f32>)> {
    let (bsz, steps, hidden) = states.dim();
    let gather = |indices: &[usize]| -> ModelResult<Array3<f32>> {
        let mut out = Array3::zeros((bsz, indices.len(), hidden));
        for (k, &idx) in indices.iter().enumerate() {
            if idx >= steps {
                return Err(ModelError::IndexOutOfRange {
                    what: "node pair",
                    index: idx,
                    len: steps,
                });
            }
            for b in 0..bsz {
                let row = states.slice(s![b, idx, ..]);
                out.slice_mut(s![b, k, ..]).assign(&row);
            }
        }
        Ok(out)
    };
    Ok((gather(src)?, gather(tgt)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_lengths_fall_back_to_trivial_pair() {
        for n in 0..=2 {
            let (src, tgt) = pair_indices(n);
            assert_eq!(src, vec![0]);
            assert_eq!(tgt, vec![0]);
        }
    }

    #[test]
    fn test_pair_count_is_triangular() {
        for n in 3..12 {
            let (src, tgt) = pair_indices(n);
            let expected = (n - 2) * (n - 3) / 2 + (n - 2);
            assert_eq!(src.len(), expected);
            assert_eq!(tgt.len(), expected);
            assert_eq!(pair_count(n), expected);
            for (&i, &j) in src.iter().zip(tgt.iter()) {
                assert!(i < n && j < n);
                assert!(j < i, "target must precede source");
            }
        }
    }

    #[test]
    fn test_canonical_order() {
        let (src, tgt) = pair_indices(5);
        assert_eq!(src, vec![1, 2, 2, 3, 3, 3]);
        assert_eq!(tgt, vec![0, 0, 1, 0, 1, 2]);
    }

    #[test]
    fn test_flatten_follows_pair_order() {
        // edges[i][j] = 10*i + j, easy to recognize after flattening
        let edges: Vec<Vec<usize>> = (0..4).map(|i| (0..4).map(|j| 10 * i + j).collect()).collect();
        let labels = flatten_edge_labels(&edges, 4, 0);
        assert_eq!(labels, vec![10, 20, 21]);
    }

    #[test]
    fn test_flatten_pads_beyond_true_matrix() {
        let edges: Vec<Vec<usize>> = vec![vec![5, 5], vec![5, 5]];
        // padded length 4 enumerates pairs touching rows 2..3, all padded out
        let labels = flatten_edge_labels(&edges, 4, 0);
        assert_eq!(labels, vec![5, 0, 0]);
    }

    #[test]
    fn test_select_pairs_gathers_rows() {
        let states = Array3::from_shape_fn((2, 4, 3), |(b, t, d)| (b * 100 + t * 10 + d) as f32);
        let (src, tgt) = pair_indices(4);
        let (s_rows, t_rows) = select_pairs(&states, &src, &tgt).unwrap();

        assert_eq!(s_rows.dim(), (2, 3, 3));
        assert_eq!(s_rows[[0, 0, 0]], 10.0); // pair 0 source = state 1
        assert_eq!(t_rows[[0, 0, 0]], 0.0); // pair 0 target = state 0
        assert_eq!(s_rows[[1, 2, 1]], 121.0); // batch 1, pair 2 source = state 2
    }

    #[test]
    fn test_select_pairs_rejects_overrun() {
        let states = Array3::zeros((1, 2, 3));
        let err = select_pairs(&states, &[2], &[0]);
        assert!(matches!(err, Err(ModelError::IndexOutOfRange { .. })));
    }
}
