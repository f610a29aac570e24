//! Joint text/graph sequence assembly and batch padding.
//!
//! The joint sequence fed to the text encoder is the instruction tokens
//! followed by the serialized source-graph node tokens. The text prefix has a
//! fixed width per batch (`text_len`), so the mask builder can recover where
//! the graph suffix begins.

use serde::{Deserialize, Serialize};

/// Pad rows of ids to a common width, returning the padded rows and each
/// row's true length. `width` defaults to the longest row.
pub fn pad_rows(
    rows: &[Vec<usize>],
    width: Option<usize>,
    pad: usize,
) -> (Vec<Vec<usize>>, Vec<usize>) {
    let target = width.unwrap_or_else(|| rows.iter().map(|r| r.len()).max().unwrap_or(0));
    let lengths: Vec<usize> = rows.iter().map(|r| r.len().min(target)).collect();
    let padded = rows
        .iter()
        .map(|row| {
            let mut out = row.clone();
            out.truncate(target);
            out.resize(target, pad);
            out
        })
        .collect();
    (padded, lengths)
}

/// The concatenated instruction + graph-token sequence with segment flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointEncoding {
    /// Token ids, text prefix then graph suffix
    pub ids: Vec<Vec<usize>>,
    /// Segment flags: 0 over the text prefix, 1 over the graph suffix
    pub segments: Vec<Vec<usize>>,
    /// Width of the text prefix, constant across the batch
    pub text_len: usize,
}

impl JointEncoding {
    /// Joint sequence width
    pub fn seq_len(&self) -> usize {
        self.ids.first().map(|r| r.len()).unwrap_or(0)
    }
}

/// Assemble the joint encoding from per-element instruction rows and
/// serialized graph-token rows. Each side is padded to its own batch maximum.
pub fn build_joint(
    text_rows: &[Vec<usize>],
    graph_rows: &[Vec<usize>],
    pad: usize,
) -> JointEncoding {
    let (text, _) = pad_rows(text_rows, None, pad);
    let (graph, _) = pad_rows(graph_rows, None, pad);
    let text_len = text.first().map(|r| r.len()).unwrap_or(0);
    let graph_len = graph.first().map(|r| r.len()).unwrap_or(0);

    let mut ids = Vec::with_capacity(text.len());
    let mut segments = Vec::with_capacity(text.len());
    for (t, g) in text.iter().zip(graph.iter()) {
        let mut row = t.clone();
        row.extend_from_slice(g);
        ids.push(row);
        let mut seg = vec![0; text_len];
        seg.extend(std::iter::repeat(1).take(graph_len));
        segments.push(seg);
    }

    JointEncoding {
        ids,
        segments,
        text_len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PAD_ID;

    #[test]
    fn test_pad_rows_to_longest() {
        let rows = vec![vec![3, 4], vec![5, 6, 7]];
        let (padded, lengths) = pad_rows(&rows, None, PAD_ID);
        assert_eq!(padded, vec![vec![3, 4, 0], vec![5, 6, 7]]);
        assert_eq!(lengths, vec![2, 3]);
    }

    #[test]
    fn test_pad_rows_fixed_width() {
        let rows = vec![vec![3, 4]];
        let (padded, lengths) = pad_rows(&rows, Some(4), PAD_ID);
        assert_eq!(padded, vec![vec![3, 4, 0, 0]]);
        assert_eq!(lengths, vec![2]);
    }

    #[test]
    fn test_build_joint_segments_and_text_len() {
        let text = vec![vec![8, 9, 10], vec![8, 9]];
        let graph = vec![vec![20], vec![21, 22]];
        let joint = build_joint(&text, &graph, PAD_ID);

        assert_eq!(joint.text_len, 3);
        assert_eq!(joint.seq_len(), 5);
        assert_eq!(joint.ids[1], vec![8, 9, 0, 21, 22]);
        assert_eq!(joint.segments[0], vec![0, 0, 0, 1, 1]);
    }
}
