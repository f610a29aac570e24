//! Joint node/edge cross-entropy, padding ignored, normalized per batch
//! element.

use crate::{shape_mismatch, ModelError, ModelResult};
use ndarray::{s, Array2, Array3};

/// Sum-reduced cross-entropy over flattened predictions, skipping steps whose
/// target is the ignored (pad) class.
///
/// Numerically stable log-softmax: finite logits always yield a finite loss,
/// and an all-ignored tensor contributes exactly 0.
pub fn cross_entropy_sum(
    logits: &Array3<f32>,
    targets: &Array2<usize>,
    ignore: usize,
) -> ModelResult<f32> {
    let (bsz, steps, vocab) = logits.dim();
    if targets.dim() != (bsz, steps) {
        return Err(shape_mismatch(
            "loss targets",
            format!("({bsz}, {steps})"),
            format!("{:?}", targets.dim()),
        ));
    }

    let mut total = 0.0f32;
    for b in 0..bsz {
        for t in 0..steps {
            let target = targets[[b, t]];
            if target == ignore {
                continue;
            }
            if target >= vocab {
                return Err(ModelError::Vocabulary { id: target, vocab });
            }
            let row = logits.slice(s![b, t, ..]);
            let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let lse = max + row.mapv(|x| (x - max).exp()).sum().ln();
            total += lse - row[target];
        }
    }
    Ok(total)
}

/// Combined graph-edit loss: node and edge cross-entropy totals summed, then
/// divided by the batch size.
pub fn edit_loss(
    node_logits: &Array3<f32>,
    node_targets: &Array2<usize>,
    edge_logits: &Array3<f32>,
    edge_targets: &Array2<usize>,
    node_pad: usize,
    edge_pad: usize,
) -> ModelResult<f32> {
    let bsz = node_logits.dim().0;
    if edge_logits.dim().0 != bsz {
        return Err(shape_mismatch("loss batch", bsz, edge_logits.dim().0));
    }
    let node_loss = cross_entropy_sum(node_logits, node_targets, node_pad)?;
    let edge_loss = cross_entropy_sum(edge_logits, edge_targets, edge_pad)?;
    Ok((node_loss + edge_loss) / bsz as f32)
}
