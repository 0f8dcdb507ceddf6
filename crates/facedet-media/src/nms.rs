//! Greedy IoU-based non-maximum suppression.

use facedet_models::Detection;

/// Default IoU above which a lower-scoring box is suppressed.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;

/// Keep at most `limit` detections, highest score first, such that no two
/// kept boxes overlap with IoU >= `iou_threshold`.
///
/// The sort is stable, so equal scores keep their decode order.
pub fn suppress(mut candidates: Vec<Detection>, iou_threshold: f32, limit: usize) -> Vec<Detection> {
    if candidates.is_empty() || limit == 0 {
        return Vec::new();
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(limit.min(candidates.len()));
    for candidate in candidates {
        if keep.len() >= limit {
            break;
        }
        let overlaps = keep
            .iter()
            .any(|kept| kept.bounds.iou(&candidate.bounds) >= iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }

    keep
}
