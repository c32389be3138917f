//! Alignment accuracy between cascade stages.

use crate::config::Config;
use crate::types::Shape;

/// Mean landmark displacement, normalized by the origin image width.
///
/// Sums the Euclidean distance between every ground-truth and predicted
/// landmark, divides by `landmark_n * N`, then by `image_size.origin_w`.
/// Both slices must hold the same number of shapes, each with
/// `config.landmark_n` landmarks.
pub fn mean_error(gt_shapes: &[Shape], current_shapes: &[Shape], config: &Config) -> f64 {
    debug_assert_eq!(gt_shapes.len(), current_shapes.len());
    let n = gt_shapes.len();
    let landmark_n = config.landmark_n;

    let mut e = 0.0;
    for (gt, current) in gt_shapes.iter().zip(current_shapes) {
        debug_assert_eq!(gt.num_landmarks(), landmark_n);
        debug_assert_eq!(current.num_landmarks(), landmark_n);
        for j in 0..landmark_n {
            e += gt.landmark(j).distance(&current.landmark(j));
        }
    }
    e /= (landmark_n * n) as f64;
    e /= f64::from(config.image_size.origin_w);
    e
}
