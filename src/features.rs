use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::pyramid::{ImageAccess, ImagePyramid, Scale};
use crate::types::{Point, Shape};

/// A pixel-difference feature anchored to two landmarks.
///
/// Offsets are fractions of the origin image width (x) and height (y). The
/// feature value is the intensity at the first point minus the intensity at
/// the second, both sampled at `scale`'s pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub scale: Scale,
    /// Index of the first anchor landmark in the shape.
    pub landmark_id1: usize,
    /// Index of the second anchor landmark. May equal `landmark_id1`.
    pub landmark_id2: usize,
    pub offset1_x: f64,
    pub offset1_y: f64,
    pub offset2_x: f64,
    pub offset2_y: f64,
}

impl Feature {
    /// Pixel positions of both anchors in the selected pyramid level,
    /// clamped to the nearest valid pixel.
    pub fn points<I: ImageAccess>(
        &self,
        pyramid: &ImagePyramid<I>,
        shape: &Shape,
    ) -> ((u32, u32), (u32, u32)) {
        let origin = &pyramid.origin;
        let img = pyramid.level(self.scale);
        let ratio = pyramid.ratio(self.scale);

        let ow = f64::from(origin.width());
        let oh = f64::from(origin.height());
        let offset1 = Point::new(ow * self.offset1_x, oh * self.offset1_y);
        let offset2 = Point::new(ow * self.offset2_x, oh * self.offset2_y);
        let p1 = shape.landmark(self.landmark_id1) + offset1;
        let p2 = shape.landmark(self.landmark_id2) + offset2;

        (
            to_pixel(p1 * ratio, img.width(), img.height()),
            to_pixel(p2 * ratio, img.width(), img.height()),
        )
    }

    /// Intensity difference between the two anchor points, in [-255, 255].
    pub fn evaluate<I: ImageAccess>(&self, pyramid: &ImagePyramid<I>, shape: &Shape) -> i32 {
        let img = pyramid.level(self.scale);
        let ((x1, y1), (x2, y2)) = self.points(pyramid, shape);
        i32::from(img.get_pixel(x1, y1)) - i32::from(img.get_pixel(x2, y2))
    }
}

/// Round to the nearest pixel and clamp into a `width` x `height` level.
#[inline]
fn to_pixel(p: Point, width: u32, height: u32) -> (u32, u32) {
    (clamp_coord(p.x.round(), width), clamp_coord(p.y.round(), height))
}

#[inline]
fn clamp_coord(v: f64, len: u32) -> u32 {
    if v < 0.0 {
        0
    } else if v >= f64::from(len) {
        len - 1
    } else {
        v as u32
    }
}

/// Evaluate one feature over a batch of samples. Results follow sample order.
pub fn evaluate_samples<I>(
    feature: &Feature,
    pyramids: &[ImagePyramid<I>],
    shapes: &[Shape],
) -> Vec<i32>
where
    I: ImageAccess + Sync,
{
    debug_assert_eq!(pyramids.len(), shapes.len());
    pyramids
        .par_iter()
        .zip(shapes.par_iter())
        .map(|(pyramid, shape)| feature.evaluate(pyramid, shape))
        .collect()
}

/// Evaluate a whole feature pool over a batch of samples.
///
/// Row `i` holds feature `i`'s value for every sample.
pub fn feature_matrix<I>(
    features: &[Feature],
    pyramids: &[ImagePyramid<I>],
    shapes: &[Shape],
) -> Vec<Vec<i32>>
where
    I: ImageAccess + Sync,
{
    debug_assert_eq!(pyramids.len(), shapes.len());
    features
        .par_iter()
        .map(|feature| {
            pyramids
                .iter()
                .zip(shapes)
                .map(|(pyramid, shape)| feature.evaluate(pyramid, shape))
                .collect()
        })
        .collect()
}

/// Worker pool sized for hard negative mining.
pub fn mining_pool(config: &Config) -> Result<rayon::ThreadPool> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.mining.mining_pool_size)
        .thread_name(|i| format!("jda-mining-{i}"))
        .build()?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::GrayImage;

    fn feature(scale: Scale, id1: usize, id2: usize) -> Feature {
        Feature {
            scale,
            landmark_id1: id1,
            landmark_id2: id2,
            offset1_x: 0.0,
            offset1_y: 0.0,
            offset2_x: 0.0,
            offset2_y: 0.0,
        }
    }

    /// 10x10 origin with a horizontal gradient, 5x5 half, 3x3 quarter.
    fn gradient_pyramid() -> ImagePyramid {
        ImagePyramid::new(
            GrayImage::from_fn(10, 10, |x, y| (x * 25 + y) as u8),
            GrayImage::from_fn(5, 5, |x, y| (x * 50 + y * 2) as u8),
            GrayImage::from_fn(3, 3, |x, y| (x * 100 + y * 3) as u8),
        )
    }

    fn shape(points: &[(f64, f64)]) -> Shape {
        Shape::from_points(points.iter().map(|&(x, y)| Point::new(x, y)))
    }

    #[test]
    fn feature_computation() {
        let pyramid = gradient_pyramid();
        let s = shape(&[(2.0, 5.0), (7.0, 5.0)]);

        // 55 - 180
        assert_eq!(feature(Scale::Origin, 0, 1).evaluate(&pyramid, &s), -125);
        assert_eq!(feature(Scale::Origin, 1, 0).evaluate(&pyramid, &s), 125);
    }

    #[test]
    fn same_landmark_same_offset_is_zero() {
        let pyramid = gradient_pyramid();
        let s = shape(&[(3.3, 6.7), (-4.0, 20.0)]);
        for scale in [Scale::Origin, Scale::Half, Scale::Quarter] {
            for id in 0..2 {
                assert_eq!(feature(scale, id, id).evaluate(&pyramid, &s), 0);
            }
        }
    }

    #[test]
    fn offsets_scale_with_origin_size() {
        let pyramid = ImagePyramid::new(
            GrayImage::from_fn(20, 10, |x, y| (x * 10 + y) as u8),
            GrayImage::from_fn(10, 5, |_, _| 0),
            GrayImage::from_fn(5, 3, |_, _| 0),
        );
        let s = shape(&[(0.0, 0.0)]);
        let mut f = feature(Scale::Origin, 0, 0);
        f.offset1_x = 0.25;
        f.offset1_y = 0.5;

        assert_eq!(f.points(&pyramid, &s), ((5, 5), (0, 0)));
        assert_eq!(f.evaluate(&pyramid, &s), 55);
    }

    #[test]
    fn column_past_the_edge_clamps_to_last() {
        let pyramid = gradient_pyramid();
        let edge = shape(&[(10.0, 5.0), (0.0, 0.0)]);
        let last = shape(&[(9.0, 5.0), (0.0, 0.0)]);
        let f = feature(Scale::Origin, 0, 1);

        assert_eq!(f.points(&pyramid, &edge).0, (9, 5));
        assert_eq!(f.evaluate(&pyramid, &edge), f.evaluate(&pyramid, &last));
    }

    #[test]
    fn row_past_the_edge_clamps_to_last() {
        let pyramid = gradient_pyramid();
        let edge = shape(&[(4.0, 10.0), (0.0, 0.0)]);
        let last = shape(&[(4.0, 9.0), (0.0, 0.0)]);
        let f = feature(Scale::Origin, 0, 1);

        assert_eq!(f.points(&pyramid, &edge).0, (4, 9));
        assert_eq!(f.evaluate(&pyramid, &edge), f.evaluate(&pyramid, &last));
    }

    #[test]
    fn coarse_levels_clamp_to_their_own_edge() {
        let pyramid = gradient_pyramid();
        let f = feature(Scale::Half, 0, 1);
        // (10, 10) * 0.5 lands exactly on the 5x5 level's width and height
        let edge = shape(&[(10.0, 10.0), (0.0, 0.0)]);
        let last = shape(&[(8.0, 8.0), (0.0, 0.0)]);
        assert_eq!(f.points(&pyramid, &edge).0, (4, 4));
        assert_eq!(f.evaluate(&pyramid, &edge), f.evaluate(&pyramid, &last));
        assert_eq!(f.evaluate(&pyramid, &edge), 208);

        let f = feature(Scale::Quarter, 0, 1);
        // (10, 10) * 0.3 rounds to 3, one past the 3x3 level
        assert_eq!(f.points(&pyramid, &edge).0, (2, 2));
        let below = shape(&[(-2.0, 12.0), (0.0, 0.0)]);
        assert_eq!(f.points(&pyramid, &below).0, (0, 2));
    }

    #[test]
    fn negative_coordinates_clamp_to_zero() {
        let pyramid = gradient_pyramid();
        let neg = shape(&[(-3.0, -0.6), (9.0, 9.0)]);
        let zero = shape(&[(0.0, 0.0), (9.0, 9.0)]);
        let f = feature(Scale::Origin, 0, 1);

        assert_eq!(f.points(&pyramid, &neg).0, (0, 0));
        assert_eq!(f.evaluate(&pyramid, &neg), f.evaluate(&pyramid, &zero));
    }

    #[test]
    fn projects_into_coarser_levels() {
        let pyramid = gradient_pyramid();
        // (5, 5) * 0.5 = (2.5, 2.5), rounded away from zero
        let s = shape(&[(5.0, 5.0), (0.0, 0.0)]);
        let f = feature(Scale::Half, 0, 1);
        assert_eq!(f.points(&pyramid, &s), ((3, 3), (0, 0)));
        assert_eq!(f.evaluate(&pyramid, &s), 156);

        // quarter ratio is 3/10: (7, 7) -> (2.1, 2.1) -> (2, 2)
        let s = shape(&[(7.0, 7.0), (0.0, 0.0)]);
        let f = feature(Scale::Quarter, 0, 1);
        assert_eq!(f.points(&pyramid, &s), ((2, 2), (0, 0)));
        assert_eq!(f.evaluate(&pyramid, &s), 206);
    }

    #[test]
    fn origin_ignores_level_dimensions() {
        let s = shape(&[(6.0, 3.0), (1.0, 1.0)]);
        let f = feature(Scale::Origin, 0, 1);
        let a = gradient_pyramid();
        let b = ImagePyramid::new(
            GrayImage::from_fn(10, 10, |x, y| (x * 25 + y) as u8),
            GrayImage::from_fn(7, 2, |_, _| 9),
            GrayImage::from_fn(1, 1, |_, _| 9),
        );
        assert_eq!(f.points(&a, &s), ((6, 3), (1, 1)));
        assert_eq!(f.evaluate(&a, &s), f.evaluate(&b, &s));
    }

    #[test]
    fn values_stay_within_byte_difference() {
        let pyramid = ImagePyramid::new(
            GrayImage::from_fn(10, 10, |x, _| if x < 5 { 0 } else { 255 }),
            GrayImage::from_fn(5, 5, |x, _| if x < 2 { 255 } else { 0 }),
            GrayImage::from_fn(3, 3, |x, y| ((x + y) * 127) as u8),
        );
        for scale in [Scale::Origin, Scale::Half, Scale::Quarter] {
            for x in -5..15i32 {
                let s = shape(&[(f64::from(x), 4.0), (f64::from(14 - x), 4.0)]);
                let v = feature(scale, 0, 1).evaluate(&pyramid, &s);
                assert!((-255..=255).contains(&v));
            }
        }
        let s = shape(&[(0.0, 0.0), (9.0, 0.0)]);
        assert_eq!(feature(Scale::Origin, 0, 1).evaluate(&pyramid, &s), -255);
        assert_eq!(feature(Scale::Origin, 1, 0).evaluate(&pyramid, &s), 255);
    }

    #[test]
    fn parallel_evaluation_matches_sequential() {
        let pyramids: Vec<_> = (0..16).map(|_| gradient_pyramid()).collect();
        let shapes: Vec<_> = (0..16i32)
            .map(|i| shape(&[(f64::from(i) * 0.7, 3.0), (9.0 - f64::from(i) * 0.4, 8.0)]))
            .collect();
        let features = [
            feature(Scale::Origin, 0, 1),
            feature(Scale::Half, 1, 0),
            feature(Scale::Quarter, 0, 1),
        ];

        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let matrix = pool.install(|| feature_matrix(&features, &pyramids, &shapes));

        for (f, row) in features.iter().zip(&matrix) {
            let sequential: Vec<i32> = pyramids
                .iter()
                .zip(&shapes)
                .map(|(p, s)| f.evaluate(p, s))
                .collect();
            assert_eq!(row, &sequential);
            assert_eq!(pool.install(|| evaluate_samples(f, &pyramids, &shapes)), sequential);
        }
    }

    #[test]
    fn unknown_scale_code_fails_to_decode() {
        let json = r#"{"scale": 3, "landmark_id1": 0, "landmark_id2": 0,
            "offset1_x": 0.0, "offset1_y": 0.0, "offset2_x": 0.0, "offset2_y": 0.0}"#;
        let err = serde_json::from_str::<Feature>(json).unwrap_err();
        assert!(err.to_string().contains("Unsupported SCALE"));

        let ok = json.replace(r#""scale": 3"#, r#""scale": 1"#);
        assert_eq!(serde_json::from_str::<Feature>(&ok).unwrap().scale, Scale::Half);
    }
}
