//! # jda-core
//!
//! Numeric core of a joint cascade face detection and alignment trainer.
//!
//! This crate provides:
//! - **Configuration**: cascade and training hyperparameters loaded from JSON
//! - **Image Pyramid**: origin/half/quarter grayscale copies of each sample
//! - **Feature Evaluation**: landmark-anchored pixel-difference features
//! - **Error Metric**: normalized landmark displacement between stages
//!
//! The tree boosting, hard negative mining and detection drivers live outside
//! this crate and call into it millions of times per training run, so every
//! evaluation here is deterministic and free of shared mutable state.
//!
//! ## Feature Evaluation
//!
//! 1. Pick the pyramid level named by the feature's scale
//! 2. Offset both anchor landmarks by fractions of the origin image size
//! 3. Project into the level, round, and clamp to the nearest valid pixel
//! 4. Return the intensity difference of the two pixels
//!
//! ## Quick Start
//!
//! ```rust
//! use jda_core::{Feature, GrayImage, ImagePyramid, Point, Scale, Shape};
//!
//! let pyramid = ImagePyramid::new(
//!     GrayImage::from_fn(80, 80, |x, _| (x * 3) as u8),
//!     GrayImage::from_fn(40, 40, |x, _| (x * 6) as u8),
//!     GrayImage::from_fn(20, 20, |x, _| (x * 12) as u8),
//! );
//! let shape = Shape::from_points([Point::new(20.0, 40.0), Point::new(60.0, 40.0)]);
//!
//! let feature = Feature {
//!     scale: Scale::Half,
//!     landmark_id1: 0,
//!     landmark_id2: 1,
//!     offset1_x: 0.0,
//!     offset1_y: 0.0,
//!     offset2_x: 0.0,
//!     offset2_y: 0.0,
//! };
//! assert_eq!(feature.evaluate(&pyramid, &shape), 60 - 180);
//! ```

pub mod config;
pub mod diagnostics;
mod error;
mod features;
mod metrics;
mod pyramid;
mod types;

pub use config::{Checkpoint, Config, DataPaths, ImageSize, MiningParams, Phase, StageParams};
pub use error::{Error, Result};
pub use features::{evaluate_samples, feature_matrix, mining_pool, Feature};
pub use metrics::mean_error;
pub use pyramid::{GrayImage, ImageAccess, ImagePyramid, Scale};
pub use types::{Point, Shape};
