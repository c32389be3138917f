//! Grayscale buffers and the three-level pyramid features are sampled from.

use std::path::Path;

use image::imageops::{self, FilterType};

use serde::{Deserialize, Serialize};

use crate::config::ImageSize;
use crate::error::{Error, Result};

/// Read access to 8-bit grayscale intensities.
pub trait ImageAccess {
    /// Intensity at (x, y). Callers are expected to pass in-range coordinates.
    fn get_pixel(&self, x: u32, y: u32) -> u8;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A row-major grayscale image buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage {
    buf: image::GrayImage,
}

impl GrayImage {
    /// Wrap a row-major buffer. Returns `None` if `data` is not
    /// `width * height` bytes long.
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        image::GrayImage::from_raw(width, height, data).map(|buf| Self { buf })
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> u8,
    {
        let buf = image::GrayImage::from_fn(width, height, |x, y| image::Luma([f(x, y)]));
        Self { buf }
    }

    pub fn as_raw(&self) -> &[u8] {
        self.buf.as_raw()
    }

    /// Resample to `width` x `height` with bilinear filtering.
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if (width, height) == self.buf.dimensions() {
            return self.clone();
        }
        Self {
            buf: imageops::resize(&self.buf, width, height, FilterType::Triangle),
        }
    }
}

impl From<image::GrayImage> for GrayImage {
    fn from(buf: image::GrayImage) -> Self {
        Self { buf }
    }
}

impl ImageAccess for GrayImage {
    #[inline]
    fn get_pixel(&self, x: u32, y: u32) -> u8 {
        self.buf.get_pixel(x, y).0[0]
    }

    fn width(&self) -> u32 {
        self.buf.width()
    }

    fn height(&self) -> u32 {
        self.buf.height()
    }
}

/// Pyramid level a feature samples from.
///
/// Stored as its integer code; decoding any other code fails with
/// [`Error::UnsupportedScale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Scale {
    Origin = 0,
    Half = 1,
    Quarter = 2,
}

impl TryFrom<i64> for Scale {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Scale::Origin),
            1 => Ok(Scale::Half),
            2 => Ok(Scale::Quarter),
            other => Err(Error::UnsupportedScale(other)),
        }
    }
}

impl From<Scale> for i64 {
    fn from(scale: Scale) -> Self {
        scale as i64
    }
}

/// Origin, half and quarter resolution copies of one sample.
#[derive(Debug, Clone)]
pub struct ImagePyramid<I = GrayImage> {
    pub origin: I,
    pub half: I,
    pub quarter: I,
}

impl<I: ImageAccess> ImagePyramid<I> {
    pub fn new(origin: I, half: I, quarter: I) -> Self {
        Self {
            origin,
            half,
            quarter,
        }
    }

    pub fn level(&self, scale: Scale) -> &I {
        match scale {
            Scale::Origin => &self.origin,
            Scale::Half => &self.half,
            Scale::Quarter => &self.quarter,
        }
    }

    /// Factor mapping origin coordinates into `scale`'s level.
    ///
    /// Exactly 1.0 for [`Scale::Origin`], whatever the buffer sizes.
    pub fn ratio(&self, scale: Scale) -> f64 {
        match scale {
            Scale::Origin => 1.0,
            _ => f64::from(self.level(scale).height()) / f64::from(self.origin.height()),
        }
    }
}

impl ImagePyramid<GrayImage> {
    /// Build the pyramid by resampling `image` to the configured level sizes.
    pub fn from_image(image: &GrayImage, size: &ImageSize) -> Self {
        let origin = image.resize(size.origin_w, size.origin_h);
        let half = origin.resize(size.half_w, size.half_h);
        let quarter = origin.resize(size.quarter_w, size.quarter_h);
        Self::new(origin, half, quarter)
    }

    /// Decode an image file as grayscale and build its pyramid.
    pub fn open<P: AsRef<Path>>(path: P, size: &ImageSize) -> Result<Self> {
        let gray: GrayImage = image::open(path)?.to_luma8().into();
        Ok(Self::from_image(&gray, size))
    }
}
