use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A 2D point in origin-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Landmark estimate of one sample: `2 * L` coordinates laid out as
/// `[x0, y0, x1, y1, ...]` in origin-image pixels.
///
/// Serializes as the bare coordinate row; rows of odd length are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Shape {
    coords: Vec<f64>,
}

impl Shape {
    /// Wrap an interleaved coordinate row.
    pub fn from_flat_vec(coords: Vec<f64>) -> Result<Self> {
        if coords.len() % 2 != 0 {
            return Err(Error::InvalidShape(coords.len()));
        }
        Ok(Self { coords })
    }

    pub fn from_points<I: IntoIterator<Item = Point>>(points: I) -> Self {
        let coords = points.into_iter().flat_map(|p| [p.x, p.y]).collect();
        Self { coords }
    }

    /// All landmarks at the origin.
    pub fn zeros(landmark_n: usize) -> Self {
        Self {
            coords: vec![0.0; 2 * landmark_n],
        }
    }

    pub fn num_landmarks(&self) -> usize {
        self.coords.len() / 2
    }

    /// Position of landmark `j`. Panics if `j >= num_landmarks()`.
    #[inline]
    pub fn landmark(&self, j: usize) -> Point {
        Point::new(self.coords[2 * j], self.coords[2 * j + 1])
    }

    pub fn as_flat(&self) -> &[f64] {
        &self.coords
    }

    /// Apply a stage's regression output in place.
    ///
    /// `delta` must cover the same landmarks; this is how the cascade moves a
    /// sample's estimate between stages before features are re-evaluated.
    pub fn add_delta(&mut self, delta: &Shape) {
        debug_assert_eq!(self.coords.len(), delta.coords.len());
        for (c, d) in self.coords.iter_mut().zip(&delta.coords) {
            *c += d;
        }
    }
}

impl TryFrom<Vec<f64>> for Shape {
    type Error = Error;

    fn try_from(coords: Vec<f64>) -> Result<Self> {
        Self::from_flat_vec(coords)
    }
}

impl From<Shape> for Vec<f64> {
    fn from(shape: Shape) -> Self {
        shape.coords
    }
}
