//! Geometry helpers for node placement and link distances.
//!
//! Contains helper functions for:
//! - Euclidean and squared distances between points
//! - Uniform random placement inside the configured bounding box

use rand::Rng;

use super::types::Point;

/// Squared Euclidean distance (avoids a sqrt when only comparing).
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Euclidean distance in meters.
pub fn distance(a: &Point, b: &Point) -> f64 {
    distance2(a, b).sqrt()
}

/// Draw a point uniformly from `[0, width] x [0, height]`.
///
/// # Parameters
///
/// * `rng` - Random source; tests pass a seeded `StdRng`
/// * `width` - Extent of the area along x, meters
/// * `height` - Extent of the area along y, meters
pub fn random_point<R: Rng + ?Sized>(rng: &mut R, width: f64, height: f64) -> Point {
    Point {
        x: rng.gen_range(0.0..=width),
        y: rng.gen_range(0.0..=height),
    }
}
