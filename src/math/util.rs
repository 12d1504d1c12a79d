use super::Vector2d;
use cgmath::prelude::*;

/// Vectors shorter than this are treated as having no direction.
const MIN_DIRECTION_MAGNITUDE: f64 = 1e-9;

/// Rotates a vector 90 degrees clockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// Normalises a vector, returning `fallback` if the vector is too short
/// (or not finite) to have a meaningful direction.
pub fn normalize_or(vec: Vector2d, fallback: Vector2d) -> Vector2d {
    let mag = vec.magnitude();
    if mag.is_finite() && mag > MIN_DIRECTION_MAGNITUDE {
        vec / mag
    } else {
        fallback
    }
}
