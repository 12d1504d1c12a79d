//! Oriented bounding boxes and separating axis tests.

use crate::math::{rot90, Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// Boxes closer than this along every axis are considered to overlap, in px.
const SEPARATION_EPS: f64 = 1e-6;

/// Bisection iterations used to find the largest safe motion scale.
const SCALE_ITERATIONS: usize = 22;

/// Bisection stops once the scale is known to this precision.
const SCALE_TOLERANCE: f64 = 1e-4;

/// A rectangle with arbitrary orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    /// The centre of the box.
    pub centre: Point2d,
    /// A unit vector along the length of the box.
    pub axis: Vector2d,
    /// Half the length of the box.
    pub half_len: f64,
    /// Half the width of the box.
    pub half_wid: f64,
}

impl OrientedBox {
    /// The four corners of the box, front left first and going around.
    pub fn corners(&self) -> [Point2d; 4] {
        let l = self.axis * self.half_len;
        let w = rot90(self.axis) * self.half_wid;
        [
            self.centre + l + w,
            self.centre + l - w,
            self.centre - l - w,
            self.centre - l + w,
        ]
    }

    /// The length of the box's diagonal.
    pub fn diagonal(&self) -> f64 {
        2.0 * self.half_len.hypot(self.half_wid)
    }

    /// The box moved by `delta`.
    pub fn translated(&self, delta: Vector2d) -> Self {
        Self {
            centre: self.centre + delta,
            ..*self
        }
    }

    /// Projects the box onto an axis.
    pub fn project(&self, axis: Vector2d) -> Interval<f64> {
        let mid = self.centre.to_vec().dot(axis);
        let r = self.half_len * self.axis.dot(axis).abs()
            + self.half_wid * rot90(self.axis).dot(axis).abs();
        Interval::new(mid - r, mid + r)
    }

    /// Separating axis test. Touching boxes count as overlapping.
    pub fn overlaps(&self, other: &OrientedBox) -> bool {
        [self.axis, rot90(self.axis), other.axis, rot90(other.axis)]
            .into_iter()
            .all(|axis| {
                let a = self.project(axis);
                let b = other.project(axis);
                a.clearance_with(&b) <= SEPARATION_EPS
            })
    }
}

/// The net distance from the front of `follower` to the rear of `leader`,
/// measured along the follower's heading.
///
/// Negative if the leader's rearmost corner is level with or behind the follower's front.
pub fn longitudinal_gap(follower: &OrientedBox, leader: &OrientedBox) -> f64 {
    let front = follower.project(follower.axis).max;
    let rear = leader.project(follower.axis).min;
    let gap = rear - front;
    if gap.is_finite() {
        gap
    } else {
        follower.centre.distance(leader.centre) - 2.0 * leader.half_len
    }
}

/// Finds the largest fraction of this frame's motion the two bodies can make
/// without overlapping.
///
/// `a` and `b` give each body after moving the given fraction of its motion.
/// Returns 1 if the full motion is safe and 0 if the bodies already overlap.
pub fn max_safe_scale(a: impl Fn(f64) -> OrientedBox, b: impl Fn(f64) -> OrientedBox) -> f64 {
    let overlaps_at = |s: f64| a(s).overlaps(&b(s));

    if !overlaps_at(1.0) {
        return 1.0;
    }
    if overlaps_at(0.0) {
        return 0.0;
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..SCALE_ITERATIONS {
        if hi - lo < SCALE_TOLERANCE {
            break;
        }
        let mid = 0.5 * (lo + hi);
        if overlaps_at(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    lo
}

/// Whether two boxes are close enough to warrant a separating axis test.
pub fn within_reach(a: &OrientedBox, b: &OrientedBox, margin: f64) -> bool {
    let reach = a.diagonal() + b.diagonal() + margin;
    a.centre.distance2(b.centre) <= reach * reach
}
