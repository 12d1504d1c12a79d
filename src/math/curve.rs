use super::{Point2d, Vector2d};
use crate::util::Interval;

/// A parametric curve in 2D space.
pub trait ParametricCurve2d {
    /// Samples the parametric curve.
    fn sample(&self, t: f64) -> Point2d;

    /// Returns the minimum and maximum t-values that define the bounds of the curve.
    fn bounds(&self) -> Interval<f64>;

    /// Samples the derivative of the parametric curve.
    ///
    /// The default implementation approximates the derivative by sampling
    /// two very nearby points along the curve.
    fn sample_dt(&self, t: f64) -> Vector2d {
        let delta = self.bounds().length() * 0.0001;
        let p1 = self.sample(t);
        let p2 = self.sample(t + delta);
        (p2 - p1) / delta
    }

    /// The point at the start of the curve.
    fn start(&self) -> Point2d {
        self.sample(self.bounds().min)
    }

    /// The point at the end of the curve.
    fn end(&self) -> Point2d {
        self.sample(self.bounds().max)
    }
}

/// A straight line segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineSegment2d {
    pub start: Point2d,
    pub end: Point2d,
}

impl LineSegment2d {
    /// Creates a line segment between two points.
    pub const fn from_ends(start: Point2d, end: Point2d) -> Self {
        Self { start, end }
    }
}

impl ParametricCurve2d for LineSegment2d {
    fn sample(&self, t: f64) -> Point2d {
        self.start + t * (self.end - self.start)
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, 1.0)
    }

    fn sample_dt(&self, _t: f64) -> Vector2d {
        self.end - self.start
    }
}
