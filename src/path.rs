//! Composite paths made of line and bezier segments, queried by distance travelled.

use crate::math::{
    normalize_or, ArcLengthTable, CubicBezier2d, LineSegment2d, ParametricCurve2d, Point2d,
    QuadraticBezier2d, Vector2d,
};
use crate::util::Interval;
use cgmath::prelude::*;
use smallvec::SmallVec;

/// Number of coarse samples shared out between the segments of a path
/// when searching for the closest point.
const COARSE_SAMPLES: f64 = 40.0;

/// The minimum number of coarse samples on any curved segment.
const MIN_COARSE_SAMPLES: usize = 6;

/// The refinement window around the coarse optimum, as a fraction of the path length.
const REFINE_WINDOW_FRACTION: f64 = 0.002;

/// The smallest refinement window, in px.
const MIN_REFINE_WINDOW: f64 = 0.1;

/// The number of steps used to scan the refinement window.
const REFINE_STEPS: usize = 30;

/// The number of ternary search iterations used to polish the refined result.
const POLISH_ITERATIONS: usize = 24;

/// Subdivisions used to build the arc length table of a quadratic segment.
const QUADRATIC_TABLE_STEPS: usize = 96;

/// Subdivisions used to build the arc length table of a cubic segment.
const CUBIC_TABLE_STEPS: usize = 128;

/// One piece of a [Path].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Segment {
    Line(LineSegment2d),
    Quadratic(QuadraticBezier2d),
    Cubic(CubicBezier2d),
}

impl Segment {
    /// Creates a straight segment.
    pub fn line(start: Point2d, end: Point2d) -> Self {
        Self::Line(LineSegment2d::from_ends(start, end))
    }

    /// The control polygon of the segment, including both end points.
    pub fn control_points(&self) -> SmallVec<[Point2d; 4]> {
        match self {
            Segment::Line(l) => SmallVec::from_slice(&[l.start, l.end]),
            Segment::Quadratic(q) => SmallVec::from_slice(q.points()),
            Segment::Cubic(c) => SmallVec::from_slice(c.points()),
        }
    }

    fn arc_length_table(&self) -> ArcLengthTable {
        match self {
            Segment::Line(l) => ArcLengthTable::from_curve(l, 1),
            Segment::Quadratic(q) => ArcLengthTable::from_curve(q, QUADRATIC_TABLE_STEPS),
            Segment::Cubic(c) => ArcLengthTable::from_curve(c, CUBIC_TABLE_STEPS),
        }
    }
}

impl ParametricCurve2d for Segment {
    fn sample(&self, t: f64) -> Point2d {
        match self {
            Segment::Line(l) => l.sample(t),
            Segment::Quadratic(q) => q.sample(t),
            Segment::Cubic(c) => c.sample(t),
        }
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, 1.0)
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        match self {
            Segment::Line(l) => l.sample_dt(t),
            Segment::Quadratic(q) => q.sample_dt(t),
            Segment::Cubic(c) => c.sample_dt(t),
        }
    }
}

/// A segment along with its precomputed length and position along the path.
#[derive(Clone, Debug)]
struct PathSegment {
    curve: Segment,
    table: ArcLengthTable,
    /// The distance along the path at which this segment starts.
    start: f64,
    /// The arc length of the segment.
    length: f64,
}

impl PathSegment {
    fn sample_local(&self, dist: f64) -> PathSample {
        let t = self.table.t_at(&self.curve, dist);
        let chord = normalize_or(self.curve.end() - self.curve.start(), Vector2d::unit_x());
        PathSample {
            pos: self.curve.sample(t),
            tan: normalize_or(self.curve.sample_dt(t), chord),
        }
    }
}

/// A point on a path and the unit tangent at that point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathSample {
    pub pos: Point2d,
    pub tan: Vector2d,
}

/// The result of projecting a point onto a path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathProjection {
    /// Distance along the path of the closest point.
    pub dist: f64,
    /// The closest point itself.
    pub pos: Point2d,
    /// The distance between the query point and `pos`.
    pub offset: f64,
}

/// An ordered chain of curve segments with a cumulative length table.
#[derive(Clone, Debug, Default)]
pub struct Path {
    segments: SmallVec<[PathSegment; 3]>,
    length: f64,
}

impl Path {
    /// Builds a path from its segments, in order of travel.
    ///
    /// Zero-length segments are kept but never selected by distance queries.
    pub fn new(curves: impl IntoIterator<Item = Segment>) -> Self {
        let mut length = 0.0;
        let segments = curves
            .into_iter()
            .map(|curve| {
                let table = curve.arc_length_table();
                let seg_len = table.length();
                let seg = PathSegment {
                    curve,
                    table,
                    start: length,
                    length: seg_len,
                };
                length += seg_len;
                seg
            })
            .collect();
        Self { segments, length }
    }

    /// The total length of the path.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The segments of the path, in order of travel.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().map(|s| &s.curve)
    }

    /// The length of each segment, in order of travel.
    pub fn segment_lengths(&self) -> impl Iterator<Item = f64> + '_ {
        self.segments.iter().map(|s| s.length)
    }

    /// Samples the position and unit tangent at a distance along the path.
    /// The distance is clamped to the extent of the path.
    pub fn sample(&self, dist: f64) -> PathSample {
        let dist = if dist.is_finite() {
            dist.clamp(0.0, self.length)
        } else {
            0.0
        };
        let mut live = self.segments.iter().filter(|s| s.length > 0.0);
        let owner = live
            .clone()
            .find(|s| dist <= s.start + s.length)
            .or_else(|| live.next_back());
        match (owner, self.segments.first()) {
            (Some(seg), _) => seg.sample_local(dist - seg.start),
            (None, Some(first)) => first.sample_local(0.0),
            (None, None) => PathSample {
                pos: Point2d::origin(),
                tan: Vector2d::unit_x(),
            },
        }
    }

    /// The point at a distance along the path.
    pub fn point_at(&self, dist: f64) -> Point2d {
        self.sample(dist).pos
    }

    /// Finds the point on the path closest to `point`.
    pub fn closest_point(&self, point: Point2d) -> PathProjection {
        let dist2_at = |d: f64| self.point_at(d).distance2(point);

        if self.length <= 0.0 {
            let pos = self.point_at(0.0);
            return PathProjection {
                dist: 0.0,
                pos,
                offset: pos.distance(point),
            };
        }

        // Coarse search; lines are projected exactly
        let mut best_dist = 0.0;
        let mut best_err = f64::INFINITY;
        let mut spacing = 0.0;
        for seg in self.segments.iter().filter(|s| s.length > 0.0) {
            match seg.curve {
                Segment::Line(line) => {
                    let v = line.end - line.start;
                    let t = ((point - line.start).dot(v) / v.magnitude2()).clamp(0.0, 1.0);
                    let d = seg.start + t * seg.length;
                    let err = dist2_at(d);
                    if err < best_err {
                        (best_dist, best_err, spacing) = (d, err, 0.0);
                    }
                }
                _ => {
                    let share = COARSE_SAMPLES * seg.length / self.length;
                    let n = usize::max(MIN_COARSE_SAMPLES, share.round() as usize);
                    let step = seg.length / n as f64;
                    for i in 0..=n {
                        let d = seg.start + step * i as f64;
                        let err = dist2_at(d);
                        if err < best_err {
                            (best_dist, best_err, spacing) = (d, err, step);
                        }
                    }
                }
            }
        }

        // Scan a small window around the coarse optimum
        let window = f64::max(
            f64::max(REFINE_WINDOW_FRACTION * self.length, MIN_REFINE_WINDOW),
            spacing,
        );
        let range = Interval::new(
            f64::max(best_dist - window, 0.0),
            f64::min(best_dist + window, self.length),
        );
        for i in 0..=REFINE_STEPS {
            let d = range.lerp(i as f64 / REFINE_STEPS as f64);
            let err = dist2_at(d);
            if err < best_err {
                (best_dist, best_err) = (d, err);
            }
        }

        // Polish within one scan step of the best candidate
        let step = range.length() / REFINE_STEPS as f64;
        let (mut lo, mut hi) = (
            f64::max(best_dist - step, 0.0),
            f64::min(best_dist + step, self.length),
        );
        for _ in 0..POLISH_ITERATIONS {
            let m1 = lo + (hi - lo) / 3.0;
            let m2 = hi - (hi - lo) / 3.0;
            if dist2_at(m1) <= dist2_at(m2) {
                hi = m2;
            } else {
                lo = m1;
            }
        }
        let d = 0.5 * (lo + hi);
        if dist2_at(d) < best_err {
            best_dist = d;
        }

        let pos = self.point_at(best_dist);
        PathProjection {
            dist: best_dist,
            pos,
            offset: pos.distance(point),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn corner_path() -> Path {
        Path::new([
            Segment::line(Point2d::new(0.0, -100.0), Point2d::new(0.0, 0.0)),
            Segment::Quadratic(QuadraticBezier2d::new(&[
                Point2d::new(0.0, 0.0),
                Point2d::new(0.0, 50.0),
                Point2d::new(50.0, 50.0),
            ])),
            Segment::line(Point2d::new(50.0, 50.0), Point2d::new(250.0, 50.0)),
        ])
    }

    #[test]
    fn cumulative_lengths() {
        let path = corner_path();
        let lens = path.segment_lengths().collect::<Vec<_>>();
        assert_eq!(lens.len(), 3);
        assert_approx_eq!(lens[0], 100.0);
        assert_approx_eq!(lens[2], 200.0);
        // A quarter-turn quadratic is longer than its chord but shorter than its control polygon
        assert!(lens[1] > 50.0 * 2f64.sqrt() && lens[1] < 100.0);
        assert_approx_eq!(path.length(), lens.iter().sum::<f64>());
    }

    #[test]
    fn sampling_is_clamped_and_unit_tangent() {
        let path = corner_path();
        let start = path.sample(-20.0);
        assert_approx_eq!(start.pos.y, -100.0);
        let end = path.sample(1e9);
        assert_approx_eq!(end.pos.x, 250.0);
        assert_approx_eq!(end.tan.x, 1.0);
        for i in 0..=50 {
            let s = path.sample(path.length() * i as f64 / 50.0);
            assert_approx_eq!(s.tan.magnitude(), 1.0);
        }
    }

    #[test]
    fn sampling_is_arc_length_parameterised() {
        let path = corner_path();
        let n = 400;
        let step = path.length() / n as f64;
        for i in 0..n {
            let a = path.point_at(step * i as f64);
            let b = path.point_at(step * (i + 1) as f64);
            assert_approx_eq!(a.distance(b), step, 0.02);
        }
    }

    #[test]
    fn closest_point_on_lines_and_curves() {
        let path = corner_path();

        let proj = path.closest_point(Point2d::new(7.0, -40.0));
        assert_approx_eq!(proj.dist, 60.0, 1e-6);
        assert_approx_eq!(proj.offset, 7.0, 1e-6);

        let proj = path.closest_point(Point2d::new(150.0, 58.0));
        assert_approx_eq!(proj.pos.x, 150.0, 1e-6);
        assert_approx_eq!(proj.offset, 8.0, 1e-6);

        // Points on the curve project onto themselves
        for i in 1..10 {
            let d = 100.0 + path.segment_lengths().nth(1).unwrap() * i as f64 / 10.0;
            let proj = path.closest_point(path.point_at(d));
            assert_approx_eq!(proj.dist, d, 0.05);
            assert!(proj.offset < 0.01);
        }
    }

    #[test]
    fn degenerate_segments_never_produce_nan() {
        let p = Point2d::new(10.0, 10.0);
        let path = Path::new([
            Segment::line(Point2d::new(0.0, 10.0), p),
            Segment::line(p, p),
            Segment::Quadratic(QuadraticBezier2d::new(&[p, p, p])),
            Segment::line(p, Point2d::new(20.0, 10.0)),
        ]);
        assert_approx_eq!(path.length(), 20.0);
        for i in 0..=40 {
            let s = path.sample(i as f64 * 0.5);
            assert!(s.pos.x.is_finite() && s.tan.x.is_finite());
            assert_approx_eq!(s.pos.y, 10.0);
        }
        let proj = path.closest_point(Point2d::new(10.0, 0.0));
        assert_approx_eq!(proj.dist, 10.0, 1e-6);

        let empty = Path::new([]);
        assert_eq!(empty.length(), 0.0);
        assert!(empty.sample(5.0).pos.x.is_finite());
        let single = Path::new([Segment::line(p, p)]);
        assert!(single.closest_point(Point2d::new(0.0, 0.0)).offset.is_finite());
    }
}
