use super::curve::ParametricCurve2d;
use crate::util::Interval;
use cgmath::prelude::*;

/// Gauss-Legendre nodes on [-1, 1] with their weights.
const GAUSS_NODES: [(f64, f64); 5] = [
    (0.0, 0.568_888_888_888_888_9),
    (-0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
    (0.538_469_310_105_683_1, 0.478_628_670_499_366_5),
    (-0.906_179_845_938_664, 0.236_926_885_056_189_1),
    (0.906_179_845_938_664, 0.236_926_885_056_189_1),
];

/// Newton steps used to polish a parameter found from the table.
const NEWTON_ITERATIONS: usize = 4;

/// Below this speed along the curve a Newton step is not taken.
const MIN_PARAM_SPEED: f64 = 1e-12;

/// The arc length of `curve` between the parameters `a` and `b`.
fn arc_length(curve: &impl ParametricCurve2d, a: f64, b: f64) -> f64 {
    let (mid, half) = (0.5 * (a + b), 0.5 * (b - a));
    let sum = GAUSS_NODES
        .iter()
        .map(|(x, w)| w * curve.sample_dt(mid + half * x).magnitude())
        .sum::<f64>();
    let len = sum * half;
    if len.is_finite() {
        len
    } else {
        0.0
    }
}

/// A lookup table relating a curve's parameter to the arc length travelled
/// from the start of the curve.
///
/// The curve is split into uniformly spaced parameter intervals, each
/// integrated exactly enough that lookups agree with the true arc length.
#[derive(Clone, Debug, PartialEq)]
pub struct ArcLengthTable {
    /// The parameter range of the curve.
    bounds: Interval<f64>,
    /// Cumulative arc length at each uniformly spaced sample.
    lengths: Vec<f64>,
}

impl ArcLengthTable {
    /// Builds the table from `steps` uniform subdivisions of the curve.
    pub fn from_curve(curve: &impl ParametricCurve2d, steps: usize) -> Self {
        let bounds = curve.bounds();
        let steps = steps.max(1);
        let mut lengths = Vec::with_capacity(steps + 1);
        let mut total = 0.0;
        lengths.push(0.0);
        for i in 1..=steps {
            let a = bounds.lerp((i - 1) as f64 / steps as f64);
            let b = bounds.lerp(i as f64 / steps as f64);
            total += arc_length(curve, a, b);
            lengths.push(total);
        }
        Self { bounds, lengths }
    }

    /// The total length of the curve.
    pub fn length(&self) -> f64 {
        self.lengths.last().copied().unwrap_or(0.0)
    }

    fn steps(&self) -> usize {
        self.lengths.len() - 1
    }

    /// The curve parameter of the `i`th sample.
    fn param(&self, i: usize) -> f64 {
        self.bounds.lerp(i as f64 / self.steps() as f64)
    }

    /// The curve parameter at which `dist` units of arc length have been travelled.
    /// The distance is clamped to the length of the curve.
    ///
    /// `curve` must be the curve the table was built from.
    pub fn t_at(&self, curve: &impl ParametricCurve2d, dist: f64) -> f64 {
        let total = self.length();
        if total <= 0.0 || !dist.is_finite() {
            return self.bounds.min;
        }
        let dist = dist.clamp(0.0, total);
        let idx = self.lengths.partition_point(|l| *l < dist).clamp(1, self.steps());
        let (l0, l1) = (self.lengths[idx - 1], self.lengths[idx]);
        let (t0, t1) = (self.param(idx - 1), self.param(idx));
        let frac = if l1 > l0 { (dist - l0) / (l1 - l0) } else { 0.0 };

        let mut t = t0 + frac * (t1 - t0);
        for _ in 0..NEWTON_ITERATIONS {
            let speed = curve.sample_dt(t).magnitude();
            if !speed.is_finite() || speed <= MIN_PARAM_SPEED {
                break;
            }
            let err = self.distance_at(curve, t) - dist;
            t = (t - err / speed).clamp(t0, t1);
        }
        t
    }

    /// The arc length travelled at the curve parameter `t`.
    ///
    /// `curve` must be the curve the table was built from.
    pub fn distance_at(&self, curve: &impl ParametricCurve2d, t: f64) -> f64 {
        let len = self.bounds.length();
        if len <= 0.0 || !t.is_finite() {
            return 0.0;
        }
        let t = self.bounds.clamp(t);
        let x = (t - self.bounds.min) / len * self.steps() as f64;
        let idx = usize::min(x.floor() as usize, self.steps() - 1);
        self.lengths[idx] + arc_length(curve, self.param(idx), t)
    }
}
