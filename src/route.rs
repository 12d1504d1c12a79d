//! Building the path a vehicle follows through the intersection.

use crate::arm::{Arm, LaneKey, Maneuver};
use crate::config::CanvasSize;
use crate::error::RouteError;
use crate::geometry::LaneCoordinates;
use crate::math::{normalize_or, CubicBezier2d, ParametricCurve2d, Point2d, QuadraticBezier2d, Vector2d};
use crate::path::{Path, Segment};
use cgmath::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Points closer than this are treated as coincident, in px.
const COINCIDENT: f64 = 1e-3;

/// The extra length of the lead-out line beyond one and a half canvas diagonals, in px.
const LEAD_OUT_EXTRA: f64 = 200.0;

/// Where a vehicle comes from and what it intends to do at the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// The arm the vehicle arrives on.
    pub origin: Arm,
    /// The inbound lane, numbered from 1.
    pub lane: u8,
    pub maneuver: Maneuver,
    /// The exit lane the vehicle would like to leave by.
    pub preferred_exit: Option<u8>,
}

impl Route {
    /// The arm the vehicle leaves by.
    pub fn destination(&self) -> Arm {
        self.origin.exit_for(self.maneuver)
    }

    /// The key of the inbound lane.
    pub fn entry_key(&self) -> LaneKey {
        LaneKey::new(self.origin, self.lane)
    }
}

/// A path along with the lane points it was built from.
#[derive(Clone, Debug)]
pub struct PlannedPath {
    pub path: Path,
    /// The stop line point of the vehicle's lane, if known.
    pub entry: Option<Point2d>,
    /// The exit lane the path leads to, if one was found.
    pub exit: Option<LaneKey>,
}

/// The control points of the S-curve joining an entry to an exit on the opposite arm.
///
/// The curve leaves and arrives parallel to the axis along which the points are furthest apart.
pub fn straight_controls(entry: Point2d, exit: Point2d) -> [Point2d; 2] {
    let mid = entry.midpoint(exit);
    let delta = exit - entry;
    if delta.x.abs() >= delta.y.abs() {
        [Point2d::new(mid.x, entry.y), Point2d::new(mid.x, exit.y)]
    } else {
        [Point2d::new(entry.x, mid.y), Point2d::new(exit.x, mid.y)]
    }
}

/// The corner control point of a quarter turn from an entry on `origin` to an exit.
pub fn turn_control(origin: Arm, entry: Point2d, exit: Point2d) -> Point2d {
    if origin.is_vertical() {
        Point2d::new(entry.x, exit.y)
    } else {
        Point2d::new(exit.x, entry.y)
    }
}

/// The curve through the intersection box from `entry` on `origin` to `exit` on `destination`.
pub fn maneuver_segment(origin: Arm, destination: Arm, entry: Point2d, exit: Point2d) -> Segment {
    if entry.distance(exit) < COINCIDENT {
        return Segment::line(entry, exit);
    }
    if origin.is_vertical() == destination.is_vertical() {
        let [c1, c2] = straight_controls(entry, exit);
        Segment::Cubic(CubicBezier2d::new(&[entry, c1, c2, exit]))
    } else {
        let control = turn_control(origin, entry, exit);
        Segment::Quadratic(QuadraticBezier2d::new(&[entry, control, exit]))
    }
}

/// The length of the straight line which carries vehicles off the canvas.
pub fn lead_out_length(canvas: CanvasSize) -> f64 {
    1.5 * canvas.diagonal() + LEAD_OUT_EXTRA
}

/// Builds the path for a route: an optional lead-in from `rear` to the stop line,
/// the maneuver curve and a lead-out running off the canvas.
///
/// Passing `None` for `rear` omits the lead-in, which is used for vehicles
/// already past their stop line.
pub fn plan(
    route: &Route,
    coords: &LaneCoordinates,
    rear: Option<Point2d>,
    canvas: CanvasSize,
) -> Result<PlannedPath, RouteError> {
    let entry_key = route.entry_key();
    let entry = coords
        .entry(entry_key)
        .ok_or(RouteError::MissingEntry(entry_key))?;

    let destination = route.destination();
    let (exit_key, exit) = coords
        .resolve_exit(destination, route.lane, route.preferred_exit)
        .or_else(|| coords.exit_avoiding(route.origin))
        .ok_or(RouteError::MissingExit(destination))?;

    let curve = maneuver_segment(route.origin, exit_key.arm, entry, exit);
    let out_dir = normalize_or(curve.sample_dt(1.0), exit_key.arm.outbound_dir());
    let lead_out = exit + out_dir * lead_out_length(canvas);

    let mut segments = SmallVec::<[Segment; 3]>::new();
    if let Some(rear) = rear.filter(|p| p.distance(entry) >= COINCIDENT) {
        segments.push(Segment::line(rear, entry));
    }
    segments.push(curve);
    segments.push(Segment::line(exit, lead_out));

    Ok(PlannedPath {
        path: Path::new(segments),
        entry: Some(entry),
        exit: Some(exit_key),
    })
}

/// A straight path from `rear` along `heading` and off the canvas,
/// for vehicles whose lane geometry is unknown.
pub fn degraded(rear: Point2d, heading: Vector2d, canvas: CanvasSize) -> PlannedPath {
    let end = rear + heading * lead_out_length(canvas);
    PlannedPath {
        path: Path::new([Segment::line(rear, end)]),
        entry: None,
        exit: None,
    }
}

/// Plans a route, falling back to a [degraded] path with a warning when
/// the lane coordinates cannot support it.
pub fn plan_or_degrade(
    route: &Route,
    coords: &LaneCoordinates,
    rear: Point2d,
    heading: Vector2d,
    include_lead_in: bool,
    canvas: CanvasSize,
) -> PlannedPath {
    let lead_in = Some(rear).filter(|_| include_lead_in);
    match plan(route, coords, lead_in, canvas) {
        Ok(planned) => planned,
        Err(err) => {
            log::warn!("{}; vehicle continues straight ahead", err);
            let mut planned = degraded(rear, heading, canvas);
            // A known stop line still applies when only the exit is missing
            planned.entry = coords.entry(route.entry_key());
            planned
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::IntersectionLayout;
    use assert_approx_eq::assert_approx_eq;

    fn route(origin: Arm, lane: u8, maneuver: Maneuver) -> Route {
        Route {
            origin,
            lane,
            maneuver,
            preferred_exit: None,
        }
    }

    #[test]
    fn control_points() {
        let entry = Point2d::new(415.0, 290.0);
        let exit = Point2d::new(445.0, 510.0);
        let [c1, c2] = straight_controls(entry, exit);
        assert_eq!(c1, Point2d::new(415.0, 400.0));
        assert_eq!(c2, Point2d::new(445.0, 400.0));

        let [c1, c2] = straight_controls(Point2d::new(510.0, 415.0), Point2d::new(290.0, 385.0));
        assert_eq!(c1, Point2d::new(400.0, 415.0));
        assert_eq!(c2, Point2d::new(400.0, 385.0));

        // North to east: down from the entry, then across to the exit
        let c = turn_control(Arm::North, entry, Point2d::new(510.0, 385.0));
        assert_eq!(c, Point2d::new(415.0, 385.0));
        let c = turn_control(Arm::East, Point2d::new(510.0, 415.0), Point2d::new(415.0, 510.0));
        assert_eq!(c, Point2d::new(415.0, 415.0));
    }

    #[test]
    fn straight_route_through_the_box() {
        let layout = IntersectionLayout::default();
        let coords = LaneCoordinates::from_layout(&layout);
        let rear = Point2d::new(415.0, -33.25);
        let planned = plan(&route(Arm::North, 1, Maneuver::Straight), &coords, Some(rear), layout.canvas).unwrap();

        assert_eq!(planned.exit, Some(LaneKey::new(Arm::South, 1)));
        assert_eq!(planned.path.segments().count(), 3);
        let start = planned.path.sample(0.0);
        assert_approx_eq!(start.pos.y, rear.y);
        assert_approx_eq!(start.tan.y, 1.0);

        // The lead-out leaves the canvas heading south
        let end = planned.path.sample(planned.path.length());
        assert_approx_eq!(end.pos.x, 415.0);
        assert!(end.pos.y > layout.canvas.height + 100.0);
        assert_approx_eq!(end.tan.y, 1.0);
    }

    #[test]
    fn turns_use_a_corner_control_point() {
        let layout = IntersectionLayout::default();
        let coords = LaneCoordinates::from_layout(&layout);
        let planned = plan(&route(Arm::North, 1, Maneuver::Left), &coords, None, layout.canvas).unwrap();

        assert_eq!(planned.exit, Some(LaneKey::new(Arm::East, 1)));
        let segments = planned.path.segments().collect::<Vec<_>>();
        assert_eq!(segments.len(), 2);
        assert!(matches!(segments[0], Segment::Quadratic(_)));
        let pts = segments[0].control_points();
        assert_eq!(pts[1], Point2d::new(415.0, 385.0));

        let end = planned.path.sample(planned.path.length());
        assert_approx_eq!(end.tan.x, 1.0);
        assert_approx_eq!(end.pos.y, 385.0);
    }

    #[test]
    fn replanning_is_idempotent() {
        let layout = IntersectionLayout::default();
        let coords = LaneCoordinates::from_layout(&layout);
        let r = route(Arm::West, 2, Maneuver::Right);
        let rear = Point2d::new(100.0, 355.0);
        let a = plan(&r, &coords, Some(rear), layout.canvas).unwrap();
        let b = plan(&r, &coords, Some(rear), layout.canvas).unwrap();
        let la = a.path.segment_lengths().collect::<Vec<_>>();
        let lb = b.path.segment_lengths().collect::<Vec<_>>();
        assert_eq!(la.len(), lb.len());
        for (x, y) in la.iter().zip(&lb) {
            assert_approx_eq!(x, y, 1e-9);
        }
    }

    #[test]
    fn missing_geometry() {
        let layout = IntersectionLayout::default();
        let mut coords = LaneCoordinates::from_layout(&layout);

        let r = route(Arm::North, 4, Maneuver::Straight);
        assert_eq!(
            plan(&r, &coords, None, layout.canvas).unwrap_err(),
            RouteError::MissingEntry(LaneKey::new(Arm::North, 4))
        );

        let rear = Point2d::new(445.0, 100.0);
        let planned = plan_or_degrade(&r, &coords, rear, Arm::North.inbound_dir(), true, layout.canvas);
        assert!(planned.entry.is_none());
        assert_eq!(planned.path.segments().count(), 1);
        assert!(planned.path.point_at(planned.path.length()).y > layout.canvas.height);

        // With the south exits gone, straight traffic leaves by another arm
        coords.exit.retain(|k, _| k.arm != Arm::South);
        let planned = plan(&route(Arm::North, 1, Maneuver::Straight), &coords, None, layout.canvas).unwrap();
        assert_ne!(planned.exit.unwrap().arm, Arm::North);

        coords.exit.clear();
        assert_eq!(
            plan(&route(Arm::North, 1, Maneuver::Straight), &coords, None, layout.canvas).unwrap_err(),
            RouteError::MissingExit(Arm::South)
        );
    }
}
