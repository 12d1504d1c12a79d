//! Lane entry and exit coordinates.

use crate::arm::{Arm, LaneKey};
use crate::config::{CanvasSize, IntersectionLayout};
use crate::math::{Point2d, Vector2d};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vehicles appear this far outside the canvas, in px.
const SPAWN_OFFSET: f64 = 20.0;

/// Where each lane crosses the stop line (entry) or leaves the intersection box (exit).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneCoordinates {
    pub entry: BTreeMap<LaneKey, Point2d>,
    pub exit: BTreeMap<LaneKey, Point2d>,
}

impl LaneCoordinates {
    /// Computes the coordinates for a standard layout: lanes 3 m wide, traffic
    /// keeping left, with stop lines set back from the intersection box by the
    /// kerb radius.
    pub fn from_layout(layout: &IntersectionLayout) -> Self {
        let s = layout.lane_width();
        let r = layout.turning_radius();
        let cx = 0.5 * layout.canvas.width;
        let cy = 0.5 * layout.canvas.height;
        let lanes = &layout.lanes;
        let extent = |a: u8, b: u8| f64::from(u8::max(a, b)) * s + r;

        let north_y = cy - extent(lanes.east.outbound, lanes.west.inbound);
        let south_y = cy + extent(lanes.east.inbound, lanes.west.outbound);
        let east_x = cx + extent(lanes.north.inbound, lanes.south.outbound);
        let west_x = cx - extent(lanes.north.outbound, lanes.south.inbound);

        let mut coords = Self::default();
        for (arm, arm_lanes) in lanes.iter() {
            for lane in 1..=arm_lanes.inbound {
                let off = (f64::from(lane) - 0.5) * s;
                let p = match arm {
                    Arm::North => Point2d::new(cx + off, north_y),
                    Arm::East => Point2d::new(east_x, cy + off),
                    Arm::South => Point2d::new(cx - off, south_y),
                    Arm::West => Point2d::new(west_x, cy - off),
                };
                coords.entry.insert(LaneKey::new(arm, lane), p);
            }
            for lane in 1..=arm_lanes.outbound {
                let off = (f64::from(lane) - 0.5) * s;
                let p = match arm {
                    Arm::North => Point2d::new(cx - off, north_y),
                    Arm::East => Point2d::new(east_x, cy - off),
                    Arm::South => Point2d::new(cx + off, south_y),
                    Arm::West => Point2d::new(west_x, cy + off),
                };
                coords.exit.insert(LaneKey::new(arm, lane), p);
            }
        }
        coords
    }

    /// The entry point of a lane.
    pub fn entry(&self, key: LaneKey) -> Option<Point2d> {
        self.entry.get(&key).copied()
    }

    /// The exit point of a lane.
    pub fn exit(&self, key: LaneKey) -> Option<Point2d> {
        self.exit.get(&key).copied()
    }

    /// Picks the exit point on `arm` for a vehicle in lane `own_lane`.
    ///
    /// Tries the exit with the same lane number, then the preferred exit lane,
    /// then the exit whose lane number is closest to the preferred (or own) lane.
    pub fn resolve_exit(
        &self,
        arm: Arm,
        own_lane: u8,
        preferred: Option<u8>,
    ) -> Option<(LaneKey, Point2d)> {
        let exact = |lane: u8| {
            let key = LaneKey::new(arm, lane);
            self.exit(key).map(|p| (key, p))
        };
        let target = preferred.unwrap_or(own_lane);
        exact(own_lane)
            .or_else(|| preferred.and_then(exact))
            .or_else(|| {
                self.exits_on(arm)
                    .min_by_key(|(key, _)| (i16::from(key.lane) - i16::from(target)).abs())
            })
    }

    /// Any exit point not on `arm`, preferring the arm opposite.
    pub fn exit_avoiding(&self, arm: Arm) -> Option<(LaneKey, Point2d)> {
        self.exits_on(arm.opposite()).next().or_else(|| {
            self.exit
                .iter()
                .find(|(key, _)| key.arm != arm)
                .map(|(k, p)| (*k, *p))
        })
    }

    /// The exit points on one arm, in lane order.
    pub fn exits_on(&self, arm: Arm) -> impl Iterator<Item = (LaneKey, Point2d)> + '_ {
        self.exit
            .range(LaneKey::new(arm, 0)..=LaneKey::new(arm, u8::MAX))
            .map(|(k, p)| (*k, *p))
    }
}

/// The position and heading at which vehicles appear in an inbound lane (0-based),
/// just outside the canvas.
pub fn spawn_pose(canvas: CanvasSize, lane_width: f64, arm: Arm, lane: usize) -> (Point2d, Vector2d) {
    let off = (lane as f64 + 0.5) * lane_width;
    let (w, h) = (canvas.width, canvas.height);
    let pos = match arm {
        Arm::North => Point2d::new(0.5 * w + off, -SPAWN_OFFSET),
        Arm::East => Point2d::new(w + SPAWN_OFFSET, 0.5 * h + off),
        Arm::South => Point2d::new(0.5 * w - off, h + SPAWN_OFFSET),
        Arm::West => Point2d::new(-SPAWN_OFFSET, 0.5 * h - off),
    };
    (pos, arm.inbound_dir())
}
