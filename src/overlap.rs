//! Last-resort prevention of overlapping vehicle bodies.
//!
//! Car following only looks at vehicles from the same lane, so vehicles whose
//! paths cross inside the intersection are kept apart here by scaling back
//! each vehicle's motion for the frame.

use crate::collision::{max_safe_scale, within_reach, OrientedBox};
use crate::debug::debug_box;
use crate::vehicle::{OverlapDecision, Vehicle};
use crate::{VehicleId, VehicleSet};
use cgmath::prelude::*;
use itertools::Itertools;

/// Extra distance beyond the two bodies' diagonals within which pairs are tested, in px.
const REACH_MARGIN: f64 = 80.0; // px (8 m)

/// Bodies are padded by this much on every side, in px.
const CONTACT_MARGIN: f64 = 1.0;

fn padded(mut body: OrientedBox) -> OrientedBox {
    body.half_len += CONTACT_MARGIN;
    body.half_wid += CONTACT_MARGIN;
    body
}

/// A vehicle's padded body and its movement budget for the frame.
struct Snapshot<'a> {
    id: VehicleId,
    vehicle: &'a Vehicle,
    body: OrientedBox,
    /// The distance the vehicle means to move this frame, in px.
    budget: f64,
}

impl Snapshot<'_> {
    /// The padded body after spending `scale` of the budget, turning with the path.
    fn moved(&self, scale: f64) -> OrientedBox {
        if self.budget * scale <= 0.0 {
            return self.body;
        }
        padded(self.vehicle.predicted_box(self.budget * scale))
    }
}

/// The fraction of `a`'s motion that keeps it clear of `b`.
///
/// Returns `None` if `b` doesn't restrict `a` at all.
fn scale_against(a: &Snapshot, b: &Snapshot) -> Option<f64> {
    if !within_reach(&a.body, &b.body, REACH_MARGIN) {
        return None;
    }
    if a.body.overlaps(&b.body) {
        // Already in contact: only motion towards the other body is held
        let motion = a.moved(1.0).centre - a.body.centre;
        let towards = motion.dot(b.body.centre - a.body.centre) > 0.0;
        return towards.then_some(0.0);
    }
    let joint = max_safe_scale(|s| a.moved(s), |s| b.moved(s));
    let alone = max_safe_scale(|s| a.moved(s), |_| b.body);
    Some(f64::min(joint, alone)).filter(|s| *s < 1.0)
}

/// Reduces the speed of any vehicle whose motion this frame would bring its body
/// into contact with another.
///
/// # Parameters
/// * `vehicles` - The vehicles, whose speeds have been set by the earlier passes
/// * `dt` - The time step in ms
pub(crate) fn resolve_overlaps(vehicles: &mut VehicleSet, dt: f64) {
    for (id, neighbour, scale) in motion_limits(vehicles, dt) {
        let vehicle = &mut vehicles[id];
        let intended = vehicle.decision().intended_speed;
        let speed = f64::min(intended * scale, vehicle.speed() * scale);
        vehicle.set_speed(speed);
        vehicle.decision_mut().overlap = Some(OverlapDecision { neighbour, scale });
    }
}

/// The vehicles whose motion must be scaled back, each with the neighbour
/// restricting it and the allowed fraction of its motion.
fn motion_limits(vehicles: &VehicleSet, dt: f64) -> Vec<(VehicleId, VehicleId, f64)> {
    let snapshots = vehicles
        .iter()
        .map(|(id, vehicle)| Snapshot {
            id,
            vehicle,
            body: padded(vehicle.bounding_box()),
            budget: vehicle.speed() * dt,
        })
        .collect::<Vec<_>>();

    // The most constraining neighbour of each vehicle
    let mut limits = snapshots
        .iter()
        .map(|a| {
            if a.budget <= 0.0 {
                return None;
            }
            snapshots
                .iter()
                .filter(|b| b.id != a.id)
                .filter_map(|b| scale_against(a, b).map(|scale| (b.id, scale)))
                .min_by(|x, y| x.1.total_cmp(&y.1))
        })
        .collect::<Vec<_>>();

    // Every scaled motion clears every neighbour's current body, so holding
    // both vehicles of a pair that would still meet is always safe
    let scale_of = |limit: &Option<(VehicleId, f64)>| limit.map_or(1.0, |(_, s)| s);
    let mut held = vec![];
    for (i, j) in (0..snapshots.len()).tuple_combinations() {
        let (a, b) = (&snapshots[i], &snapshots[j]);
        if !within_reach(&a.body, &b.body, REACH_MARGIN) || a.body.overlaps(&b.body) {
            continue;
        }
        if a.moved(scale_of(&limits[i])).overlaps(&b.moved(scale_of(&limits[j]))) {
            held.push((i, b.id));
            held.push((j, a.id));
        }
    }
    for (i, neighbour) in held {
        limits[i] = Some((neighbour, 0.0));
    }

    snapshots
        .iter()
        .zip(limits)
        .filter_map(|(snapshot, limit)| {
            let (neighbour, scale) = limit?;
            debug_box("overlap", &snapshot.moved(scale));
            Some((snapshot.id, neighbour, scale))
        })
        .collect()
}
