//! Car following within each inbound lane.

use crate::arm::Arm;
use crate::collision::longitudinal_gap;
use crate::math::Point2d;
use crate::vehicle::{AccelerationModel, FollowingDecision};
use crate::{VehicleId, VehicleSet};
use cgmath::prelude::*;
use itertools::Itertools;

/// Groups vehicles by the lane they arrived in, each group ordered from the
/// vehicle furthest along the arm's direction of travel to the one furthest back.
pub(crate) fn lane_queues(vehicles: &VehicleSet) -> Vec<((Arm, u8), Vec<VehicleId>)> {
    let progress = |arm: Arm, pos: Point2d| pos.to_vec().dot(arm.inbound_dir());
    vehicles
        .iter()
        .map(|(id, veh)| ((veh.origin(), veh.lane()), (progress(veh.origin(), veh.position()), id)))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(lane, _)| *lane)
        .map(|(lane, mut queue)| {
            queue.sort_by(|a, b| b.0.total_cmp(&a.0));
            (lane, queue.into_iter().map(|(_, id)| id).collect())
        })
        .collect()
}

/// Applies the car following model to every vehicle, lane by lane.
///
/// Leaders are processed before their followers, so each follower reacts to
/// its leader's speed for this frame.
pub(crate) fn apply_car_following(vehicles: &mut VehicleSet, model: &AccelerationModel, dt: f64) {
    for (_, queue) in lane_queues(vehicles) {
        for (idx, &id) in queue.iter().enumerate() {
            let vehicle = &vehicles[id];
            let own_box = vehicle.bounding_box();

            // The nearest vehicle ahead which can't be passed alongside
            let leader = queue[..idx]
                .iter()
                .rev()
                .map(|lid| (*lid, &vehicles[*lid]))
                .find(|(_, other)| !vehicle.can_pass(&other.bounding_box()));
            let (gap, leader_speed) = match leader {
                Some((_, other)) => (
                    Some(longitudinal_gap(&own_box, &other.bounding_box())),
                    other.speed(),
                ),
                None => (None, vehicle.speed()),
            };

            let res = model.follow(vehicle.speed(), vehicle.desired_speed(), gap, leader_speed, dt);
            let decision = FollowingDecision {
                leader: leader.map(|(lid, _)| lid),
                gap: gap.unwrap_or(f64::INFINITY),
                acc: res.acc,
                s_star: res.s_star,
                capped_speed: res.capped_speed,
                max_allowed_speed: res.max_allowed_speed,
            };

            let vehicle = &mut vehicles[id];
            vehicle.set_speed(res.speed);
            let record = vehicle.decision_mut();
            record.intended_speed = res.speed;
            record.following = Some(decision);
        }
    }
}
