//! Speed samples and trip records for reporting.

use crate::arm::{Arm, ArmMap, Maneuver};
use crate::math::Point2d;
use crate::units::{px_per_ms_to_kmh, px_per_ms_to_mps, px_to_m};
use crate::vehicle::{Vehicle, VehicleClass};
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;
use serde::Serialize;
use slotmap::SecondaryMap;
use std::collections::VecDeque;

/// The number of recent speed samples kept for each vehicle.
const MAX_SAMPLES: usize = 30;

/// A vehicle's speed at an instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpeedSample {
    /// The simulation time in ms.
    pub time: f64,
    pub position: Point2d,
    /// The speed in m/s.
    pub speed: f64,
}

/// The statistics gathered for a vehicle still on the road.
#[derive(Clone, Debug, Default)]
struct VehicleStats {
    samples: VecDeque<SpeedSample>,
    /// The distance travelled in px.
    distance: f64,
}

/// The summary of one completed trip through the intersection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TripRecord {
    pub number: u64,
    pub class: VehicleClass,
    pub origin: Arm,
    pub destination: Arm,
    pub maneuver: Maneuver,
    /// The simulation time the vehicle appeared, in s.
    pub spawned_at: f64,
    /// The simulation time the vehicle left the canvas, in s.
    pub exited_at: f64,
    pub duration_s: f64,
    pub distance_m: f64,
    pub avg_speed_mps: f64,
    pub avg_speed_kmh: f64,
    pub desired_speed_kmh: f64,
    /// The time lost compared with driving the same distance at the desired speed, in s.
    pub delay_s: f64,
}

/// Aggregated trips for one origin and destination pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovementSummary {
    pub origin: Arm,
    pub destination: Arm,
    pub count: usize,
    pub mean_speed_kmh: f64,
    pub mean_delay_s: f64,
}

/// Collects per-vehicle samples and the records of finished trips.
#[derive(Clone, Debug, Default)]
pub struct TripLog {
    active: SecondaryMap<VehicleId, VehicleStats>,
    trips: Vec<TripRecord>,
}

impl TripLog {
    /// Records a vehicle's speed after it moved `moved` px in the frame ending at `now`.
    pub(crate) fn record(&mut self, vehicle: &Vehicle, moved: f64, now: f64) {
        let Some(stats) = self.active.entry(vehicle.id()).map(|e| e.or_default()) else {
            return;
        };
        stats.distance += moved;
        if stats.samples.len() == MAX_SAMPLES {
            stats.samples.pop_front();
        }
        stats.samples.push_back(SpeedSample {
            time: now,
            position: vehicle.position(),
            speed: px_per_ms_to_mps(vehicle.speed()),
        });
    }

    /// Completes the trip of a vehicle leaving the canvas at `now`.
    pub(crate) fn finish(&mut self, vehicle: &Vehicle, now: f64) -> &TripRecord {
        let distance = self.active.remove(vehicle.id()).map_or(0.0, |s| s.distance);
        let duration = f64::max(now - vehicle.spawned_at(), 0.0);
        let avg_speed = if duration > 0.0 { distance / duration } else { 0.0 };
        let free_time = if vehicle.desired_speed() > 0.0 {
            distance / vehicle.desired_speed()
        } else {
            duration
        };

        self.trips.push(TripRecord {
            number: vehicle.number(),
            class: vehicle.class(),
            origin: vehicle.origin(),
            destination: vehicle.destination(),
            maneuver: vehicle.maneuver(),
            spawned_at: vehicle.spawned_at() / 1000.0,
            exited_at: now / 1000.0,
            duration_s: duration / 1000.0,
            distance_m: px_to_m(distance),
            avg_speed_mps: px_per_ms_to_mps(avg_speed),
            avg_speed_kmh: px_per_ms_to_kmh(avg_speed),
            desired_speed_kmh: px_per_ms_to_kmh(vehicle.desired_speed()),
            delay_s: (duration - free_time) / 1000.0,
        });
        &self.trips[self.trips.len() - 1]
    }

    /// Forgets a vehicle without recording a trip.
    pub(crate) fn discard(&mut self, id: VehicleId) {
        self.active.remove(id);
    }

    /// The finished trips, in the order the vehicles left.
    pub fn trips(&self) -> &[TripRecord] {
        &self.trips
    }

    /// The most recent speed samples of a vehicle on the road, oldest first.
    pub fn samples(&self, id: VehicleId) -> impl Iterator<Item = &SpeedSample> {
        self.active.get(id).into_iter().flat_map(|s| s.samples.iter())
    }

    /// The distance a vehicle on the road has travelled so far, in m.
    pub fn distance(&self, id: VehicleId) -> Option<f64> {
        self.active.get(id).map(|s| px_to_m(s.distance))
    }

    /// Aggregates the finished trips by movement.
    pub fn summary(&self) -> Vec<MovementSummary> {
        self.trips
            .iter()
            .into_group_map_by(|trip| (trip.origin, trip.destination))
            .into_iter()
            .sorted_by_key(|(movement, _)| *movement)
            .map(|((origin, destination), trips)| {
                let count = trips.len();
                let mean = |f: fn(&TripRecord) -> f64| trips.iter().map(|t| f(t)).sum::<f64>() / count as f64;
                MovementSummary {
                    origin,
                    destination,
                    count,
                    mean_speed_kmh: mean(|t| t.avg_speed_kmh),
                    mean_delay_s: mean(|t| t.delay_s),
                }
            })
            .collect()
    }

    /// Serialises the finished trips as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.trips)
    }
}

/// The number of vehicles stopped short of their stop line on each arm.
pub fn queue_lengths(vehicles: &VehicleSet) -> ArmMap<usize> {
    let mut queues = ArmMap::<usize>::default();
    for vehicle in vehicles.values() {
        if vehicle.has_stopped() && !vehicle.passed_entry() {
            queues[vehicle.origin()] += 1;
        }
    }
    queues
}
