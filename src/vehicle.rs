use self::motion::Motion;
use crate::arm::{Arm, LaneKey, Maneuver};
use crate::collision::OrientedBox;
use crate::math::{rot90, Point2d, Vector2d};
use crate::path::Path;
use crate::route::{PlannedPath, Route};
use crate::units::{kmh_to_px_per_ms, m_to_px};
use crate::util::Interval;
use crate::VehicleId;
use cgmath::prelude::*;
use serde::{Deserialize, Serialize};

pub(crate) use self::acceleration::AccelerationModel;
pub use self::acceleration::MIN_GAP;
pub use self::decision::{Decision, FollowingDecision, OverlapDecision, SignalDecision};
pub use self::motion::{MotionState, Pose};

mod acceleration;
mod decision;
mod motion;

/// The minimum lateral clearance for own vehicle to pass another, in px.
const LATERAL_CLEARANCE: f64 = 5.0; // px (0.5 m)

/// The kinds of vehicle in the traffic mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Motorcycle,
    Car,
    Truck,
}

/// The physical attributes of a class of vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleAttributes {
    /// The vehicle length in m.
    pub length: f64,
    /// The vehicle width in m.
    pub width: f64,
    /// Distance between the front and rear axles in m.
    pub wheel_base: f64,
    /// Distance from the front axle to the front of the vehicle in m.
    pub front_overhang: f64,
    /// The range that desired speeds are drawn from, in km/h.
    pub speed_kmh: Interval<f64>,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 3] = [VehicleClass::Motorcycle, VehicleClass::Car, VehicleClass::Truck];

    /// The attributes shared by every vehicle of this class.
    pub fn attributes(self) -> VehicleAttributes {
        match self {
            VehicleClass::Motorcycle => VehicleAttributes {
                length: 2.0,
                width: 0.7,
                wheel_base: 1.3,
                front_overhang: 0.35,
                speed_kmh: Interval::new(25.0, 35.0),
            },
            VehicleClass::Car => VehicleAttributes {
                length: 4.5,
                width: 2.1,
                wheel_base: 2.65,
                front_overhang: 0.925,
                speed_kmh: Interval::new(20.0, 30.0),
            },
            // Wheel base measured to the leading rear axle
            VehicleClass::Truck => VehicleAttributes {
                length: 12.0,
                width: 2.5,
                wheel_base: 5.8,
                front_overhang: 1.0,
                speed_kmh: Interval::new(15.0, 20.0),
            },
        }
    }
}

impl VehicleAttributes {
    /// Distance from the rear axle to the back of the vehicle in m.
    pub fn rear_overhang(&self) -> f64 {
        self.length - self.wheel_base - self.front_overhang
    }
}

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// A sequential number for display.
    number: u64,
    class: VehicleClass,
    /// Half the vehicle's width in px.
    half_wid: f64,
    /// Half the vehicle's length in px.
    half_len: f64,
    /// Distance between the axles in px.
    wheel_base: f64,
    /// How far the centre of the body sits ahead of the centre of the wheel base, in px.
    body_offset: f64,
    route: Route,
    /// The exit lane the vehicle's path leads to.
    exit: Option<LaneKey>,
    /// The stop line point of the vehicle's lane.
    entry: Option<Point2d>,
    pose: Pose,
    /// The current speed in px/ms.
    speed: f64,
    /// The free-road speed in px/ms.
    desired_speed: f64,
    motion: Motion,
    /// Set once the front axle crosses the stop line and never cleared.
    passed_entry: bool,
    /// Set when the vehicle decides to run a yellow light, until its rear axle is across.
    committed: bool,
    decision: Decision,
    /// The simulation time the vehicle appeared, in ms.
    spawned_at: f64,
}

impl Vehicle {
    /// Creates a new vehicle centred on `centre`, travelling along `heading` at its desired speed.
    pub(crate) fn new(
        number: u64,
        class: VehicleClass,
        route: Route,
        centre: Point2d,
        heading: Vector2d,
        desired_speed: f64,
        now: f64,
    ) -> Self {
        let attribs = class.attributes();
        let wheel_base = m_to_px(attribs.wheel_base);
        Self {
            id: VehicleId::default(),
            number,
            class,
            half_wid: m_to_px(0.5 * attribs.width),
            half_len: m_to_px(0.5 * attribs.length),
            wheel_base,
            body_offset: m_to_px(0.5 * (attribs.front_overhang - attribs.rear_overhang())),
            route,
            exit: None,
            entry: None,
            pose: Pose::from_centre(centre, heading, wheel_base),
            speed: desired_speed,
            desired_speed,
            motion: Motion::Free,
            passed_entry: false,
            committed: false,
            decision: Decision::new(desired_speed),
            spawned_at: now,
        }
    }

    /// The vehicle with its ID set, for insertion into a [VehicleSet](crate::VehicleSet).
    pub(crate) fn with_id(mut self, id: VehicleId) -> Self {
        self.id = id;
        self
    }

    /// Draws a desired speed for a vehicle of the given class, in px/ms.
    pub fn random_desired_speed(class: VehicleClass, rng: &mut impl rand::Rng) -> f64 {
        let range = class.attributes().speed_kmh;
        kmh_to_px_per_ms(rng.gen_range(range.min..=range.max))
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's sequential number, starting from 1.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn class(&self) -> VehicleClass {
        self.class
    }

    /// The vehicle's width in px.
    pub fn width(&self) -> f64 {
        2.0 * self.half_wid
    }

    /// The vehicle's length in px.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// The distance between the axles in px.
    pub fn wheel_base(&self) -> f64 {
        self.wheel_base
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn origin(&self) -> Arm {
        self.route.origin
    }

    /// The inbound lane, numbered from 1.
    pub fn lane(&self) -> u8 {
        self.route.lane
    }

    pub fn maneuver(&self) -> Maneuver {
        self.route.maneuver
    }

    /// The arm the vehicle is leaving by.
    pub fn destination(&self) -> Arm {
        self.exit.map_or_else(|| self.route.destination(), |key| key.arm)
    }

    /// The exit lane the vehicle's path leads to, if it has one.
    pub fn exit_lane(&self) -> Option<LaneKey> {
        self.exit
    }

    /// The stop line point of the vehicle's lane, if known.
    pub fn entry_point(&self) -> Option<Point2d> {
        self.entry
    }

    /// The midpoint of the wheel base in world space.
    pub fn position(&self) -> Point2d {
        self.pose.centre
    }

    /// A unit vector in world space aligned with the vehicle's heading.
    pub fn direction(&self) -> Vector2d {
        self.pose.heading
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn rear_axle(&self) -> Point2d {
        self.pose.rear
    }

    pub fn front_axle(&self) -> Point2d {
        self.pose.front
    }

    /// The vehicle's speed in px/ms.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The vehicle's free-road speed in px/ms.
    pub fn desired_speed(&self) -> f64 {
        self.desired_speed
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.speed < 0.001
    }

    pub fn motion_state(&self) -> MotionState {
        self.motion.state()
    }

    /// The path the vehicle is following or joining.
    pub fn path(&self) -> Option<&Path> {
        self.motion.path()
    }

    /// The distance of the rear axle along the path, while following it.
    pub fn traveled(&self) -> Option<f64> {
        self.motion.traveled()
    }

    /// Whether the vehicle's front axle has crossed its stop line.
    pub fn passed_entry(&self) -> bool {
        self.passed_entry
    }

    /// Whether the vehicle has committed to running a yellow light.
    pub fn committed_on_yellow(&self) -> bool {
        self.committed
    }

    /// What the simulation decided for this vehicle in the last frame.
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// The simulation time at which the vehicle appeared, in ms.
    pub fn spawned_at(&self) -> f64 {
        self.spawned_at
    }

    /// The vehicle's body as an oriented box.
    pub fn bounding_box(&self) -> OrientedBox {
        self.body_at(&self.pose)
    }

    /// The body the vehicle would have after moving `budget` px along its path,
    /// turning with it. The vehicle itself is left unchanged.
    pub(crate) fn predicted_box(&self, budget: f64) -> OrientedBox {
        let mut pose = self.pose;
        self.motion.borrowed().advance(&mut pose, self.wheel_base, budget);
        self.body_at(&pose)
    }

    fn body_at(&self, pose: &Pose) -> OrientedBox {
        OrientedBox {
            centre: pose.centre + pose.heading * self.body_offset,
            axis: pose.heading,
            half_len: self.half_len,
            half_wid: self.half_wid,
        }
    }

    /// The distance from `point` to the stop line, measured along the vehicle's heading.
    /// Positive while the stop line is still ahead.
    pub(crate) fn distance_to_entry(&self, point: Point2d) -> Option<f64> {
        self.entry.map(|entry| (entry - point).dot(self.pose.heading))
    }

    /// Determines whether the vehicle can pass beside the given box without following it.
    pub(crate) fn can_pass(&self, other: &OrientedBox) -> bool {
        let lat = rot90(self.pose.heading);
        let own = self.bounding_box().project(lat);
        own.clearance_with(&other.project(lat)) >= LATERAL_CLEARANCE
    }

    /// Sets a path, which the vehicle will join from wherever it currently is.
    pub(crate) fn assign_path(&mut self, planned: PlannedPath) {
        self.entry = planned.entry;
        self.exit = planned.exit;
        self.motion = Motion::Approaching { path: planned.path };
    }

    /// Whether the vehicle should get a lead-in to its stop line when replanned.
    pub(crate) fn needs_lead_in(&self) -> bool {
        !self.passed_entry && self.distance_to_entry(self.pose.rear).map_or(true, |d| d > 0.0)
    }

    pub(crate) fn set_speed(&mut self, speed: f64) {
        self.speed = if speed.is_finite() { f64::max(speed, 0.0) } else { 0.0 };
    }

    pub(crate) fn decision_mut(&mut self) -> &mut Decision {
        &mut self.decision
    }

    /// Latches `passed_entry` once the front axle has reached the stop line.
    pub(crate) fn update_passed_entry(&mut self) {
        if self.distance_to_entry(self.pose.front).map_or(false, |d| d <= 0.0) {
            self.passed_entry = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn set_passed_entry(&mut self) {
        self.passed_entry = true;
    }

    pub(crate) fn set_committed(&mut self, committed: bool) {
        self.committed = committed;
    }

    /// Resets the decision record in preparation for a new frame.
    pub(crate) fn reset(&mut self) {
        self.decision = Decision::new(self.speed);
    }

    /// Moves the vehicle for one frame at its current speed.
    /// Returns the distance travelled in px.
    ///
    /// # Parameters
    /// * `dt` - The time step in ms
    pub(crate) fn integrate(&mut self, dt: f64) -> f64 {
        let budget = self.speed * dt;
        let motion = std::mem::take(&mut self.motion);
        self.motion = motion.advance(&mut self.pose, self.wheel_base, budget);
        budget
    }
}
