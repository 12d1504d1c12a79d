use crate::arm::{Arm, ArmMap, ManeuverSet};
use crate::config::{ArmTraffic, IntersectionLayout, SignalConfig, SimulationConfig};
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::error::ConfigError;
use crate::following::apply_car_following;
use crate::geometry::LaneCoordinates;
use crate::light::{LightState, SignalState, TrafficLight};
use crate::overlap::resolve_overlaps;
use crate::route::plan_or_degrade;
use crate::spawn::{Spawner, VehicleSpawn};
use crate::stats::{queue_lengths, TripLog};
use crate::stop_line::enforce;
use crate::util::Interval;
use crate::vehicle::{AccelerationModel, MotionState, Vehicle};
use crate::{VehicleId, VehicleSet};
use rand::prelude::*;
use std::collections::VecDeque;

/// Frames longer than this are split into several ticks, in ms.
const MAX_FRAME_STEP: f64 = 50.0;

/// The longest time a single call to [Simulation::step] advances, in ms.
pub const MAX_STEP: f64 = 60_000.0;

/// Vehicles whose centre is further than this outside the canvas are removed, in px.
const REMOVAL_MARGIN: f64 = 60.0;

/// A change to the scenario, applied at the start of the next tick.
#[derive(Clone, Debug)]
pub enum Reconfigure {
    /// Replaces the road geometry and regenerates the lane coordinates.
    Layout(IntersectionLayout),
    /// Replaces the lane coordinates with ones supplied from outside,
    /// such as by a road renderer.
    LaneCoordinates(LaneCoordinates),
    Arrows(ArmMap<Vec<ManeuverSet>>),
    Traffic(ArmMap<ArmTraffic>),
    /// Replaces the signal timing plan and restarts the signal controller.
    Signal(SignalConfig),
}

/// A simulation of a single signalised intersection.
pub struct Simulation {
    config: SimulationConfig,
    /// The stop line and exit points of every lane.
    coords: LaneCoordinates,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The signal controller, if the intersection is signalised.
    signal: Option<Box<dyn SignalState>>,
    spawner: Spawner,
    trips: TripLog,
    model: AccelerationModel,
    rng: StdRng,
    /// Changes waiting to be applied.
    pending: VecDeque<Reconfigure>,
    /// The simulated time in ms.
    time: f64,
    /// The current frame of simulation.
    frame: usize,
    /// The number given to the next vehicle.
    next_number: u64,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Simulation {
    /// Creates a simulation of the given scenario, controlled by a fixed-time signal.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            coords: LaneCoordinates::from_layout(&config.layout),
            vehicles: VehicleSet::default(),
            signal: Some(Box::new(TrafficLight::new(&config.signal))),
            spawner: Spawner::default(),
            trips: TripLog::default(),
            model: AccelerationModel::default(),
            rng,
            pending: VecDeque::new(),
            time: 0.0,
            frame: 0,
            next_number: 1,
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
            config,
        })
    }

    /// Advances the simulation by `dt` ms.
    ///
    /// Steps longer than 50 ms are split into equal ticks, and steps longer
    /// than [MAX_STEP] are shortened to it.
    /// Non-positive or non-finite steps are ignored.
    pub fn step(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        if dt > MAX_STEP {
            log::warn!("step of {} ms shortened to {} ms", dt, MAX_STEP);
        }
        let dt = dt.min(MAX_STEP);
        let ticks = (dt / MAX_FRAME_STEP).ceil().max(1.0);
        for _ in 0..ticks as usize {
            self.tick(dt / ticks);
        }
    }

    fn tick(&mut self, dt: f64) {
        self.apply_reconfigurations();
        if let Some(signal) = self.signal.as_mut() {
            signal.step(dt);
        }
        self.spawn_arrivals();
        for vehicle in self.vehicles.values_mut() {
            vehicle.reset();
        }
        apply_car_following(&mut self.vehicles, &self.model, dt);
        self.apply_signal(dt);
        resolve_overlaps(&mut self.vehicles, dt);
        self.integrate(dt);
        self.remove_departed();
        self.frame += 1;

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }
    }

    /// Gets the simulated time in ms.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The lane coordinates vehicle paths are currently built from.
    pub fn lane_coordinates(&self) -> &LaneCoordinates {
        &self.coords
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID, if it is still on the road.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    pub fn signal(&self) -> Option<&dyn SignalState> {
        self.signal.as_deref()
    }

    /// The colour shown to an arm, or `None` if the intersection is unsignalised.
    pub fn light(&self, arm: Arm) -> Option<LightState> {
        self.signal().map(|signal| signal.light(arm))
    }

    /// Replaces the signal controller.
    pub fn set_signal(&mut self, signal: impl SignalState + 'static) {
        self.signal = Some(Box::new(signal));
    }

    /// Removes the signal controller; vehicles then ignore their stop lines.
    pub fn clear_signal(&mut self) {
        self.signal = None;
    }

    /// The trips completed so far and the samples of vehicles on the road.
    pub fn trips(&self) -> &TripLog {
        &self.trips
    }

    /// The number of vehicles stopped short of their stop line on each arm.
    pub fn queue_lengths(&self) -> ArmMap<usize> {
        queue_lengths(&self.vehicles)
    }

    /// Turns random arrivals on or off.
    pub fn set_spawning(&mut self, enabled: bool) {
        self.spawner.set_enabled(enabled);
    }

    /// Queues a change to the scenario for the start of the next tick.
    pub fn queue(&mut self, change: Reconfigure) {
        self.pending.push_back(change);
    }

    /// Adds a vehicle to the simulation.
    ///
    /// Returns `None` if the origin arm has no such inbound lane.
    pub fn add_vehicle(&mut self, spawn: VehicleSpawn) -> Option<VehicleId> {
        let vehicle = spawn.build(self.next_number, self.time, &self.config, &self.coords, &mut self.rng)?;
        Some(self.insert_vehicle(vehicle))
    }

    /// Removes a vehicle from the simulation without recording a trip.
    pub fn remove_vehicle(&mut self, vehicle_id: VehicleId) -> Option<Vehicle> {
        self.trips.discard(vehicle_id);
        self.vehicles.remove(vehicle_id)
    }

    /// Gets the debugging information for the previously simulated frame as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&self) -> &serde_json::Value {
        &self.debug
    }

    fn insert_vehicle(&mut self, vehicle: Vehicle) -> VehicleId {
        self.next_number += 1;
        log::debug!(
            "vehicle {} ({:?}) enters from {} lane {} to go {}",
            vehicle.number(),
            vehicle.class(),
            vehicle.origin().name(),
            vehicle.lane(),
            vehicle.maneuver().name()
        );
        self.vehicles.insert_with_key(|id| vehicle.with_id(id))
    }

    /// Applies the queued changes in order. Invalid changes are logged and dropped.
    fn apply_reconfigurations(&mut self) {
        while let Some(change) = self.pending.pop_front() {
            let mut config = self.config.clone();
            let mut coords = None;
            match change {
                Reconfigure::Layout(layout) => {
                    coords = Some(LaneCoordinates::from_layout(&layout));
                    config.layout = layout;
                }
                Reconfigure::LaneCoordinates(external) => coords = Some(external),
                Reconfigure::Arrows(arrows) => config.arrows = arrows,
                Reconfigure::Traffic(traffic) => config.traffic = traffic,
                Reconfigure::Signal(signal) => config.signal = signal,
            }
            if let Err(err) = config.validate() {
                log::warn!("ignoring invalid reconfiguration: {}", err);
                continue;
            }

            if config.signal != self.config.signal {
                self.signal = Some(Box::new(TrafficLight::new(&config.signal)));
            }
            self.config = config;
            if let Some(coords) = coords {
                self.coords = coords;
                self.reassign_paths();
            }
            log::debug!("applied reconfiguration at {:.0} ms", self.time);
        }
    }

    /// Rebuilds the path of every vehicle still travelling along one,
    /// after the lane coordinates changed.
    fn reassign_paths(&mut self) {
        let canvas = self.config.layout.canvas;
        for vehicle in self.vehicles.values_mut() {
            if vehicle.motion_state() == MotionState::Free {
                continue;
            }
            let planned = plan_or_degrade(
                vehicle.route(),
                &self.coords,
                vehicle.rear_axle(),
                vehicle.direction(),
                vehicle.needs_lead_in(),
                canvas,
            );
            vehicle.assign_path(planned);
        }
    }

    /// Adds the random arrivals which are due, holding back any whose
    /// spawn point is still occupied.
    fn spawn_arrivals(&mut self) {
        let now = self.time;
        for spawn in self.spawner.due(now, &self.config, &mut self.rng) {
            let built = spawn.build(self.next_number, now, &self.config, &self.coords, &mut self.rng);
            let Some(vehicle) = built else {
                self.spawner.placed(&spawn, now, &self.config, &mut self.rng);
                continue;
            };
            let body = vehicle.bounding_box();
            if self.vehicles.values().any(|other| other.bounding_box().overlaps(&body)) {
                self.spawner.blocked(spawn);
                continue;
            }
            self.spawner.placed(&spawn, now, &self.config, &mut self.rng);
            self.insert_vehicle(vehicle);
        }
    }

    /// Constrains vehicle speeds according to the signal.
    fn apply_signal(&mut self, dt: f64) {
        let Some(signal) = self.signal.as_deref() else {
            return;
        };
        let left_turn_on_red = self.config.signal.left_turn_on_red;
        for vehicle in self.vehicles.values_mut() {
            enforce(vehicle, signal, left_turn_on_red, dt);
        }
    }

    /// Moves every vehicle, latching stop line crossings, and samples its speed.
    fn integrate(&mut self, dt: f64) {
        self.time += dt;
        for vehicle in self.vehicles.values_mut() {
            let moved = vehicle.integrate(dt);
            vehicle.update_passed_entry();
            self.trips.record(vehicle, moved, self.time);
        }
    }

    /// Removes vehicles which have left the canvas, completing their trips.
    fn remove_departed(&mut self) {
        let canvas = self.config.layout.canvas;
        let xs = Interval::new(-REMOVAL_MARGIN, canvas.width + REMOVAL_MARGIN);
        let ys = Interval::new(-REMOVAL_MARGIN, canvas.height + REMOVAL_MARGIN);
        let departed = self
            .vehicles
            .iter()
            .filter(|(_, veh)| !xs.contains(veh.position().x) || !ys.contains(veh.position().y))
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        for vehicle_id in departed {
            if let Some(vehicle) = self.vehicles.remove(vehicle_id) {
                let trip = self.trips.finish(&vehicle, self.time);
                log::debug!(
                    "vehicle {} leaves by {} after {:.1} s",
                    trip.number,
                    trip.destination.name(),
                    trip.duration_s
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arm::Maneuver;
    use crate::light::FixedSignal;
    use crate::math::Point2d;
    use crate::vehicle::VehicleClass;
    use assert_approx_eq::assert_approx_eq;
    use cgmath::prelude::*;

    fn quiet_config() -> SimulationConfig {
        let mut config = SimulationConfig {
            seed: Some(1),
            ..Default::default()
        };
        for arm in Arm::ALL {
            config.traffic[arm].flow = 0.0;
        }
        config
    }

    #[test]
    fn frames_are_subdivided() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        sim.step(120.0);
        assert_eq!(sim.frame(), 3);
        assert_approx_eq!(sim.time(), 120.0);
        sim.step(0.0);
        sim.step(-5.0);
        sim.step(f64::NAN);
        assert_eq!(sim.frame(), 3);
    }

    #[test]
    fn huge_steps_are_shortened() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        sim.step(1e300);
        assert_approx_eq!(sim.time(), MAX_STEP);
        assert_eq!(sim.frame(), (MAX_STEP / MAX_FRAME_STEP) as usize);
    }

    #[test]
    fn random_arrivals_can_be_disabled() {
        let mut config = quiet_config();
        config.traffic[Arm::East].flow = 3600.0;
        let mut sim = Simulation::new(config).unwrap();
        while sim.iter_vehicles().count() == 0 {
            sim.step(16.0);
            assert!(sim.time() < 60_000.0);
        }
        assert_eq!(sim.iter_vehicles().count(), 1);
        let vehicle = sim.iter_vehicles().next().unwrap();
        assert_eq!(vehicle.origin(), Arm::East);
        assert_eq!(vehicle.number(), 1);

        sim.set_spawning(false);
        for _ in 0..600 {
            sim.step(16.0);
        }
        assert!(sim.iter_vehicles().all(|v| v.number() == 1));
    }

    #[test]
    fn invalid_reconfigurations_are_ignored() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        let mut layout = sim.config().layout.clone();
        layout.lane_scale_px = -1.0;
        sim.queue(Reconfigure::Layout(layout));
        sim.step(16.0);
        assert_approx_eq!(sim.config().layout.lane_scale_px, 10.0);
    }

    #[test]
    fn layout_changes_move_paths_without_moving_vehicles() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        sim.set_signal(FixedSignal::new(LightState::Green));
        let id = sim
            .add_vehicle(VehicleSpawn::new(Arm::North, 0, VehicleClass::Car).with_maneuver(Maneuver::Straight))
            .unwrap();
        for _ in 0..10 {
            sim.step(16.0);
        }
        let before = *sim.get_vehicle(id).unwrap().pose();

        let mut layout = sim.config().layout.clone();
        layout.turning_radius_m = 8.0;
        sim.queue(Reconfigure::Layout(layout));
        sim.step(0.001);

        let vehicle = sim.get_vehicle(id).unwrap();
        assert!(vehicle.position().distance(before.centre) < 0.01);
        assert_eq!(vehicle.entry_point(), Some(Point2d::new(415.0, 260.0)));
        assert_eq!(sim.lane_coordinates(), &LaneCoordinates::from_layout(&sim.config().layout));
    }

    #[test]
    fn unsignalised_intersections_are_free_flowing() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        sim.clear_signal();
        assert!(sim.light(Arm::North).is_none());
        let id = sim
            .add_vehicle(VehicleSpawn::new(Arm::West, 0, VehicleClass::Motorcycle).at(Point2d::new(200.0, 385.0)))
            .unwrap();
        for _ in 0..200 {
            sim.step(16.0);
        }
        let vehicle = sim.get_vehicle(id).unwrap();
        assert!(vehicle.passed_entry());
        assert!(!vehicle.has_stopped());
    }

    #[test]
    fn stop_lines_are_crossed_without_a_signal() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        sim.clear_signal();
        let id = sim
            .add_vehicle(VehicleSpawn::new(Arm::North, 0, VehicleClass::Car).with_maneuver(Maneuver::Straight))
            .unwrap();
        let mut crossed = false;
        for _ in 0..400 {
            sim.step(16.0);
            let Some(vehicle) = sim.get_vehicle(id) else {
                break;
            };
            let ahead = vehicle.entry_point().unwrap().y - vehicle.front_axle().y;
            assert_eq!(vehicle.passed_entry(), ahead <= 0.0 || crossed);
            crossed = vehicle.passed_entry();
        }
        assert!(crossed);
    }

    #[test]
    fn left_turns_on_red_leave_the_queue() {
        let mut config = quiet_config();
        config.signal.left_turn_on_red = true;
        let mut sim = Simulation::new(config).unwrap();
        sim.set_signal(FixedSignal::new(LightState::Red));
        let id = sim
            .add_vehicle(VehicleSpawn::new(Arm::North, 0, VehicleClass::Car).with_maneuver(Maneuver::Left))
            .unwrap();
        let mut crossed = false;
        for _ in 0..400 {
            sim.step(16.0);
            let Some(vehicle) = sim.get_vehicle(id) else {
                break;
            };
            crossed |= vehicle.passed_entry();
            if vehicle.has_stopped() {
                assert!(vehicle.passed_entry());
            }
        }
        assert!(crossed);
        assert_eq!(sim.queue_lengths()[Arm::North], 0);
    }

    #[test]
    fn explicit_removal_records_no_trip() {
        let mut sim = Simulation::new(quiet_config()).unwrap();
        let id = sim
            .add_vehicle(VehicleSpawn::new(Arm::South, 1, VehicleClass::Truck))
            .unwrap();
        sim.step(16.0);
        assert!(sim.remove_vehicle(id).is_some());
        assert!(sim.get_vehicle(id).is_none());
        assert!(sim.trips().trips().is_empty());
        assert!(sim.add_vehicle(VehicleSpawn::new(Arm::South, 4, VehicleClass::Car)).is_none());
    }
}
