//! Creating vehicles, either on request or as random arrivals.

use crate::arm::{Arm, ArmMap, Maneuver};
use crate::config::{ArmTraffic, SimulationConfig};
use crate::geometry::{spawn_pose, LaneCoordinates};
use crate::math::Point2d;
use crate::route::{plan_or_degrade, Route};
use crate::units::kmh_to_px_per_ms;
use crate::vehicle::{Vehicle, VehicleClass};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_distr::Exp;

/// Arrival rates are given per hour; interarrival times are in ms.
const MS_PER_HOUR: f64 = 3_600_000.0;

/// A request to add a vehicle to the simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleSpawn {
    /// The arm the vehicle arrives on.
    pub origin: Arm,
    /// The inbound lane, counted from 0 at the centre line.
    pub lane: usize,
    pub class: VehicleClass,
    /// The maneuver to perform, or `None` to choose one permitted by the lane's arrows.
    pub maneuver: Option<Maneuver>,
    /// The exit lane the vehicle would like to leave by, numbered from 1.
    pub preferred_exit: Option<u8>,
    /// The free-road speed in km/h, or `None` to draw one for the class.
    pub desired_speed_kmh: Option<f64>,
    /// Where to place the centre of the vehicle, or `None` to start just off the canvas.
    pub position: Option<Point2d>,
}

impl VehicleSpawn {
    pub fn new(origin: Arm, lane: usize, class: VehicleClass) -> Self {
        Self {
            origin,
            lane,
            class,
            maneuver: None,
            preferred_exit: None,
            desired_speed_kmh: None,
            position: None,
        }
    }

    pub fn with_maneuver(mut self, maneuver: Maneuver) -> Self {
        self.maneuver = Some(maneuver);
        self
    }

    pub fn with_preferred_exit(mut self, lane: u8) -> Self {
        self.preferred_exit = Some(lane);
        self
    }

    pub fn with_desired_speed_kmh(mut self, kmh: f64) -> Self {
        self.desired_speed_kmh = Some(kmh);
        self
    }

    /// Places the vehicle's centre at `position`, facing into the intersection.
    pub fn at(mut self, position: Point2d) -> Self {
        self.position = Some(position);
        self
    }

    /// Draws a random arrival on `arm` according to its traffic mix.
    /// Returns `None` if the arm has no inbound lanes.
    pub fn random(arm: Arm, traffic: &ArmTraffic, inbound: u8, rng: &mut impl Rng) -> Option<Self> {
        if inbound == 0 {
            return None;
        }
        let lanes = usize::from(inbound);
        // Lanes without a weight receive no traffic
        let lane = match WeightedIndex::new(traffic.lane_weights.iter().take(lanes)) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..lanes),
        };

        let u = rng.gen_range(0.0..100.0);
        let class = if u < traffic.truck_pct {
            VehicleClass::Truck
        } else if u < traffic.truck_pct + traffic.motorcycle_pct {
            VehicleClass::Motorcycle
        } else {
            VehicleClass::Car
        };

        Some(Self {
            preferred_exit: traffic.exit_lanes.choose(rng).copied(),
            ..Self::new(arm, lane, class)
        })
    }

    /// Builds the vehicle and assigns its path.
    /// Returns `None` if the origin arm has no such inbound lane.
    pub(crate) fn build(
        &self,
        number: u64,
        now: f64,
        config: &SimulationConfig,
        coords: &LaneCoordinates,
        rng: &mut impl Rng,
    ) -> Option<Vehicle> {
        let layout = &config.layout;
        let lane_num = u8::try_from(self.lane + 1).ok()?;
        if lane_num > layout.lanes[self.origin].inbound {
            return None;
        }

        let maneuver = self.maneuver.unwrap_or_else(|| {
            let arrows = config.lane_arrows(self.origin, self.lane).maneuvers();
            arrows.choose(rng).copied().unwrap_or(Maneuver::Straight)
        });
        let desired_speed = match self.desired_speed_kmh {
            Some(kmh) => kmh_to_px_per_ms(kmh.max(0.0)),
            None => Vehicle::random_desired_speed(self.class, rng),
        };
        let (centre, heading) = match self.position {
            Some(pos) => (pos, self.origin.inbound_dir()),
            None => spawn_pose(layout.canvas, layout.lane_width(), self.origin, self.lane),
        };

        let route = Route {
            origin: self.origin,
            lane: lane_num,
            maneuver,
            preferred_exit: self.preferred_exit,
        };
        let mut vehicle = Vehicle::new(number, self.class, route, centre, heading, desired_speed, now);
        let planned = plan_or_degrade(&route, coords, vehicle.rear_axle(), heading, true, layout.canvas);
        vehicle.assign_path(planned);
        Some(vehicle)
    }
}

/// Schedules random arrivals on each arm as a Poisson process.
#[derive(Clone, Debug)]
pub(crate) struct Spawner {
    /// The time of the next arrival on each arm, in ms, drawn once the arm has traffic.
    next: ArmMap<Option<f64>>,
    /// Arrivals which were due but found their spawn point occupied.
    deferred: ArmMap<Option<VehicleSpawn>>,
    enabled: bool,
}

impl Default for Spawner {
    fn default() -> Self {
        Self {
            next: ArmMap::default(),
            deferred: ArmMap::default(),
            enabled: true,
        }
    }
}

impl Spawner {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.deferred = ArmMap::default();
        }
    }

    /// The arrivals due at time `now`, at most one per arm.
    ///
    /// Each arrival must be passed back to [Spawner::placed] or [Spawner::blocked].
    pub fn due(&mut self, now: f64, config: &SimulationConfig, rng: &mut impl Rng) -> Vec<VehicleSpawn> {
        if !self.enabled {
            return vec![];
        }
        let mut due = vec![];
        for arm in Arm::ALL {
            let traffic = &config.traffic[arm];
            if !(traffic.flow > 0.0) {
                continue;
            }
            let next = *self.next[arm].get_or_insert_with(|| now + Self::interarrival(traffic.flow, rng));
            if now < next {
                continue;
            }
            let inbound = config.layout.lanes[arm].inbound;
            let spawn = self.deferred[arm]
                .take()
                .or_else(|| VehicleSpawn::random(arm, traffic, inbound, rng));
            match spawn {
                Some(spawn) => due.push(spawn),
                None => self.next[arm] = Some(now + Self::interarrival(traffic.flow, rng)),
            }
        }
        due
    }

    /// Schedules the next arrival after one was placed on the road.
    pub fn placed(&mut self, spawn: &VehicleSpawn, now: f64, config: &SimulationConfig, rng: &mut impl Rng) {
        let flow = config.traffic[spawn.origin].flow;
        self.next[spawn.origin] = Some(now + Self::interarrival(flow, rng));
    }

    /// Holds an arrival until its spawn point is clear.
    pub fn blocked(&mut self, spawn: VehicleSpawn) {
        self.deferred[spawn.origin] = Some(spawn);
    }

    /// Draws the time until the next arrival, in ms.
    fn interarrival(flow: f64, rng: &mut impl Rng) -> f64 {
        match Exp::new(flow / MS_PER_HOUR) {
            Ok(dist) if flow > 0.0 => dist.sample(rng),
            _ => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arm::{LaneKey, ManeuverSet};
    use crate::vehicle::MotionState;
    use assert_approx_eq::assert_approx_eq;
    use itertools::Itertools;

    fn config(flow: f64) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        for arm in Arm::ALL {
            config.traffic[arm].flow = 0.0;
        }
        config.traffic[Arm::West].flow = flow;
        config
    }

    #[test]
    fn arrivals_follow_the_flow_rate() {
        let config = config(1800.0);
        let mut rng = StdRng::seed_from_u64(7);
        let mut spawner = Spawner::default();

        let mut count = 0;
        let mut now = 0.0;
        while now < 3_600_000.0 {
            for spawn in spawner.due(now, &config, &mut rng) {
                assert_eq!(spawn.origin, Arm::West);
                spawner.placed(&spawn, now, &config, &mut rng);
                count += 1;
            }
            now += 100.0;
        }
        // 1800 veh/h, give or take a few standard deviations
        assert!((1600..2000).contains(&count), "{} arrivals", count);
    }

    #[test]
    fn blocked_arrivals_are_retried() {
        let config = config(600.0);
        let mut rng = StdRng::seed_from_u64(3);
        let mut spawner = Spawner::default();

        let mut now = 0.0;
        let first = loop {
            let due = spawner.due(now, &config, &mut rng);
            if !due.is_empty() {
                break due;
            }
            now += 16.0;
        };
        assert_eq!(first.len(), 1);
        spawner.blocked(first[0]);
        assert_eq!(spawner.due(now + 16.0, &config, &mut rng), first);

        spawner.set_enabled(false);
        assert!(spawner.due(now + 32.0, &config, &mut rng).is_empty());
    }

    #[test]
    fn first_arrivals_are_staggered() {
        let mut config = config(600.0);
        for arm in Arm::ALL {
            config.traffic[arm].flow = 600.0;
        }
        let mut rng = StdRng::seed_from_u64(5);
        let mut spawner = Spawner::default();
        assert!(spawner.due(0.0, &config, &mut rng).is_empty());

        let mut first = ArmMap::<Option<f64>>::default();
        let mut now = 0.0;
        while first.iter().any(|(_, t)| t.is_none()) && now < 600_000.0 {
            for spawn in spawner.due(now, &config, &mut rng) {
                first[spawn.origin].get_or_insert(now);
                spawner.placed(&spawn, now, &config, &mut rng);
            }
            now += 16.0;
        }
        let times = first.iter().filter_map(|(_, t)| *t).collect::<Vec<_>>();
        assert_eq!(times.len(), 4);
        assert!(times.iter().all(|t| *t > 0.0));
        assert!(times.iter().any(|t| *t != times[0]));
    }

    #[test]
    fn traffic_mix() {
        let traffic = ArmTraffic {
            truck_pct: 20.0,
            motorcycle_pct: 30.0,
            lane_weights: vec![0.0, 1.0],
            exit_lanes: vec![2],
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let spawns = (0..2000)
            .filter_map(|_| VehicleSpawn::random(Arm::North, &traffic, 2, &mut rng))
            .collect::<Vec<_>>();
        assert!(spawns.iter().all(|s| s.lane == 1 && s.preferred_exit == Some(2)));

        let counts = spawns.iter().counts_by(|s| s.class);
        let share = |class| counts.get(&class).copied().unwrap_or(0) as f64 / 2000.0;
        assert_approx_eq!(share(VehicleClass::Truck), 0.2, 0.05);
        assert_approx_eq!(share(VehicleClass::Motorcycle), 0.3, 0.05);
        assert_approx_eq!(share(VehicleClass::Car), 0.5, 0.05);

        assert!(VehicleSpawn::random(Arm::North, &traffic, 0, &mut rng).is_none());
    }

    #[test]
    fn built_vehicles_start_off_canvas() {
        let config = SimulationConfig::default();
        let coords = LaneCoordinates::from_layout(&config.layout);
        let mut rng = StdRng::seed_from_u64(1);

        let spawn = VehicleSpawn::new(Arm::North, 0, VehicleClass::Car)
            .with_maneuver(Maneuver::Straight)
            .with_desired_speed_kmh(25.2);
        let vehicle = spawn.build(1, 0.0, &config, &coords, &mut rng).unwrap();
        assert_approx_eq!(vehicle.position().x, 415.0);
        assert_approx_eq!(vehicle.position().y, -20.0);
        assert_approx_eq!(vehicle.speed(), 0.07);
        assert_eq!(vehicle.motion_state(), MotionState::Approaching);
        assert_eq!(vehicle.entry_point(), Some(Point2d::new(415.0, 290.0)));

        // Unmarked lanes go straight, marked ones follow their arrows
        let spawn = VehicleSpawn::new(Arm::North, 1, VehicleClass::Truck);
        let vehicle = spawn.build(2, 0.0, &config, &coords, &mut rng).unwrap();
        assert_eq!(vehicle.maneuver(), Maneuver::Straight);

        let mut marked = config.clone();
        marked.arrows.north = vec![ManeuverSet::default(), "straight_right".parse().unwrap()];
        for _ in 0..20 {
            let vehicle = spawn.build(2, 0.0, &marked, &coords, &mut rng).unwrap();
            assert_ne!(vehicle.maneuver(), Maneuver::Left);
        }

        assert!(VehicleSpawn::new(Arm::North, 2, VehicleClass::Car)
            .build(3, 0.0, &config, &coords, &mut rng)
            .is_none());

        // Without a matching exit lane the preferred one is used
        let mut wide = config.clone();
        wide.layout.lanes.north.inbound = 3;
        let coords = LaneCoordinates::from_layout(&wide.layout);
        let spawn = VehicleSpawn::new(Arm::North, 2, VehicleClass::Car).with_preferred_exit(1);
        let vehicle = spawn.build(4, 0.0, &wide, &coords, &mut rng).unwrap();
        assert_eq!(vehicle.exit_lane(), Some(LaneKey::new(Arm::South, 1)));
    }
}
