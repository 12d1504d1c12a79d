//! Scenario configuration, loaded from JSON.

use crate::arm::{Arm, ArmMap, ManeuverSet};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// The largest number of lanes supported in each direction of an arm.
pub const MAX_LANES: u8 = 5;

/// A complete description of a simulation scenario.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The road geometry.
    pub layout: IntersectionLayout,
    /// The arrow marking of each inbound lane, listed from the centre line outwards.
    /// Unmarked lanes only go straight.
    pub arrows: ArmMap<Vec<ManeuverSet>>,
    /// The traffic demand on each arm.
    pub traffic: ArmMap<ArmTraffic>,
    /// The signal timing plan.
    pub signal: SignalConfig,
    /// Seed for the random number generator; entropy is used when absent.
    pub seed: Option<u64>,
}

/// The size of the drawing area, in px.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 800.0,
        }
    }
}

impl CanvasSize {
    /// The length of the canvas diagonal.
    pub fn diagonal(&self) -> f64 {
        self.width.hypot(self.height)
    }
}

/// The number of lanes on an arm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmLanes {
    /// Lanes carrying traffic towards the intersection.
    pub inbound: u8,
    /// Lanes carrying traffic away from the intersection.
    pub outbound: u8,
}

impl Default for ArmLanes {
    fn default() -> Self {
        Self {
            inbound: 2,
            outbound: 2,
        }
    }
}

/// The geometry of the intersection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectionLayout {
    pub canvas: CanvasSize,
    pub lanes: ArmMap<ArmLanes>,
    /// Pixels per metre used when drawing lanes; a lane is 3 m wide.
    pub lane_scale_px: f64,
    /// The kerb radius at each corner, in m.
    pub turning_radius_m: f64,
}

impl Default for IntersectionLayout {
    fn default() -> Self {
        Self {
            canvas: CanvasSize::default(),
            lanes: ArmMap::default(),
            lane_scale_px: 10.0,
            turning_radius_m: 5.0,
        }
    }
}

impl IntersectionLayout {
    /// The width of one lane, in px.
    pub fn lane_width(&self) -> f64 {
        3.0 * self.lane_scale_px
    }

    /// The kerb radius, in px.
    pub fn turning_radius(&self) -> f64 {
        self.turning_radius_m * self.lane_scale_px
    }
}

/// The traffic arriving on one arm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmTraffic {
    /// Arrival rate in vehicles per hour.
    pub flow: f64,
    /// Percentage of arrivals which are trucks.
    pub truck_pct: f64,
    /// Percentage of arrivals which are motorcycles; the rest are cars.
    pub motorcycle_pct: f64,
    /// Relative share of arrivals on each inbound lane. Uniform when empty.
    pub lane_weights: Vec<f64>,
    /// Exit lanes which arriving vehicles prefer, chosen uniformly. Any lane when empty.
    pub exit_lanes: Vec<u8>,
}

impl Default for ArmTraffic {
    fn default() -> Self {
        Self {
            flow: 500.0,
            truck_pct: 20.0,
            motorcycle_pct: 30.0,
            lane_weights: vec![],
            exit_lanes: vec![],
        }
    }
}

/// How arms are grouped into signal phases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMode {
    /// Each arm gets its own green, clockwise from north.
    #[default]
    Sequential,
    /// Opposite arms share a green: north with south, then east with west.
    Opposing,
}

impl PhaseMode {
    /// The arms released together in each phase group, in cycle order.
    pub fn groups(self) -> Vec<Vec<Arm>> {
        match self {
            PhaseMode::Sequential => Arm::ALL.iter().map(|arm| vec![*arm]).collect(),
            PhaseMode::Opposing => vec![vec![Arm::North, Arm::South], vec![Arm::East, Arm::West]],
        }
    }
}

/// The signal timing plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// The full cycle length, in s.
    pub cycle_s: f64,
    /// The yellow interval, in s.
    pub yellow_s: f64,
    /// The all-red clearance interval before each green, in s.
    pub all_red_s: f64,
    /// Overrides the green time derived from the cycle length, in s.
    pub green_s: Option<f64>,
    pub mode: PhaseMode,
    /// Whether left turns may proceed regardless of the signal.
    pub left_turn_on_red: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            cycle_s: 120.0,
            yellow_s: 3.0,
            all_red_s: 2.0,
            green_s: None,
            mode: PhaseMode::Sequential,
            left_turn_on_red: false,
        }
    }
}

impl SignalConfig {
    /// The green time of each phase group, in s.
    pub fn green(&self) -> f64 {
        self.green_s.unwrap_or_else(|| {
            let groups = self.mode.groups().len() as f64;
            f64::max(self.cycle_s / groups - self.all_red_s - self.yellow_s, 0.0)
        })
    }
}

impl SimulationConfig {
    /// Parses and validates a scenario.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises the scenario.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The maneuvers permitted from an inbound lane (0-based).
    /// Lanes without an arrow marking only go straight.
    pub fn lane_arrows(&self, arm: Arm, lane: usize) -> ManeuverSet {
        self.arrows[arm].get(lane).copied().unwrap_or_default()
    }

    /// Checks that the scenario is physically meaningful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        let canvas = layout.canvas;
        if !(canvas.width > 0.0 && canvas.height > 0.0 && canvas.diagonal().is_finite()) {
            return Err(ConfigError::Canvas {
                width: canvas.width,
                height: canvas.height,
            });
        }
        if !(layout.lane_scale_px > 0.0 && layout.lane_scale_px.is_finite()) {
            return Err(ConfigError::LaneScale(layout.lane_scale_px));
        }
        if !(layout.turning_radius_m >= 0.0 && layout.turning_radius_m.is_finite()) {
            return Err(ConfigError::TurningRadius(layout.turning_radius_m));
        }

        for (arm, lanes) in layout.lanes.iter() {
            let count = u8::max(lanes.inbound, lanes.outbound);
            if count > MAX_LANES {
                return Err(ConfigError::TooManyLanes {
                    arm,
                    count,
                    max: MAX_LANES,
                });
            }
        }

        for (arm, traffic) in self.traffic.iter() {
            let invalid = |reason: &str| ConfigError::Traffic {
                arm,
                reason: reason.to_string(),
            };
            if !(traffic.flow >= 0.0 && traffic.flow.is_finite()) {
                return Err(invalid("flow must be a non-negative number"));
            }
            let pct = 0.0..=100.0;
            if !pct.contains(&traffic.truck_pct) || !pct.contains(&traffic.motorcycle_pct) {
                return Err(invalid("vehicle percentages must lie between 0 and 100"));
            }
            if traffic.truck_pct + traffic.motorcycle_pct > 100.0 {
                return Err(invalid("truck and motorcycle percentages exceed 100"));
            }
            if traffic.lane_weights.iter().any(|w| !(*w >= 0.0 && w.is_finite())) {
                return Err(invalid("lane weights must be non-negative"));
            }
            if traffic.lane_weights.len() > usize::from(layout.lanes[arm].inbound) {
                return Err(invalid("more lane weights than inbound lanes"));
            }
            if traffic.exit_lanes.iter().any(|l| *l == 0 || *l > MAX_LANES) {
                return Err(invalid("exit lanes are numbered from 1"));
            }
        }

        let signal = &self.signal;
        let durations = [signal.cycle_s, signal.yellow_s, signal.all_red_s];
        if durations.iter().any(|d| !(*d >= 0.0 && d.is_finite())) {
            return Err(ConfigError::Signal("durations must be non-negative".into()));
        }
        if signal.cycle_s <= 0.0 {
            return Err(ConfigError::Signal("cycle length must be positive".into()));
        }
        if let Some(green) = signal.green_s {
            if !(green >= 0.0 && green.is_finite()) {
                return Err(ConfigError::Signal("green time must be non-negative".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn partial_scenarios_use_defaults() {
        let config = SimulationConfig::from_json(
            r#"{
                "layout": { "lanes": { "north": { "inbound": 3 } }, "turning_radius_m": 8 },
                "arrows": { "north": ["left", "straight", "straight_right"] },
                "traffic": { "east": { "flow": 900, "truck_pct": 5 } },
                "signal": { "mode": "opposing", "cycle_s": 60 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.layout.lanes.north.inbound, 3);
        assert_eq!(config.layout.lanes.north.outbound, 2);
        assert_eq!(config.layout.lanes.east, ArmLanes::default());
        assert_approx_eq!(config.layout.turning_radius(), 80.0);
        assert_approx_eq!(config.layout.lane_width(), 30.0);

        assert_eq!(config.lane_arrows(Arm::North, 2).to_string(), "straight_right");
        assert_eq!(config.lane_arrows(Arm::North, 7), ManeuverSet::default());
        // Arms missing from the arrow table have no markings
        assert!(config.arrows.south.is_empty());

        assert_approx_eq!(config.traffic.east.flow, 900.0);
        assert_approx_eq!(config.traffic.east.motorcycle_pct, 30.0);
        assert_approx_eq!(config.traffic.west.flow, 500.0);

        // 60 s split over two groups, less yellow and all-red
        assert_approx_eq!(config.signal.green(), 25.0);
    }

    #[test]
    fn default_scenario_survives_serialisation() {
        let config = SimulationConfig {
            seed: Some(7),
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(SimulationConfig::from_json(&json).unwrap(), config);
        assert_approx_eq!(config.signal.green(), 25.0);
    }

    #[test]
    fn invalid_scenarios_are_rejected() {
        let err = SimulationConfig::from_json(r#"{ "traffic": { "west": { "truck_pct": 80, "motorcycle_pct": 40 } } }"#);
        assert!(matches!(err, Err(ConfigError::Traffic { arm: Arm::West, .. })));

        let err = SimulationConfig::from_json(r#"{ "layout": { "lanes": { "south": { "outbound": 9 } } } }"#);
        assert!(matches!(err, Err(ConfigError::TooManyLanes { arm: Arm::South, count: 9, .. })));

        let err = SimulationConfig::from_json(r#"{ "signal": { "cycle_s": 0 } }"#);
        assert!(matches!(err, Err(ConfigError::Signal(_))));

        let err = SimulationConfig::from_json(r#"{ "arrows": { "east": ["sideways"] } }"#);
        assert!(matches!(err, Err(ConfigError::Json(_))));
    }
}
