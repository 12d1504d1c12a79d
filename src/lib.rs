pub use arm::{Arm, ArmMap, LaneKey, Maneuver, ManeuverSet};
pub use cgmath;
pub use collision::OrientedBox;
pub use config::{ArmLanes, ArmTraffic, CanvasSize, IntersectionLayout, PhaseMode, SignalConfig, SimulationConfig};
pub use error::{ConfigError, ParseError, RouteError};
pub use geometry::LaneCoordinates;
pub use light::{FixedSignal, LightState, Phase, SignalState, TrafficLight};
pub use simulation::{Reconfigure, Simulation, MAX_STEP};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use spawn::VehicleSpawn;
pub use stats::{MovementSummary, SpeedSample, TripLog, TripRecord};
pub use util::Interval;
pub use vehicle::{
    Decision, FollowingDecision, MotionState, OverlapDecision, Pose, SignalDecision, Vehicle, VehicleAttributes,
    VehicleClass, MIN_GAP,
};

mod arm;
mod collision;
mod config;
mod debug;
mod error;
mod following;
pub mod geometry;
mod light;
pub mod math;
mod overlap;
pub mod path;
pub mod route;
mod simulation;
mod spawn;
mod stats;
mod stop_line;
pub mod units;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
