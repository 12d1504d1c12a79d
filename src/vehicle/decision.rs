use crate::light::LightState;
use crate::VehicleId;

/// What each pass of the simulation decided for a vehicle during the current frame.
///
/// Cleared at the start of every frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Decision {
    /// The vehicle's speed at the start of the frame, in px/ms.
    pub start_speed: f64,
    /// The speed chosen by the car following model, in px/ms.
    pub intended_speed: f64,
    pub following: Option<FollowingDecision>,
    pub signal: SignalDecision,
    pub overlap: Option<OverlapDecision>,
}

impl Decision {
    pub(crate) fn new(start_speed: f64) -> Self {
        Self {
            start_speed,
            intended_speed: start_speed,
            ..Default::default()
        }
    }
}

/// The outcome of the car following model.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FollowingDecision {
    /// The vehicle being followed.
    pub leader: Option<VehicleId>,
    /// The net gap to the leader, in px.
    pub gap: f64,
    /// The acceleration, in px/ms<sup>2</sup>.
    pub acc: f64,
    /// The desired dynamic gap, in px.
    pub s_star: f64,
    /// The integrated speed before the gap constraint, in px/ms.
    pub capped_speed: f64,
    /// The largest speed that keeps the safety buffer to the leader, in px/ms.
    pub max_allowed_speed: f64,
}

/// How the traffic signal constrained a vehicle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum SignalDecision {
    /// Nothing to enforce: no signal, too far away, or a green light.
    #[default]
    Unconstrained,
    /// The vehicle may turn left regardless of the signal.
    Exempt,
    /// The vehicle's front has crossed its stop line.
    PastEntry,
    /// The vehicle decided to run the yellow light.
    Committed,
    /// The vehicle is slowing to stop at its stop line.
    Stopping {
        light: LightState,
        /// The distance left before the stand-off point, in px.
        stopping_distance: f64,
        /// The largest speed the signal allows, in px/ms.
        allowed: f64,
    },
}

/// The neighbour that most constrained a vehicle's motion this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapDecision {
    pub neighbour: VehicleId,
    /// The fraction of the frame's motion that was allowed.
    pub scale: f64,
}
