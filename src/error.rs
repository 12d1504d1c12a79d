use crate::arm::{Arm, LaneKey};
use thiserror::Error;

/// An error parsing an arm, maneuver or lane identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown arm `{0}`")]
    Arm(String),

    #[error("unknown maneuver code `{0}`")]
    Maneuver(String),

    #[error("malformed lane key `{0}`, expected `{{arm}}_{{lane}}`")]
    LaneKey(String),
}

/// An invalid scenario configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not parse scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canvas must have a positive size, got {width}x{height}")]
    Canvas { width: f64, height: f64 },

    #[error("lane scale must be positive, got {0}")]
    LaneScale(f64),

    #[error("turning radius must be non-negative, got {0}")]
    TurningRadius(f64),

    #[error("{arm} arm has {count} lanes, at most {max} are supported")]
    TooManyLanes { arm: Arm, count: u8, max: u8 },

    #[error("{arm} arm: {reason}")]
    Traffic { arm: Arm, reason: String },

    #[error("signal timing: {0}")]
    Signal(String),
}

/// A failure to build a vehicle's path from the lane coordinates.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RouteError {
    #[error("no entry point for lane `{0}`")]
    MissingEntry(LaneKey),

    #[error("no exit point on the {0} arm")]
    MissingExit(Arm),
}
