use crate::math::{normalize_or, Point2d, Vector2d};
use crate::path::Path;
use cgmath::prelude::*;
use std::borrow::Borrow;

/// Vehicles this close to their path are placed on it directly, in px.
const SNAP_DISTANCE: f64 = 1.0;

/// The shortest blend onto a path, in px.
const MIN_BLEND: f64 = 2.0;

/// Blends are no longer than this or half the wheel base, whichever is greater, in px.
const MAX_BLEND: f64 = 20.0;

/// Bounds the number of state changes within one frame.
const MAX_TRANSITIONS: usize = 8;

/// Movement budgets smaller than this are considered spent, in px.
const BUDGET_EPS: f64 = 1e-6;

/// The placement of a vehicle's axles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// The centre of the rear axle.
    pub rear: Point2d,
    /// The centre of the front axle.
    pub front: Point2d,
    /// The point midway along the wheel base.
    pub centre: Point2d,
    /// A unit vector from the rear axle towards the front axle.
    pub heading: Vector2d,
}

impl Pose {
    /// A pose centred on `centre` facing along `heading`.
    pub fn from_centre(centre: Point2d, heading: Vector2d, wheel_base: f64) -> Self {
        let half = heading * (0.5 * wheel_base);
        Self {
            rear: centre - half,
            front: centre + half,
            centre,
            heading,
        }
    }

    /// The pose of a vehicle whose rear axle is `dist` along `path`.
    ///
    /// The front axle lies `wheel_base` further along the path (or at its end),
    /// and the heading runs from the rear axle to the front axle.
    pub fn on_path(path: &Path, dist: f64, wheel_base: f64) -> Self {
        let rear = path.sample(dist);
        let front = path.point_at(f64::min(dist + wheel_base, path.length()));
        let heading = normalize_or(front - rear.pos, rear.tan);
        Self {
            rear: rear.pos,
            front,
            centre: rear.pos + heading * (0.5 * wheel_base),
            heading,
        }
    }
}

/// The state of a vehicle's motion, holding its path as a `P`.
#[derive(Clone, Debug)]
pub(crate) enum MotionOf<P> {
    /// Travelling in a straight line without a path.
    Free,
    /// A path has been assigned but the vehicle has not yet joined it.
    Approaching { path: P },
    /// Moving onto the path.
    Blending { path: P, blend: Blend },
    /// Following the path; `traveled` is the distance of the rear axle along it.
    Following { path: P, traveled: f64 },
}

/// The motion state a vehicle owns.
pub(crate) type Motion = MotionOf<Path>;

impl<P> Default for MotionOf<P> {
    fn default() -> Self {
        MotionOf::Free
    }
}

/// A short straight move that takes a vehicle onto its path.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Blend {
    /// The pose at which the vehicle joins the path.
    target: Pose,
    /// The distance along the path of the target rear axle.
    traveled: f64,
    /// The blend distance left.
    remaining: f64,
}

/// The publicly visible tag of a vehicle's [Motion].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionState {
    Free,
    Approaching,
    Blending,
    Following,
}

impl<P: Borrow<Path>> MotionOf<P> {
    pub fn state(&self) -> MotionState {
        match self {
            MotionOf::Free => MotionState::Free,
            MotionOf::Approaching { .. } => MotionState::Approaching,
            MotionOf::Blending { .. } => MotionState::Blending,
            MotionOf::Following { .. } => MotionState::Following,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            MotionOf::Free => None,
            MotionOf::Approaching { path } | MotionOf::Blending { path, .. } | MotionOf::Following { path, .. } => {
                Some(path.borrow())
            }
        }
    }

    pub fn traveled(&self) -> Option<f64> {
        match self {
            MotionOf::Following { traveled, .. } => Some(*traveled),
            _ => None,
        }
    }

    /// The same state with its path borrowed, so it can be advanced
    /// without disturbing the original.
    pub fn borrowed(&self) -> MotionOf<&Path> {
        match self {
            MotionOf::Free => MotionOf::Free,
            MotionOf::Approaching { path } => MotionOf::Approaching { path: path.borrow() },
            MotionOf::Blending { path, blend } => MotionOf::Blending {
                path: path.borrow(),
                blend: *blend,
            },
            MotionOf::Following { path, traveled } => MotionOf::Following {
                path: path.borrow(),
                traveled: *traveled,
            },
        }
    }

    /// Spends a movement budget of `budget` px, updating `pose` and
    /// returning the new state.
    pub fn advance(self, pose: &mut Pose, wheel_base: f64, mut budget: f64) -> Self {
        let mut motion = self;
        for _ in 0..MAX_TRANSITIONS {
            if !(budget > BUDGET_EPS) {
                break;
            }
            motion = match motion {
                MotionOf::Free => {
                    let centre = pose.centre + pose.heading * budget;
                    *pose = Pose::from_centre(centre, pose.heading, wheel_base);
                    budget = 0.0;
                    MotionOf::Free
                }
                MotionOf::Approaching { path } => {
                    let rear = pose.centre - pose.heading * (0.5 * wheel_base);
                    let proj = path.borrow().closest_point(rear);
                    let target = Pose::on_path(path.borrow(), proj.dist, wheel_base);
                    if proj.offset <= SNAP_DISTANCE {
                        *pose = target;
                        MotionOf::Following {
                            path,
                            traveled: proj.dist,
                        }
                    } else {
                        let cap = f64::max(MAX_BLEND, 0.5 * wheel_base);
                        let remaining = f64::max(MIN_BLEND, f64::min(proj.offset, cap));
                        MotionOf::Blending {
                            path,
                            blend: Blend {
                                target,
                                traveled: proj.dist,
                                remaining,
                            },
                        }
                    }
                }
                MotionOf::Blending { path, mut blend } => {
                    let to_target = blend.target.centre - pose.centre;
                    let dist = to_target.magnitude();
                    if dist > BUDGET_EPS {
                        let step = budget.min(dist).min(blend.remaining);
                        let dir = to_target / dist;
                        *pose = Pose::from_centre(pose.centre + dir * step, dir, wheel_base);
                        budget -= step;
                        blend.remaining -= step;
                    }
                    let arrived = pose.centre.distance(blend.target.centre) <= SNAP_DISTANCE;
                    if arrived || blend.remaining <= BUDGET_EPS {
                        *pose = blend.target;
                        MotionOf::Following {
                            path,
                            traveled: blend.traveled,
                        }
                    } else {
                        MotionOf::Blending { path, blend }
                    }
                }
                MotionOf::Following { path, traveled } => {
                    let length = path.borrow().length();
                    let step = budget.min(f64::max(length - traveled, 0.0));
                    let traveled = traveled + step;
                    budget -= step;
                    *pose = Pose::on_path(path.borrow(), traveled, wheel_base);
                    if traveled >= length - BUDGET_EPS {
                        MotionOf::Free
                    } else {
                        MotionOf::Following { path, traveled }
                    }
                }
            };
        }
        motion
    }
}
