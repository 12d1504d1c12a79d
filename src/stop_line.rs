//! Stopping at the stop line for red and yellow lights.

use crate::arm::Maneuver;
use crate::debug::debug_line;
use crate::light::{LightState, SignalState};
use crate::vehicle::{SignalDecision, Vehicle};
use cgmath::prelude::*;

/// Vehicles react to their signal within this distance of the stop line, in px.
const LOOKAHEAD: f64 = 100.0; // px (10 m)

/// The gap left between the front axle and the stop line, in px.
const SAFE_STOP: f64 = 15.0;

/// Added to the safe stopping gap, in px.
const SAFETY_BUFFER: f64 = 3.0; // px (0.3 m)

/// The deceleration used to approach the stop line, in px/ms<sup>2</sup>.
const COMFORT_DECEL: f64 = 0.0006;

/// Shapes the approach speed profile.
const RAMP_EXPONENT: f64 = 1.6;

/// Vehicles this close to the stop line when the light is yellow always continue, in px.
const YELLOW_COMMIT_DISTANCE: f64 = 40.0; // px (4 m)

/// A vehicle continues through a yellow light if it reaches the stop line
/// at least this long before the light turns red, in ms.
const YELLOW_TIME_MARGIN: f64 = 300.0;

/// The lowest speed assumed when estimating the time to the stop line, in px/ms.
const YELLOW_MIN_SPEED: f64 = 0.00005;

/// Constrains a vehicle's speed for this frame according to its signal.
///
/// # Parameters
/// * `vehicle` - The vehicle, whose speed has already been set by car following
/// * `signal` - The signal controlling the intersection
/// * `left_turn_on_red` - Whether left turns ignore the signal
/// * `dt` - The time step in ms
pub(crate) fn enforce(vehicle: &mut Vehicle, signal: &dyn SignalState, left_turn_on_red: bool, dt: f64) {
    let decision = decide(vehicle, signal, left_turn_on_red, dt);
    if let SignalDecision::Stopping { allowed, .. } = decision {
        let current = vehicle.decision().start_speed;
        let intended = vehicle.speed();
        let target = f64::min(intended, allowed);
        let max_drop = COMFORT_DECEL * dt;
        let new_speed = if target < current - max_drop {
            current - max_drop
        } else {
            target
        };
        // Never move further than the stand-off point in one frame
        let by_move = if allowed > 0.0 { allowed_by_move(vehicle, dt) } else { 0.0 };
        vehicle.set_speed(intended.min(new_speed).min(by_move));
    }
    vehicle.decision_mut().signal = decision;
}

/// The largest speed which keeps the front axle short of the stand-off point this frame.
fn allowed_by_move(vehicle: &Vehicle, dt: f64) -> f64 {
    let dist = vehicle.distance_to_entry(vehicle.front_axle()).unwrap_or(f64::INFINITY);
    f64::max(dist - SAFE_STOP - SAFETY_BUFFER, 0.0) / dt
}

/// Works out how the signal constrains the vehicle, updating its stop line latches.
fn decide(vehicle: &mut Vehicle, signal: &dyn SignalState, left_turn_on_red: bool, dt: f64) -> SignalDecision {
    if left_turn_on_red && vehicle.maneuver() == Maneuver::Left {
        return SignalDecision::Exempt;
    }
    let Some(entry) = vehicle.entry_point() else {
        return SignalDecision::Unconstrained;
    };
    vehicle.update_passed_entry();
    if vehicle.committed_on_yellow() {
        let rear_dist = vehicle.distance_to_entry(vehicle.rear_axle()).unwrap_or(0.0);
        if rear_dist <= 0.0 {
            vehicle.set_committed(false);
        }
        return SignalDecision::Committed;
    }
    if vehicle.passed_entry() {
        return SignalDecision::PastEntry;
    }

    let dist = vehicle.front_axle().distance(entry);
    if dist > LOOKAHEAD {
        return SignalDecision::Unconstrained;
    }
    debug_line("stop line", vehicle.front_axle(), entry);

    let light = signal.light(vehicle.origin());
    if light == LightState::Green {
        return SignalDecision::Unconstrained;
    }
    if light == LightState::Yellow {
        let speed = f64::max(vehicle.speed(), YELLOW_MIN_SPEED);
        let in_time = signal
            .remaining(vehicle.origin())
            .filter(|left| *left > 0.0)
            .map_or(false, |left| dist / speed <= f64::max(left - YELLOW_TIME_MARGIN, 0.0));
        if dist <= YELLOW_COMMIT_DISTANCE || in_time {
            vehicle.set_committed(true);
            return SignalDecision::Committed;
        }
    }

    let stopping_distance = f64::max(dist - SAFE_STOP - SAFETY_BUFFER, 0.0);
    let ramp = (stopping_distance / LOOKAHEAD).clamp(0.0, 1.0).powf(RAMP_EXPONENT);
    let by_decel = (2.0 * COMFORT_DECEL * stopping_distance).sqrt();
    let by_move = stopping_distance / dt;
    let mut allowed = (vehicle.desired_speed() * ramp).min(by_decel).min(by_move);
    if stopping_distance <= 0.5 * SAFETY_BUFFER {
        allowed = 0.0;
    }
    SignalDecision::Stopping {
        light,
        stopping_distance,
        allowed,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arm::Arm;
    use crate::light::FixedSignal;
    use crate::math::{Point2d, Vector2d};
    use crate::path::{Path, Segment};
    use crate::route::{PlannedPath, Route};
    use crate::vehicle::VehicleClass;
    use assert_approx_eq::assert_approx_eq;

    const ENTRY: Point2d = Point2d { x: 290.0, y: 385.0 };

    /// A car heading east whose front axle is `gap` px short of the west stop line.
    fn car(gap: f64, maneuver: Maneuver) -> Vehicle {
        let route = Route {
            origin: Arm::West,
            lane: 1,
            maneuver,
            preferred_exit: None,
        };
        let centre = Point2d::new(ENTRY.x - gap - 13.25, ENTRY.y);
        let mut v = Vehicle::new(1, VehicleClass::Car, route, centre, Vector2d::unit_x(), 0.07, 0.0);
        let path = Path::new([Segment::line(v.rear_axle(), Point2d::new(900.0, ENTRY.y))]);
        v.assign_path(PlannedPath {
            path,
            entry: Some(ENTRY),
            exit: None,
        });
        v
    }

    #[test]
    fn green_and_distant_vehicles_are_free() {
        let green = FixedSignal::new(LightState::Green);
        let red = FixedSignal::new(LightState::Red);

        let mut v = car(50.0, Maneuver::Straight);
        enforce(&mut v, &green, false, 16.0);
        assert_eq!(v.decision().signal, SignalDecision::Unconstrained);
        assert_approx_eq!(v.speed(), 0.07);

        let mut v = car(150.0, Maneuver::Straight);
        enforce(&mut v, &red, false, 16.0);
        assert_eq!(v.decision().signal, SignalDecision::Unconstrained);
    }

    #[test]
    fn red_light_brakes_within_comfort() {
        let red = FixedSignal::new(LightState::Red);
        let mut v = car(90.0, Maneuver::Straight);
        v.reset();
        enforce(&mut v, &red, false, 16.0);
        assert!(matches!(v.decision().signal, SignalDecision::Stopping { light: LightState::Red, .. }));
        assert_approx_eq!(v.speed(), 0.07 - COMFORT_DECEL * 16.0);

        // At the stand-off point the vehicle is held
        let mut v = car(19.0, Maneuver::Straight);
        enforce(&mut v, &red, false, 16.0);
        assert_eq!(v.speed(), 0.0);
    }

    #[test]
    fn left_turn_on_red() {
        let red = FixedSignal::new(LightState::Red);
        let mut v = car(40.0, Maneuver::Left);
        enforce(&mut v, &red, true, 16.0);
        assert_eq!(v.decision().signal, SignalDecision::Exempt);
        assert_approx_eq!(v.speed(), 0.07);
        enforce(&mut v, &red, false, 16.0);
        assert!(v.speed() < 0.07);
    }

    #[test]
    fn exempt_left_turns_still_cross_the_line() {
        let red = FixedSignal::new(LightState::Red);
        let mut v = car(10.0, Maneuver::Left);
        for _ in 0..20 {
            v.reset();
            enforce(&mut v, &red, true, 16.0);
            assert_eq!(v.decision().signal, SignalDecision::Exempt);
            v.integrate(16.0);
            v.update_passed_entry();
        }
        assert!(v.passed_entry());
        assert!(!v.needs_lead_in());
    }

    #[test]
    fn yellow_commit_lasts_until_the_rear_axle_is_across() {
        let yellow = FixedSignal::new(LightState::Yellow);
        let red = FixedSignal::new(LightState::Red);

        let mut v = car(30.0, Maneuver::Straight);
        enforce(&mut v, &yellow, false, 16.0);
        assert!(v.committed_on_yellow());
        assert_eq!(v.decision().signal, SignalDecision::Committed);

        // The light turns red while the vehicle crosses
        for _ in 0..80 {
            enforce(&mut v, &red, false, 16.0);
            assert!(!matches!(v.decision().signal, SignalDecision::Stopping { .. }));
            assert_approx_eq!(v.speed(), 0.07);
            if v.distance_to_entry(v.rear_axle()).unwrap() > 0.0 {
                assert!(v.committed_on_yellow());
            }
            v.integrate(16.0);
        }
        assert!(!v.committed_on_yellow());
        assert!(v.passed_entry());
        assert_eq!(v.decision().signal, SignalDecision::PastEntry);
    }

    #[test]
    fn yellow_time_decides_between_go_and_stop() {
        // 80 px at 0.07 px/ms takes about 1.1 s
        let enough = FixedSignal::new(LightState::Yellow).with_remaining(Arm::West, 2000.0);
        let mut v = car(80.0, Maneuver::Straight);
        enforce(&mut v, &enough, false, 16.0);
        assert!(v.committed_on_yellow());

        let short = FixedSignal::new(LightState::Yellow).with_remaining(Arm::West, 1200.0);
        let mut v = car(80.0, Maneuver::Straight);
        enforce(&mut v, &short, false, 16.0);
        assert!(!v.committed_on_yellow());
        assert!(matches!(v.decision().signal, SignalDecision::Stopping { light: LightState::Yellow, .. }));
    }
}
