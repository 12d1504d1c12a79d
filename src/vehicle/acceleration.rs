use crate::util::Interval;

/// The minimum gap to maintain between stopped vehicles, in px.
pub const MIN_GAP: f64 = 20.0; // px (2 m)

/// The maximum acceleration, in px/ms<sup>2</sup>.
const MAX_ACC: f64 = 0.00018;

/// The comfortable deceleration, as a positive number in px/ms<sup>2</sup>.
const COMF_DEC: f64 = 0.00035;

/// The desired time headway to the vehicle ahead, in ms.
const TIME_HEADWAY: f64 = 1200.0; // ms

/// The free-road acceleration exponent.
const DELTA: i32 = 4;

/// Speeds are never integrated above the desired speed plus this margin, in px/ms.
pub const SPEED_MARGIN: f64 = 0.0005;

/// Moves are capped so at least this much gap to the leader remains, in px.
pub const SAFETY_BUFFER: f64 = 3.0; // px (0.3 m)

/// The acceleration model of every vehicle: the intelligent driver model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccelerationModel {
    /// The maximum acceleration in px/ms<sup>2</sup>.
    pub max_acc: f64,
    /// The comfortable deceleration in px/ms<sup>2</sup> (positive).
    pub comf_dec: f64,
    /// The desired time gap to the vehicle ahead in ms.
    pub headway: f64,
    /// The minimum gap to a stopped leader in px.
    pub min_gap: f64,
}

impl Default for AccelerationModel {
    fn default() -> Self {
        Self {
            max_acc: MAX_ACC,
            comf_dec: COMF_DEC,
            headway: TIME_HEADWAY,
            min_gap: MIN_GAP,
        }
    }
}

/// The gap assumed when there is no vehicle ahead, in px.
pub const FREE_ROAD_GAP: f64 = 1e9;

/// The outcome of one car following update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FollowingResult {
    /// The acceleration computed by the model, after clamping.
    pub acc: f64,
    /// The desired dynamic gap.
    pub s_star: f64,
    /// The integrated speed, capped at the desired speed.
    pub capped_speed: f64,
    /// The largest speed that keeps the safety buffer to the leader.
    pub max_allowed_speed: f64,
    /// The speed to use for this frame.
    pub speed: f64,
}

impl AccelerationModel {
    /// The range that accelerations are clamped to.
    pub fn bounds(&self) -> Interval<f64> {
        Interval::new(-6.0 * self.comf_dec, 4.0 * self.max_acc)
    }

    /// Computes an acceleration using the intelligent driver model.
    ///
    /// # Arguments
    /// * `speed` - The follower's speed (px/ms).
    /// * `desired` - The follower's desired speed (px/ms).
    /// * `gap` - The net distance to the leader (px).
    /// * `leader_speed` - The leader's speed (px/ms), `None` when there is no leader.
    pub fn acceleration(&self, speed: f64, desired: f64, gap: f64, leader_speed: Option<f64>) -> (f64, f64) {
        let bounds = self.bounds();
        let speed = f64::max(speed, 0.0);
        let appr = speed - leader_speed.unwrap_or(speed);
        let factor = 1.0 / (2.0 * f64::max(self.max_acc * self.comf_dec, 1e-12).sqrt());
        let s_star = self.min_gap + speed * self.headway + speed * appr * factor;
        let safe_gap = f64::max(gap, 1.0);

        let free = 1.0 - f64::max(speed / f64::max(desired, 1e-8), 1e-8).powi(DELTA);
        let interaction = (f64::max(s_star, 0.0) / safe_gap).powi(2);
        let acc = self.max_acc * (free - interaction);

        if acc.is_finite() {
            (bounds.clamp(acc), s_star)
        } else {
            (bounds.min, s_star)
        }
    }

    /// Integrates the model over one frame and caps the result so the vehicle
    /// cannot close the gap to its leader beyond the safety buffer.
    ///
    /// # Arguments
    /// * `speed` - The follower's speed (px/ms).
    /// * `desired` - The follower's desired speed (px/ms).
    /// * `gap` - The net distance to the leader (px), or `None` without a leader.
    /// * `leader_speed` - The leader's speed (px/ms).
    /// * `dt` - The time step (ms).
    pub fn follow(
        &self,
        speed: f64,
        desired: f64,
        gap: Option<f64>,
        leader_speed: f64,
        dt: f64,
    ) -> FollowingResult {
        let leader = gap.map(|g| (g, leader_speed));
        let raw_gap = gap.filter(|g| g.is_finite()).unwrap_or(FREE_ROAD_GAP);
        let (acc, s_star) = self.acceleration(speed, desired, raw_gap, leader.map(|l| l.1));

        let new_speed = f64::max(speed + acc * dt, 0.0);
        let capped_speed = f64::min(new_speed, desired + SPEED_MARGIN);

        let leader_move = leader.map_or(0.0, |(_, v)| f64::max(v, 0.0) * dt);
        let max_move = f64::max(raw_gap + leader_move - SAFETY_BUFFER, 0.0);
        let max_allowed_speed = if dt > 0.0 { max_move / dt } else { capped_speed };

        let mut final_speed = f64::max(f64::min(capped_speed, max_allowed_speed), 0.0);
        if raw_gap <= 0.5 * SAFETY_BUFFER || !final_speed.is_finite() {
            final_speed = 0.0;
        }

        FollowingResult {
            acc,
            s_star,
            capped_speed,
            max_allowed_speed,
            speed: final_speed,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn free_road_acceleration() {
        let model = AccelerationModel::default();
        let (acc, _) = model.acceleration(0.0, 0.07, FREE_ROAD_GAP, None);
        assert_approx_eq!(acc, MAX_ACC, 1e-9);

        // At the desired speed there is no further acceleration
        let (acc, _) = model.acceleration(0.07, 0.07, FREE_ROAD_GAP, None);
        assert_approx_eq!(acc, 0.0, 1e-9);
    }

    #[test]
    fn close_leader_brakes_hard() {
        let model = AccelerationModel::default();
        let (acc, s_star) = model.acceleration(0.07, 0.07, 5.0, Some(0.0));
        assert!(s_star > MIN_GAP);
        assert_approx_eq!(acc, model.bounds().min);
    }

    #[test]
    fn degenerate_inputs_stay_finite() {
        let model = AccelerationModel::default();
        let (acc, _) = model.acceleration(f64::NAN, 0.07, 10.0, None);
        assert!(acc.is_finite());
        let res = model.follow(0.05, 0.07, Some(f64::NAN), 0.0, 16.0);
        assert!(res.speed.is_finite() && res.speed >= 0.0);
        let res = model.follow(0.05, 0.0, Some(-4.0), 0.0, 16.0);
        assert_eq!(res.speed, 0.0);
    }

    #[test]
    fn moves_never_exceed_the_gap() {
        let model = AccelerationModel::default();
        let dt = 16.0;
        let res = model.follow(0.5, 0.5, Some(10.0), 0.0, dt);
        assert!(res.speed * dt <= 10.0 - SAFETY_BUFFER + 1e-9);
        // A moving leader frees up room
        let res = model.follow(0.5, 0.5, Some(10.0), 0.2, dt);
        assert_approx_eq!(res.max_allowed_speed, (10.0 + 0.2 * dt - SAFETY_BUFFER) / dt);
    }

    #[test]
    fn speed_is_capped_at_desired() {
        let model = AccelerationModel::default();
        let res = model.follow(0.1, 0.05, None, 0.0, 16.0);
        assert!(res.speed <= 0.05 + SPEED_MARGIN);
    }
}
