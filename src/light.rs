use crate::arm::{Arm, ArmMap};
use crate::config::SignalConfig;
use serde::{Deserialize, Serialize};

/// The colour shown to one arm of the intersection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightState {
    #[default]
    Red,
    Yellow,
    Green,
}

/// A source of signal colours, polled by the simulation every frame.
pub trait SignalState {
    /// The colour currently shown to `arm`.
    fn light(&self, arm: Arm) -> LightState;

    /// The time left before the colour shown to `arm` changes, in ms,
    /// or `None` if unknown.
    fn remaining(&self, arm: Arm) -> Option<f64>;

    /// Advances the signal by `dt` ms.
    fn step(&mut self, _dt: f64) {}
}

/// The part of a phase group's cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Every arm is red while the previous group clears the intersection.
    AllRed,
    Green,
    Yellow,
}

impl Phase {
    fn next(self) -> Option<Phase> {
        match self {
            Phase::AllRed => Some(Phase::Green),
            Phase::Green => Some(Phase::Yellow),
            Phase::Yellow => None,
        }
    }
}

/// A fixed-time signal controller which releases groups of arms in turn.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The arms released together, in cycle order.
    groups: Vec<Vec<Arm>>,
    /// The duration of each phase in ms.
    all_red: f64,
    green: f64,
    yellow: f64,
    /// The group currently being served.
    group: usize,
    phase: Phase,
    /// The time spent in the current phase, in ms.
    elapsed: f64,
}

impl TrafficLight {
    /// Creates a controller at the start of the first group's all-red phase.
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            groups: config.mode.groups(),
            all_red: 1000.0 * config.all_red_s,
            green: 1000.0 * config.green(),
            yellow: 1000.0 * config.yellow_s,
            group: 0,
            phase: Phase::AllRed,
            elapsed: 0.0,
        }
    }

    /// The arms in the group currently being served.
    pub fn active_arms(&self) -> &[Arm] {
        self.groups
            .get(self.group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The time left in the current phase, in ms.
    pub fn phase_remaining(&self) -> f64 {
        f64::max(self.duration(self.phase) - self.elapsed, 0.0)
    }

    /// The length of one full cycle, in ms.
    pub fn cycle_length(&self) -> f64 {
        self.groups.len() as f64 * (self.all_red + self.green + self.yellow)
    }

    fn duration(&self, phase: Phase) -> f64 {
        match phase {
            Phase::AllRed => self.all_red,
            Phase::Green => self.green,
            Phase::Yellow => self.yellow,
        }
    }

    fn is_active(&self, arm: Arm) -> bool {
        self.active_arms().contains(&arm)
    }

    /// Moves to the next phase, or the next group's all-red phase.
    fn advance(&mut self) {
        match self.phase.next() {
            Some(phase) => self.phase = phase,
            None => {
                self.phase = Phase::AllRed;
                self.group = (self.group + 1) % self.groups.len().max(1);
            }
        }
    }

    /// The time until `arm` next turns green, in ms.
    fn time_until_green(&self, arm: Arm) -> f64 {
        let groups = self.groups.len();
        let mut time = self.phase_remaining();
        let (mut group, mut phase) = (self.group, self.phase);
        // Walk forward phase by phase; every arm is served once per cycle
        for _ in 0..3 * groups {
            match phase.next() {
                Some(next) => phase = next,
                None => {
                    phase = Phase::AllRed;
                    group = (group + 1) % groups.max(1);
                }
            }
            if phase == Phase::Green && self.groups[group].contains(&arm) {
                return time;
            }
            time += self.duration(phase);
        }
        time
    }
}

impl SignalState for TrafficLight {
    fn light(&self, arm: Arm) -> LightState {
        match self.phase {
            Phase::Green if self.is_active(arm) => LightState::Green,
            Phase::Yellow if self.is_active(arm) => LightState::Yellow,
            _ => LightState::Red,
        }
    }

    fn remaining(&self, arm: Arm) -> Option<f64> {
        if self.groups.is_empty() {
            return None;
        }
        match self.light(arm) {
            LightState::Green | LightState::Yellow => Some(self.phase_remaining()),
            LightState::Red => Some(self.time_until_green(arm)),
        }
    }

    fn step(&mut self, dt: f64) {
        if !(self.cycle_length() > 0.0) || !dt.is_finite() {
            return;
        }
        self.elapsed += dt;
        while self.elapsed >= self.duration(self.phase) {
            self.elapsed -= self.duration(self.phase);
            self.advance();
        }
    }
}

/// A signal whose colours are set from outside the simulation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FixedSignal {
    lights: ArmMap<LightState>,
    remaining: ArmMap<Option<f64>>,
}

impl FixedSignal {
    /// Shows the same colour to every arm.
    pub fn new(state: LightState) -> Self {
        Self {
            lights: ArmMap::from_fn(|_| state),
            remaining: ArmMap::default(),
        }
    }

    /// Sets the colour shown to one arm.
    pub fn with(mut self, arm: Arm, state: LightState) -> Self {
        self.set(arm, state);
        self
    }

    /// Sets the time left in one arm's colour, in ms.
    pub fn with_remaining(mut self, arm: Arm, remaining: f64) -> Self {
        self.remaining[arm] = Some(remaining);
        self
    }

    /// Changes the colour shown to one arm. Its remaining time becomes unknown.
    pub fn set(&mut self, arm: Arm, state: LightState) {
        self.lights[arm] = state;
        self.remaining[arm] = None;
    }
}

impl SignalState for FixedSignal {
    fn light(&self, arm: Arm) -> LightState {
        self.lights[arm]
    }

    fn remaining(&self, arm: Arm) -> Option<f64> {
        self.remaining[arm]
    }

    fn step(&mut self, dt: f64) {
        for arm in Arm::ALL {
            if let Some(left) = self.remaining[arm].as_mut() {
                *left = f64::max(*left - dt, 0.0);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PhaseMode;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn sequential_cycle() {
        let mut light = TrafficLight::new(&SignalConfig::default());
        assert_approx_eq!(light.cycle_length(), 120_000.0);
        assert_eq!(light.light(Arm::North), LightState::Red);

        // All red for 2 s, then north gets 25 s of green
        light.step(2000.0);
        assert_eq!(light.light(Arm::North), LightState::Green);
        assert_eq!(light.light(Arm::East), LightState::Red);
        assert_approx_eq!(light.remaining(Arm::North).unwrap(), 25_000.0);
        // East waits for the rest of north's green, its yellow and its own all-red
        assert_approx_eq!(light.remaining(Arm::East).unwrap(), 30_000.0);
        assert_approx_eq!(light.remaining(Arm::West).unwrap(), 90_000.0);

        light.step(25_000.0 + 1000.0);
        assert_eq!(light.light(Arm::North), LightState::Yellow);
        assert_approx_eq!(light.remaining(Arm::North).unwrap(), 2000.0);

        light.step(2000.0 + 2000.0);
        assert_eq!(light.light(Arm::North), LightState::Red);
        assert_eq!(light.light(Arm::East), LightState::Green);

        // A whole cycle later the same arm is served
        light.step(120_000.0);
        assert_eq!(light.light(Arm::East), LightState::Green);
    }

    #[test]
    fn opposing_arms_share_a_green() {
        let config = SignalConfig {
            mode: PhaseMode::Opposing,
            green_s: Some(10.0),
            ..Default::default()
        };
        let mut light = TrafficLight::new(&config);
        light.step(2500.0);
        assert_eq!(light.active_arms(), &[Arm::North, Arm::South]);
        assert_eq!(light.light(Arm::South), LightState::Green);
        assert_eq!(light.light(Arm::West), LightState::Red);

        light.step(10_000.0 + 3000.0 + 2000.0);
        assert_eq!(light.light(Arm::West), LightState::Green);
        assert_eq!(light.light(Arm::North), LightState::Red);
    }

    #[test]
    fn zero_length_cycles_do_not_hang() {
        let config = SignalConfig {
            green_s: Some(0.0),
            yellow_s: 0.0,
            all_red_s: 0.0,
            ..Default::default()
        };
        let mut light = TrafficLight::new(&config);
        light.step(1000.0);
        assert_eq!(light.phase(), Phase::AllRed);
    }

    #[test]
    fn fixed_signal() {
        let mut signal = FixedSignal::new(LightState::Red)
            .with(Arm::East, LightState::Yellow)
            .with_remaining(Arm::East, 500.0);
        assert_eq!(signal.light(Arm::North), LightState::Red);
        assert_eq!(signal.light(Arm::East), LightState::Yellow);
        signal.step(200.0);
        assert_approx_eq!(signal.remaining(Arm::East).unwrap(), 300.0);
        assert!(signal.remaining(Arm::North).is_none());
        signal.set(Arm::East, LightState::Red);
        assert!(signal.remaining(Arm::East).is_none());
    }
}
