//! Intersection arms, maneuvers and lane identifiers.

use crate::error::ParseError;
use crate::math::Vector2d;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// One of the four roads meeting at the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arm {
    North,
    East,
    South,
    West,
}

impl Arm {
    /// All arms, in clockwise order starting from north.
    pub const ALL: [Arm; 4] = [Arm::North, Arm::East, Arm::South, Arm::West];

    /// The position of the arm in clockwise order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The arm at the given clockwise position, modulo 4.
    pub fn from_index(idx: usize) -> Arm {
        Self::ALL[idx % 4]
    }

    /// The arm a vehicle arriving from this arm leaves by when performing `maneuver`.
    pub fn exit_for(self, maneuver: Maneuver) -> Arm {
        Self::from_index(self.index() + maneuver.rotation())
    }

    /// The arm across the intersection.
    pub fn opposite(self) -> Arm {
        self.exit_for(Maneuver::Straight)
    }

    /// Whether the arm runs north-south on screen.
    pub fn is_vertical(self) -> bool {
        matches!(self, Arm::North | Arm::South)
    }

    /// A unit vector in the direction of travel of vehicles arriving from this arm.
    pub fn inbound_dir(self) -> Vector2d {
        match self {
            Arm::North => Vector2d::new(0.0, 1.0),
            Arm::East => Vector2d::new(-1.0, 0.0),
            Arm::South => Vector2d::new(0.0, -1.0),
            Arm::West => Vector2d::new(1.0, 0.0),
        }
    }

    /// A unit vector in the direction of travel of vehicles leaving by this arm.
    pub fn outbound_dir(self) -> Vector2d {
        -self.inbound_dir()
    }

    pub fn name(self) -> &'static str {
        match self {
            Arm::North => "north",
            Arm::East => "east",
            Arm::South => "south",
            Arm::West => "west",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arm {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|arm| arm.name() == s)
            .ok_or_else(|| ParseError::Arm(s.to_string()))
    }
}

/// The movement a vehicle makes through the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maneuver {
    Left,
    Straight,
    Right,
}

impl Maneuver {
    pub const ALL: [Maneuver; 3] = [Maneuver::Left, Maneuver::Straight, Maneuver::Right];

    /// The number of clockwise quarter turns from the origin arm to the exit arm.
    fn rotation(self) -> usize {
        match self {
            Maneuver::Left => 1,
            Maneuver::Straight => 2,
            Maneuver::Right => 3,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Maneuver::Left => "left",
            Maneuver::Straight => "straight",
            Maneuver::Right => "right",
        }
    }
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The maneuvers permitted from a lane, as painted on its arrow marking.
///
/// Written as maneuver names joined by underscores, e.g. `left_straight`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ManeuverSet(u8);

impl ManeuverSet {
    /// A set containing a single maneuver.
    pub fn only(maneuver: Maneuver) -> Self {
        Self(maneuver.bit())
    }

    /// Returns true if the maneuver is permitted.
    pub fn contains(&self, maneuver: Maneuver) -> bool {
        self.0 & maneuver.bit() != 0
    }

    /// The permitted maneuvers, in left-to-right order.
    pub fn maneuvers(&self) -> SmallVec<[Maneuver; 3]> {
        Maneuver::ALL
            .into_iter()
            .filter(|m| self.contains(*m))
            .collect()
    }
}

impl Default for ManeuverSet {
    fn default() -> Self {
        Self::only(Maneuver::Straight)
    }
}

impl FromIterator<Maneuver> for ManeuverSet {
    fn from_iter<I: IntoIterator<Item = Maneuver>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, m| bits | m.bit()))
    }
}

impl FromStr for ManeuverSet {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = 0;
        for part in s.split('_') {
            let maneuver = Maneuver::ALL
                .into_iter()
                .find(|m| m.name() == part)
                .ok_or_else(|| ParseError::Maneuver(s.to_string()))?;
            bits |= maneuver.bit();
        }
        Ok(Self(bits))
    }
}

impl TryFrom<String> for ManeuverSet {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ManeuverSet> for String {
    fn from(set: ManeuverSet) -> Self {
        set.to_string()
    }
}

impl fmt::Display for ManeuverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.maneuvers().iter().map(|m| m.name()).collect::<Vec<_>>();
        f.write_str(&names.join("_"))
    }
}

impl fmt::Debug for ManeuverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManeuverSet({})", self)
    }
}

/// Identifies a lane on one arm, numbered from 1 starting at the centre line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LaneKey {
    pub arm: Arm,
    pub lane: u8,
}

impl LaneKey {
    pub const fn new(arm: Arm, lane: u8) -> Self {
        Self { arm, lane }
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.arm, self.lane)
    }
}

impl FromStr for LaneKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseError::LaneKey(s.to_string());
        let (arm, lane) = s.split_once('_').ok_or_else(malformed)?;
        Ok(Self {
            arm: arm.parse().map_err(|_| malformed())?,
            lane: lane.parse().map_err(|_| malformed())?,
        })
    }
}

impl TryFrom<String> for LaneKey {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LaneKey> for String {
    fn from(key: LaneKey) -> Self {
        key.to_string()
    }
}

/// One value for each arm of the intersection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmMap<T> {
    pub north: T,
    pub east: T,
    pub south: T,
    pub west: T,
}

impl<T> ArmMap<T> {
    /// Builds a map by evaluating `f` for every arm.
    pub fn from_fn(mut f: impl FnMut(Arm) -> T) -> Self {
        Self {
            north: f(Arm::North),
            east: f(Arm::East),
            south: f(Arm::South),
            west: f(Arm::West),
        }
    }

    /// Iterates over the arms and their values in clockwise order.
    pub fn iter(&self) -> impl Iterator<Item = (Arm, &T)> {
        Arm::ALL.into_iter().map(move |arm| (arm, &self[arm]))
    }
}

impl<T> std::ops::Index<Arm> for ArmMap<T> {
    type Output = T;

    fn index(&self, arm: Arm) -> &T {
        match arm {
            Arm::North => &self.north,
            Arm::East => &self.east,
            Arm::South => &self.south,
            Arm::West => &self.west,
        }
    }
}

impl<T> std::ops::IndexMut<Arm> for ArmMap<T> {
    fn index_mut(&mut self, arm: Arm) -> &mut T {
        match arm {
            Arm::North => &mut self.north,
            Arm::East => &mut self.east,
            Arm::South => &mut self.south,
            Arm::West => &mut self.west,
        }
    }
}
