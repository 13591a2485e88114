//! Pan/tilt control commands
//!
//! The control channel recognizes exactly four literals. Matching is
//! case-sensitive; anything else is not a command.

use std::fmt;
use std::str::FromStr;

/// Distance a single command moves an axis
pub const STEP: i32 = 10;

/// Actuator axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Horizontal (pan)
    X,
    /// Vertical (tilt)
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("x"),
            Axis::Y => f.write_str("y"),
        }
    }
}

/// A recognized control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Top,
    Right,
    Left,
    Bottom,
}

impl Command {
    /// Axis moved by this command
    pub fn axis(self) -> Axis {
        match self {
            Command::Left | Command::Right => Axis::X,
            Command::Top | Command::Bottom => Axis::Y,
        }
    }

    /// Signed step applied to the axis
    pub fn delta(self) -> i32 {
        match self {
            Command::Top | Command::Right => STEP,
            Command::Left | Command::Bottom => -STEP,
        }
    }

    /// Wire literal of the command
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Top => "top",
            Command::Right => "right",
            Command::Left => "left",
            Command::Bottom => "bottom",
        }
    }
}

/// Returned when a message is not one of the four command literals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand;

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Command::Top),
            "right" => Ok(Command::Right),
            "left" => Ok(Command::Left),
            "bottom" => Ok(Command::Bottom),
            _ => Err(UnknownCommand),
        }
    }
}
