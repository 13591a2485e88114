//! Pan/tilt actuator
//!
//! Shared axis state mutated by the control channel, and the drivers that
//! turn axis values into servo movement.

pub mod axis;
pub mod driver;

pub use axis::{AxisState, AXIS_HOME, AXIS_MAX, AXIS_MIN};
pub use driver::{Actuator, LogActuator, PwmDeviceActuator, DEFAULT_X_GPIO, DEFAULT_Y_GPIO};
