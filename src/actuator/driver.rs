//! Actuator drivers
//!
//! The servo hardware sits behind [`Actuator`]. Driving is fire-and-forget
//! from the control channel's point of view: errors are reported to the
//! caller for logging and never change the reply.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::protocol::Axis;

/// GPIO carrying the tilt (Y) servo signal
pub const DEFAULT_Y_GPIO: u8 = 17;

/// GPIO carrying the pan (X) servo signal
pub const DEFAULT_X_GPIO: u8 = 18;

/// Something that moves when an axis value changes
///
/// `drive` is synchronous and may block. It is called with the axis lock
/// held, from the blocking pool (see `ControlChannel::dispatch`).
pub trait Actuator: Send + Sync {
    /// Move `axis` to `value` (pulse width in microseconds)
    fn drive(&self, axis: Axis, value: i32) -> io::Result<()>;
}

/// Actuator that only logs, for running without servo hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn drive(&self, axis: Axis, value: i32) -> io::Result<()> {
        tracing::info!(axis = %axis, value = value, "Actuator moved");
        Ok(())
    }
}

/// Servo driver that writes pulse widths to a PWM device file
///
/// Each move writes one `"<gpio>=<value>us\n"` line, the format accepted by
/// servoblaster-style daemons.
#[derive(Debug, Clone)]
pub struct PwmDeviceActuator {
    path: PathBuf,
    x_gpio: u8,
    y_gpio: u8,
}

impl PwmDeviceActuator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            x_gpio: DEFAULT_X_GPIO,
            y_gpio: DEFAULT_Y_GPIO,
        }
    }

    /// Set the GPIO pins for the two axes
    pub fn pins(mut self, x_gpio: u8, y_gpio: u8) -> Self {
        self.x_gpio = x_gpio;
        self.y_gpio = y_gpio;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn gpio(&self, axis: Axis) -> u8 {
        match axis {
            Axis::X => self.x_gpio,
            Axis::Y => self.y_gpio,
        }
    }
}

impl Actuator for PwmDeviceActuator {
    fn drive(&self, axis: Axis, value: i32) -> io::Result<()> {
        let mut device = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(device, "{}={}us", self.gpio(axis), value)?;

        tracing::debug!(
            axis = %axis,
            gpio = self.gpio(axis),
            value = value,
            "Servo pulse width set"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_device(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "camrelay-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_pwm_device_lines() {
        let path = temp_device("pwm-lines");
        let actuator = PwmDeviceActuator::new(&path);

        actuator.drive(Axis::Y, 510).unwrap();
        actuator.drive(Axis::X, 490).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "17=510us\n18=490us\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_pwm_device_custom_pins() {
        let path = temp_device("pwm-pins");
        let actuator = PwmDeviceActuator::new(&path).pins(12, 13);

        actuator.drive(Axis::X, 600).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "12=600us\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_pwm_device_missing() {
        let actuator = PwmDeviceActuator::new("/nonexistent/servoblaster");

        assert!(actuator.drive(Axis::X, 500).is_err());
    }

    #[test]
    fn test_log_actuator() {
        assert!(LogActuator.drive(Axis::Y, 500).is_ok());
    }
}
