//! Shared pan/tilt axis state
//!
//! Both axes live behind one mutex so concurrent control connections cannot
//! lose updates. A step is applied only while the current value lies strictly
//! inside `(AXIS_MIN, AXIS_MAX)`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::protocol::Axis;

/// Lower bound (exclusive) for applying a step
pub const AXIS_MIN: i32 = 300;

/// Upper bound (exclusive) for applying a step
pub const AXIS_MAX: i32 = 700;

/// Value both axes start at
pub const AXIS_HOME: i32 = 500;

#[derive(Debug, Clone, Copy)]
struct AxisValues {
    x: i32,
    y: i32,
}

impl AxisValues {
    fn get_mut(&mut self, axis: Axis) -> &mut i32 {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
        }
    }
}

/// Process-wide actuator position
#[derive(Debug)]
pub struct AxisState {
    values: Mutex<AxisValues>,
}

impl AxisState {
    /// Both axes at [`AXIS_HOME`]
    pub fn new() -> Self {
        Self::with_values(AXIS_HOME, AXIS_HOME)
    }

    pub fn with_values(x: i32, y: i32) -> Self {
        Self {
            values: Mutex::new(AxisValues { x, y }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AxisValues> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value of an axis
    pub fn value(&self, axis: Axis) -> i32 {
        *self.lock().get_mut(axis)
    }

    /// Apply `delta` to an axis if it is strictly inside the bounds
    ///
    /// Read, check and write happen under one lock. Returns the new value,
    /// or `None` if the axis was at or beyond a bound and nothing changed.
    pub fn adjust(&self, axis: Axis, delta: i32) -> Option<i32> {
        self.adjust_with(axis, delta, |_| {})
    }

    /// Like [`adjust`](Self::adjust), running `on_change` with the new value
    /// before the lock is released
    ///
    /// Concurrent callers see their `on_change` calls in the same order as
    /// their updates, so whatever `on_change` drives ends at the stored value.
    pub fn adjust_with<F>(&self, axis: Axis, delta: i32, on_change: F) -> Option<i32>
    where
        F: FnOnce(i32),
    {
        let mut values = self.lock();
        let value = values.get_mut(axis);

        if *value > AXIS_MIN && *value < AXIS_MAX {
            *value += delta;
            let updated = *value;
            on_change(updated);
            Some(updated)
        } else {
            None
        }
    }
}

impl Default for AxisState {
    fn default() -> Self {
        Self::new()
    }
}
