//! Two-axis pan/tilt mount controller.
//!
//! Each axis owns its own lock, so yaw and pitch commands run concurrently
//! while commands on the same axis are applied one at a time. The lock is
//! held across the actuator call, including scheduling its auto-disable.
//!
//! Direction convention follows the mount wiring and is fixed: `up`
//! decreases pitch, `down` increases it, `left` increases yaw and `right`
//! decreases it.
//!
//! There must be exactly one controller per process. Construct it once at
//! start-up and share it as `Arc<MountController>`.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use strum::{Display, EnumIter, EnumString};
use tracing::info;

use crate::actuator::AxisActuator;
use crate::config::{AxisBounds, MountConfig};
use crate::error::{ControlError, ControlResult};
use crate::gpio::LineDriver;

/// Directional step commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Current commanded angles of both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MountPosition {
    pub yaw: f64,
    pub pitch: f64,
}

struct Axis {
    name: &'static str,
    angle: f64,
    bounds: AxisBounds,
    actuator: AxisActuator,
}

impl Axis {
    /// Command `target` clamped into bounds; the stored angle only changes on success.
    fn move_to(&mut self, target: f64) -> ControlResult<f64> {
        let angle = self.bounds.clamp(target);
        self.actuator.set_angle(angle)?;
        self.angle = angle;
        Ok(angle)
    }
}

/// Owns the yaw and pitch actuators and serializes access to each.
pub struct MountController {
    yaw: Mutex<Axis>,
    pitch: Mutex<Axis>,
    step: f64,
}

impl MountController {
    /// Validate `config` and build both actuators.
    ///
    /// No line is opened until the first command.
    pub fn new(config: &MountConfig, driver: Arc<dyn LineDriver>) -> ControlResult<Self> {
        config.validate()?;

        let yaw = AxisActuator::new(
            driver.clone(),
            config.yaw_line,
            config.frequency_hz,
            config.settle_per_unit(),
        )?;
        let pitch = AxisActuator::new(
            driver,
            config.pitch_line,
            config.frequency_hz,
            config.settle_per_unit(),
        )?;

        Ok(Self {
            yaw: Mutex::new(Axis {
                name: "yaw",
                angle: config.initial_yaw,
                bounds: config.yaw_bounds,
                actuator: yaw,
            }),
            pitch: Mutex::new(Axis {
                name: "pitch",
                angle: config.initial_pitch,
                bounds: config.pitch_bounds,
                actuator: pitch,
            }),
            step: config.step,
        })
    }

    /// Default step size used when no override is given.
    pub fn step_size(&self) -> f64 {
        self.step
    }

    /// Tilt up: pitch decreases.
    pub fn up(&self, step: Option<f64>) -> ControlResult<f64> {
        self.step(Direction::Up, step)
    }

    /// Tilt down: pitch increases.
    pub fn down(&self, step: Option<f64>) -> ControlResult<f64> {
        self.step(Direction::Down, step)
    }

    /// Pan left: yaw increases.
    pub fn left(&self, step: Option<f64>) -> ControlResult<f64> {
        self.step(Direction::Left, step)
    }

    /// Pan right: yaw decreases.
    pub fn right(&self, step: Option<f64>) -> ControlResult<f64> {
        self.step(Direction::Right, step)
    }

    /// Move one axis by one step in `direction` and return its new angle.
    pub fn step(&self, direction: Direction, step: Option<f64>) -> ControlResult<f64> {
        let step = step.unwrap_or(self.step);
        if !step.is_finite() || step < 0.0 {
            return Err(ControlError::InvalidPosition {
                value: step,
                reason: "step must be a non-negative number",
            });
        }

        let (axis, delta) = match direction {
            Direction::Up => (&self.pitch, -step),
            Direction::Down => (&self.pitch, step),
            Direction::Left => (&self.yaw, step),
            Direction::Right => (&self.yaw, -step),
        };

        let mut axis = axis.lock().unwrap();
        let target = axis.angle + delta;
        let angle = axis.move_to(target)?;
        info!("{direction}: {} {angle}", axis.name);
        Ok(angle)
    }

    /// Command an absolute yaw angle, clamped into the yaw bounds.
    pub fn set_yaw(&self, angle: f64) -> ControlResult<f64> {
        Self::set_absolute(&self.yaw, angle)
    }

    /// Command an absolute pitch angle, clamped into the pitch bounds.
    pub fn set_pitch(&self, angle: f64) -> ControlResult<f64> {
        Self::set_absolute(&self.pitch, angle)
    }

    fn set_absolute(axis: &Mutex<Axis>, angle: f64) -> ControlResult<f64> {
        if !angle.is_finite() {
            return Err(ControlError::InvalidPosition {
                value: angle,
                reason: "angle must be a finite number",
            });
        }
        let mut axis = axis.lock().unwrap();
        let angle = axis.move_to(angle)?;
        info!("set {} {angle}", axis.name);
        Ok(angle)
    }

    pub fn position(&self) -> MountPosition {
        MountPosition {
            yaw: self.yaw.lock().unwrap().angle,
            pitch: self.pitch.lock().unwrap().angle,
        }
    }

    /// Switch both servos off immediately.
    pub fn release(&self) -> ControlResult<()> {
        let yaw = self.yaw.lock().unwrap().actuator.release();
        let pitch = self.pitch.lock().unwrap().actuator.release();
        yaw.and(pitch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::MockLineDriver;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn controller(config: MountConfig) -> (MockLineDriver, MountController) {
        let driver = MockLineDriver::new();
        let controller = MountController::new(&config, Arc::new(driver.clone())).unwrap();
        (driver, controller)
    }

    fn fast_config() -> MountConfig {
        MountConfig {
            settle_ms_per_unit: 1,
            ..MountConfig::default()
        }
    }

    #[test]
    fn test_direction_names() {
        let names: Vec<String> = Direction::iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec!["up", "down", "left", "right"]);
        assert_eq!(Direction::from_str("left").unwrap(), Direction::Left);
        assert!(Direction::from_str("sideways").is_err());
    }

    #[test]
    fn test_direction_convention() {
        let (_driver, mount) = controller(fast_config());
        assert_eq!(mount.up(None).unwrap(), 48.0);
        assert_eq!(mount.down(None).unwrap(), 50.0);
        assert_eq!(mount.left(None).unwrap(), 52.0);
        assert_eq!(mount.right(None).unwrap(), 50.0);
        mount.release().unwrap();
    }

    #[test]
    fn test_step_override() {
        let (_driver, mount) = controller(fast_config());
        assert_eq!(mount.left(Some(10.0)).unwrap(), 60.0);
        assert_eq!(mount.position().yaw, 60.0);
        assert!(matches!(
            mount.left(Some(-1.0)),
            Err(ControlError::InvalidPosition { .. })
        ));
        assert!(mount.left(Some(f64::INFINITY)).is_err());
        assert_eq!(mount.position().yaw, 60.0);
        mount.release().unwrap();
    }

    #[test]
    fn test_commands_drive_the_configured_lines() {
        let config = fast_config();
        let (driver, mount) = controller(config.clone());
        mount.up(None).unwrap();
        assert!(driver.is_claimed(config.pitch_line));
        assert!(!driver.is_claimed(config.yaw_line));

        mount.left(None).unwrap();
        assert!(driver.is_claimed(config.yaw_line));
        mount.release().unwrap();
        assert!(!driver.is_claimed(config.pitch_line));
        assert!(!driver.is_claimed(config.yaw_line));
    }

    #[test]
    fn test_failed_command_keeps_angle() {
        let config = fast_config();
        let (driver, mount) = controller(config.clone());
        driver.fail_line(config.yaw_line);

        assert!(matches!(
            mount.left(None),
            Err(ControlError::HardwareAccess { .. })
        ));
        assert_eq!(mount.position().yaw, 50.0);

        // The other axis is unaffected
        assert_eq!(mount.down(None).unwrap(), 52.0);
        mount.release().unwrap();
    }

    #[test]
    fn test_absolute_moves_are_clamped() {
        let config = MountConfig {
            yaw_bounds: AxisBounds {
                min: 20.0,
                max: 80.0,
            },
            ..fast_config()
        };
        let (_driver, mount) = controller(config);
        assert_eq!(mount.set_yaw(95.0).unwrap(), 80.0);
        assert_eq!(mount.set_yaw(5.0).unwrap(), 20.0);
        assert_eq!(mount.set_pitch(33.0).unwrap(), 33.0);
        assert!(mount.set_pitch(f64::NAN).is_err());
        assert_eq!(
            mount.position(),
            MountPosition {
                yaw: 20.0,
                pitch: 33.0
            }
        );
        mount.release().unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MountConfig {
            frequency_hz: -1.0,
            ..MountConfig::default()
        };
        let result = MountController::new(&config, Arc::new(MockLineDriver::new()));
        assert!(matches!(result, Err(ControlError::InvalidConfig(_))));
    }
}
