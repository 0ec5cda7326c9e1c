//! Mount configuration and its command-line surface.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::gpio::{LineDriver, MockLineDriver, DEFAULT_GPIO_CHIP};
use crate::pwm::MAX_DUTY_CYCLE;

/// Inclusive angle range an axis may be commanded to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

impl AxisBounds {
    pub const FULL: AxisBounds = AxisBounds {
        min: 0.0,
        max: MAX_DUTY_CYCLE,
    };

    pub fn clamp(&self, angle: f64) -> f64 {
        angle.clamp(self.min, self.max)
    }

    pub fn contains(&self, angle: f64) -> bool {
        (self.min..=self.max).contains(&angle)
    }

    fn validate(&self, axis: &str) -> ControlResult<()> {
        let in_range = |v: f64| v.is_finite() && AxisBounds::FULL.contains(v);
        if !in_range(self.min) || !in_range(self.max) || self.min > self.max {
            return Err(ControlError::InvalidConfig(format!(
                "{axis} bounds [{}, {}] must be an ordered range within [0, {MAX_DUTY_CYCLE}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl Default for AxisBounds {
    fn default() -> Self {
        Self::FULL
    }
}

/// Everything the mount controller needs to know about the hardware.
///
/// Defaults match the reference wiring: yaw servo on line 20, pitch servo on
/// line 9 of `/dev/gpiochip0`, 480 Hz PWM, 2 unit steps, 100 ms settle time
/// per unit of travel, both axes centred at 50.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub gpio_chip: String,
    pub yaw_line: u32,
    pub pitch_line: u32,
    pub frequency_hz: f64,
    pub step: f64,
    pub yaw_bounds: AxisBounds,
    pub pitch_bounds: AxisBounds,
    pub initial_yaw: f64,
    pub initial_pitch: f64,
    pub settle_ms_per_unit: u64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            gpio_chip: DEFAULT_GPIO_CHIP.to_string(),
            yaw_line: 20,
            pitch_line: 9,
            frequency_hz: 480.0,
            step: 2.0,
            yaw_bounds: AxisBounds::FULL,
            pitch_bounds: AxisBounds::FULL,
            initial_yaw: 50.0,
            initial_pitch: 50.0,
            settle_ms_per_unit: 100,
        }
    }
}

impl MountConfig {
    pub fn settle_per_unit(&self) -> Duration {
        Duration::from_millis(self.settle_ms_per_unit)
    }

    /// Reject configurations the controller cannot honour.
    pub fn validate(&self) -> ControlResult<()> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(ControlError::InvalidConfig(format!(
                "PWM frequency must be positive, got {}",
                self.frequency_hz
            )));
        }
        if !self.step.is_finite() || self.step < 0.0 {
            return Err(ControlError::InvalidConfig(format!(
                "step must be non-negative, got {}",
                self.step
            )));
        }
        if self.yaw_line == self.pitch_line {
            return Err(ControlError::InvalidConfig(format!(
                "yaw and pitch share GPIO line {}",
                self.yaw_line
            )));
        }

        self.yaw_bounds.validate("yaw")?;
        self.pitch_bounds.validate("pitch")?;

        if !self.yaw_bounds.contains(self.initial_yaw) {
            return Err(ControlError::InvalidConfig(format!(
                "initial yaw {} outside bounds",
                self.initial_yaw
            )));
        }
        if !self.pitch_bounds.contains(self.initial_pitch) {
            return Err(ControlError::InvalidConfig(format!(
                "initial pitch {} outside bounds",
                self.initial_pitch
            )));
        }
        Ok(())
    }
}

/// Command-line flags for the mount, flattened into binaries' `Args`.
#[derive(Args, Debug, Clone)]
pub struct MountArgs {
    /// GPIO character device the servos are wired to
    #[arg(long, default_value = DEFAULT_GPIO_CHIP)]
    pub gpio_chip: String,

    /// GPIO line driving the yaw (left/right) servo
    #[arg(long, default_value_t = 20)]
    pub yaw_line: u32,

    /// GPIO line driving the pitch (up/down) servo
    #[arg(long, default_value_t = 9)]
    pub pitch_line: u32,

    /// Software PWM frequency in Hz
    #[arg(long, default_value_t = 480.0)]
    pub pwm_frequency: f64,

    /// Angle change per directional command
    #[arg(long, default_value_t = 2.0)]
    pub step: f64,

    /// Milliseconds of settle time per unit of travel before the servo is released
    #[arg(long, default_value_t = 100)]
    pub settle_ms_per_unit: u64,

    /// Use in-memory GPIO lines instead of real hardware
    #[arg(long)]
    pub mock_gpio: bool,
}

impl MountArgs {
    pub fn to_config(&self) -> MountConfig {
        MountConfig {
            gpio_chip: self.gpio_chip.clone(),
            yaw_line: self.yaw_line,
            pitch_line: self.pitch_line,
            frequency_hz: self.pwm_frequency,
            step: self.step,
            settle_ms_per_unit: self.settle_ms_per_unit,
            ..MountConfig::default()
        }
    }

    /// Build the line driver selected by the flags.
    pub fn line_driver(&self, config: &MountConfig) -> ControlResult<Arc<dyn LineDriver>> {
        if self.mock_gpio {
            return Ok(Arc::new(MockLineDriver::new()));
        }
        hardware_driver(config)
    }
}

#[cfg(all(target_os = "linux", feature = "gpiod"))]
fn hardware_driver(config: &MountConfig) -> ControlResult<Arc<dyn LineDriver>> {
    Ok(Arc::new(crate::gpio::GpiodDriver::new(&config.gpio_chip)))
}

#[cfg(not(all(target_os = "linux", feature = "gpiod")))]
fn hardware_driver(config: &MountConfig) -> ControlResult<Arc<dyn LineDriver>> {
    Err(ControlError::InvalidConfig(format!(
        "no GPIO driver for {} in this build, use --mock-gpio",
        config.gpio_chip
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MountConfig::default();
        config.validate().unwrap();
        assert_eq!(config.settle_per_unit(), Duration::from_millis(100));
    }

    #[test]
    fn test_bounds_clamp() {
        let bounds = AxisBounds {
            min: 10.0,
            max: 90.0,
        };
        assert_eq!(bounds.clamp(5.0), 10.0);
        assert_eq!(bounds.clamp(95.0), 90.0);
        assert_eq!(bounds.clamp(42.0), 42.0);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = [
            MountConfig {
                frequency_hz: 0.0,
                ..Default::default()
            },
            MountConfig {
                step: -1.0,
                ..Default::default()
            },
            MountConfig {
                pitch_line: 20,
                ..Default::default()
            },
            MountConfig {
                yaw_bounds: AxisBounds {
                    min: 60.0,
                    max: 40.0,
                },
                ..Default::default()
            },
            MountConfig {
                pitch_bounds: AxisBounds {
                    min: 0.0,
                    max: 120.0,
                },
                ..Default::default()
            },
            MountConfig {
                initial_yaw: 95.0,
                yaw_bounds: AxisBounds {
                    min: 0.0,
                    max: 80.0,
                },
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ControlError::InvalidConfig(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MountConfig =
            serde_json::from_str(r#"{"yaw_line": 5, "pitch_bounds": {"min": 20, "max": 80}}"#)
                .unwrap();
        assert_eq!(config.yaw_line, 5);
        assert_eq!(config.pitch_line, 9);
        assert_eq!(config.pitch_bounds.min, 20.0);
        assert_eq!(config.step, 2.0);
    }
}
