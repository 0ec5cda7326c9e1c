//! Hardware drivers for the pan/tilt camera mount.
//!
//! Servos are driven with software PWM on plain GPIO output lines, which
//! keeps the mount usable on boards without free hardware PWM channels.
//!
//! # Layers
//!
//! - [`gpio`] - output line abstraction, `gpiod` character-device driver and
//!   an in-memory mock
//! - [`pwm`] - [`PwmSignal`], a background-thread duty-cycle generator
//! - [`actuator`] - [`AxisActuator`], one servo with settle-time auto-disable
//! - [`mount`] - [`MountController`], the two-axis controller
//!
//! # Features
//!
//! - `gpiod` (default) - character-device GPIO driver (Linux only)
//! - `hardware-tests` - tests that toggle real GPIO lines

pub mod actuator;
pub mod config;
pub mod error;
pub mod gpio;
pub mod mount;
pub mod pwm;
pub mod timer;

pub use actuator::AxisActuator;
pub use config::{AxisBounds, MountArgs, MountConfig};
pub use error::{ControlError, ControlResult};
pub use mount::{Direction, MountController, MountPosition};
pub use pwm::{PwmSignal, PwmState};
pub use timer::DelayedTask;
