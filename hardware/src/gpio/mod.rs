//! Digital output lines.
//!
//! The PWM generator only ever needs to open a line, drive it HIGH or LOW and
//! release it again. Those three operations are abstracted here so the timing
//! code can run against real character-device GPIO on the target board and
//! against recorded in-memory lines in tests.

#[cfg(all(target_os = "linux", feature = "gpiod"))]
mod chip;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "gpiod"))]
pub use chip::GpiodDriver;
pub use mock::{LevelChange, MockLineDriver};

use crate::error::ControlResult;

/// Default GPIO character device on single-board computers.
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

/// A claimed output line.
///
/// The line stays claimed until the handle is dropped.
pub trait OutputLine: Send {
    /// Drive the line HIGH (`true`) or LOW (`false`).
    fn write(&mut self, high: bool) -> ControlResult<()>;
}

/// Something that can hand out exclusive output lines.
pub trait LineDriver: Send + Sync {
    /// Claim `line` as an output, initially LOW.
    ///
    /// Fails with [`ControlError::HardwareAccess`](crate::ControlError::HardwareAccess)
    /// if the line is already claimed or the chip cannot be opened.
    fn open(&self, line: u32) -> ControlResult<Box<dyn OutputLine>>;
}
