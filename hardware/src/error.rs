//! Error type shared by the GPIO, PWM and mount drivers.

use thiserror::Error;

/// Errors raised while driving the pan/tilt mount.
///
/// Only structural failures end up here. Nothing in this crate retries a
/// failed line open; a busy or missing line is a configuration problem and is
/// surfaced to whoever issued the command.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Opening or writing a GPIO line failed (busy, permission, missing chip).
    #[error("Hardware access failed on line {line}: {reason}")]
    HardwareAccess {
        /// GPIO line offset on the chip
        line: u32,
        /// Human-readable cause
        reason: String,
    },

    /// A duty cycle or angle outside the range the driver accepts.
    #[error("Invalid position {value}: {reason}")]
    InvalidPosition {
        /// The rejected value
        value: f64,
        /// Which precondition was violated
        reason: &'static str,
    },

    /// PWM frequency that cannot produce a waveform.
    #[error("Invalid PWM frequency {0} Hz")]
    InvalidFrequency(f64),

    /// `start` called on a signal whose worker is still running.
    #[error("PWM on line {0} is already running")]
    AlreadyRunning(u32),

    /// Rejected mount configuration.
    #[error("Invalid mount configuration: {0}")]
    InvalidConfig(String),
}

impl ControlError {
    pub(crate) fn hardware(line: u32, reason: impl ToString) -> Self {
        Self::HardwareAccess {
            line,
            reason: reason.to_string(),
        }
    }
}

/// Result type for mount control operations.
pub type ControlResult<T> = Result<T, ControlError>;
