//! Single-axis servo actuator driven by software PWM.
//!
//! Hobby-class servos only need a signal while they travel. After each
//! command the actuator estimates how long the move takes and switches its
//! PWM off once that time has passed; the next command turns it back on.
//!
//! The auto-disable runs on a [`DelayedTask`]. A new command cancels the
//! pending one before touching the signal, and every command bumps a
//! generation counter that the task re-checks under the drive lock, so a
//! disable scheduled for an older command can never stop a newer one.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ControlError, ControlResult};
use crate::gpio::LineDriver;
use crate::pwm::{validate_duty_cycle, validate_frequency, PwmSignal};
use crate::timer::{self, DelayedTask};

/// Travel assumed for the first command, when the current position is unknown.
pub const FIRST_MOVE_SPAN: f64 = 180.0;

/// Time to wait before disabling the signal after moving from `previous` to `angle`.
pub fn settle_delay(previous: Option<f64>, angle: f64, per_unit: Duration) -> Duration {
    let span = match previous {
        Some(previous) => (previous - angle).abs(),
        None => FIRST_MOVE_SPAN,
    };
    per_unit.mul_f64(span)
}

struct Drive {
    pwm: Option<PwmSignal>,
    generation: u64,
}

/// One servo axis on one output line.
pub struct AxisActuator {
    line: u32,
    frequency_hz: f64,
    settle_per_unit: Duration,
    driver: Arc<dyn LineDriver>,
    drive: Arc<Mutex<Drive>>,
    angle: Option<f64>,
    pending_disable: Option<DelayedTask>,
    timer_thread: fn() -> thread::Builder,
}

impl AxisActuator {
    pub fn new(
        driver: Arc<dyn LineDriver>,
        line: u32,
        frequency_hz: f64,
        settle_per_unit: Duration,
    ) -> ControlResult<Self> {
        validate_frequency(frequency_hz)?;
        Ok(Self {
            line,
            frequency_hz,
            settle_per_unit,
            driver,
            drive: Arc::new(Mutex::new(Drive {
                pwm: None,
                generation: 0,
            })),
            angle: None,
            pending_disable: None,
            timer_thread: timer::thread_builder,
        })
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Last successfully commanded angle, `None` before the first command.
    pub fn angle(&self) -> Option<f64> {
        self.angle
    }

    /// Whether the PWM signal is currently on.
    pub fn is_driving(&self) -> bool {
        let drive = self.drive.lock().unwrap();
        drive.pwm.as_ref().is_some_and(PwmSignal::is_running)
    }

    /// Command a new angle (duty cycle in `[0, 100]`).
    ///
    /// Starts the signal if it is off, otherwise updates its duty cycle, then
    /// schedules the auto-disable. Returns the scheduled settle delay.
    pub fn set_angle(&mut self, angle: f64) -> ControlResult<Duration> {
        validate_duty_cycle(angle)?;

        if let Some(task) = self.pending_disable.take() {
            task.cancel();
        }

        let generation = {
            let mut drive = self.drive.lock().unwrap();
            let mut pwm = match drive.pwm.take() {
                Some(pwm) => pwm,
                None => PwmSignal::new(self.driver.clone(), self.line, self.frequency_hz)?,
            };

            let result = if pwm.is_running() {
                pwm.change_duty_cycle(angle)
            } else {
                pwm.start(angle)
            };
            drive.pwm = Some(pwm);
            result?;

            drive.generation += 1;
            drive.generation
        };

        let delay = settle_delay(self.angle, angle, self.settle_per_unit);

        let drive = self.drive.clone();
        let line = self.line;
        let scheduled = DelayedTask::schedule_on((self.timer_thread)(), delay, move || {
            let mut drive = drive.lock().unwrap();
            if drive.generation != generation {
                debug!("Skipping stale auto-disable on line {line}");
                return;
            }
            if let Some(pwm) = drive.pwm.as_mut() {
                match pwm.stop() {
                    Ok(()) => debug!("Auto-disabled line {line}"),
                    Err(e) => warn!("Auto-disable on line {line} failed: {e}"),
                }
            }
        });

        // Without an auto-disable the servo would stay powered, so switch it off now
        let task = match scheduled {
            Ok(task) => task,
            Err(e) => {
                let mut drive = self.drive.lock().unwrap();
                drive.generation += 1;
                if let Some(pwm) = drive.pwm.as_mut() {
                    if let Err(stop_err) = pwm.stop() {
                        warn!("Stopping line {line} failed: {stop_err}");
                    }
                }
                return Err(ControlError::hardware(
                    line,
                    format!("cannot schedule auto-disable: {e}"),
                ));
            }
        };

        self.angle = Some(angle);
        self.pending_disable = Some(task);

        Ok(delay)
    }

    /// Cancel any pending auto-disable and switch the signal off now.
    pub fn release(&mut self) -> ControlResult<()> {
        if let Some(task) = self.pending_disable.take() {
            task.cancel();
        }
        let mut drive = self.drive.lock().unwrap();
        drive.generation += 1;
        match drive.pwm.as_mut() {
            Some(pwm) => pwm.stop(),
            None => Ok(()),
        }
    }
}
