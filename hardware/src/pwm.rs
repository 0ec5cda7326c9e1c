//! Software PWM on a single GPIO output line.
//!
//! A background thread repeatedly drives the line HIGH for `duty/100` of the
//! period and LOW for the remainder. The duty cycle can be changed while the
//! worker runs and is picked up at the next cycle boundary. The frequency is
//! captured when the worker starts, so [`PwmSignal::change_frequency`] only
//! affects the next [`PwmSignal::start`].
//!
//! # Lifecycle
//!
//! ```text
//!          start                 stop
//!   Idle ────────▶ Running ────────────▶ Stopping ──▶ Idle
//!     ▲                │  (worker exits       │
//!     │                │   on write failure)  │
//!     │                └────────▶ Stopping ───┘ (reaped by stop or start)
//! ```
//!
//! The worker owns the line while it runs. `stop` wakes the worker, waits for
//! it to hand the line back, drives it LOW and then releases it, so the line
//! is never closed while the worker may still write to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{ControlError, ControlResult};
use crate::gpio::{LineDriver, OutputLine};

/// Duty cycle that holds the line HIGH for the whole period.
pub const MAX_DUTY_CYCLE: f64 = 100.0;

/// Observable state of a [`PwmSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmState {
    /// No worker, line released.
    Idle,
    /// Worker is generating the waveform.
    Running,
    /// Worker has exited or been asked to, line not yet released.
    Stopping,
}

/// HIGH and LOW durations of one period for a duty cycle and frequency.
pub fn phase_durations(duty_cycle: f64, frequency_hz: f64) -> (Duration, Duration) {
    let slice = 1.0 / frequency_hz / MAX_DUTY_CYCLE;
    (
        Duration::from_secs_f64(duty_cycle * slice),
        Duration::from_secs_f64((MAX_DUTY_CYCLE - duty_cycle) * slice),
    )
}

pub(crate) fn validate_duty_cycle(duty_cycle: f64) -> ControlResult<()> {
    if !duty_cycle.is_finite() || !(0.0..=MAX_DUTY_CYCLE).contains(&duty_cycle) {
        return Err(ControlError::InvalidPosition {
            value: duty_cycle,
            reason: "duty cycle must be within [0, 100]",
        });
    }
    Ok(())
}

pub(crate) fn validate_frequency(frequency_hz: f64) -> ControlResult<()> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return Err(ControlError::InvalidFrequency(frequency_hz));
    }
    Ok(())
}

/// State shared between a [`PwmSignal`] and its worker for one run.
struct Control {
    duty_bits: AtomicU64,
    stop: Mutex<bool>,
    wake: Condvar,
}

impl Control {
    fn new(duty_cycle: f64) -> Self {
        Self {
            duty_bits: AtomicU64::new(duty_cycle.to_bits()),
            stop: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn duty_cycle(&self) -> f64 {
        f64::from_bits(self.duty_bits.load(Ordering::Acquire))
    }

    fn set_duty_cycle(&self, duty_cycle: f64) {
        self.duty_bits.store(duty_cycle.to_bits(), Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        *self.stop.lock().unwrap()
    }

    fn request_stop(&self) {
        *self.stop.lock().unwrap() = true;
        self.wake.notify_all();
    }

    /// Block for `duration` or until a stop is requested.
    ///
    /// Returns `true` if the worker should exit.
    fn suspend(&self, duration: Duration) -> bool {
        let guard = self.stop.lock().unwrap();
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, duration, |stop| !*stop)
            .unwrap();
        *guard
    }
}

struct Run {
    control: Arc<Control>,
    worker: JoinHandle<Box<dyn OutputLine>>,
}

/// Duty-cycle waveform generator bound to one output line.
pub struct PwmSignal {
    line: u32,
    frequency_hz: f64,
    duty_cycle: f64,
    driver: Arc<dyn LineDriver>,
    run: Option<Run>,
}

impl PwmSignal {
    /// Create an idle signal. The line is not opened until [`start`](Self::start).
    pub fn new(driver: Arc<dyn LineDriver>, line: u32, frequency_hz: f64) -> ControlResult<Self> {
        validate_frequency(frequency_hz)?;
        Ok(Self {
            line,
            frequency_hz,
            duty_cycle: 0.0,
            driver,
            run: None,
        })
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Frequency the next run will use.
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    /// Most recently requested duty cycle.
    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn state(&self) -> PwmState {
        match &self.run {
            None => PwmState::Idle,
            Some(run) if run.worker.is_finished() || run.control.stop_requested() => {
                PwmState::Stopping
            }
            Some(_) => PwmState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PwmState::Running
    }

    /// Open the line and start generating the waveform.
    ///
    /// A signal left in [`PwmState::Stopping`] is reaped first. Fails with
    /// [`ControlError::AlreadyRunning`] if the worker is still active, and
    /// with [`ControlError::HardwareAccess`] if the line cannot be opened.
    pub fn start(&mut self, duty_cycle: f64) -> ControlResult<()> {
        validate_duty_cycle(duty_cycle)?;
        match self.state() {
            PwmState::Running => return Err(ControlError::AlreadyRunning(self.line)),
            PwmState::Stopping => self.stop()?,
            PwmState::Idle => {}
        }

        let line = self.driver.open(self.line)?;
        let control = Arc::new(Control::new(duty_cycle));
        let worker_control = control.clone();
        let frequency_hz = self.frequency_hz;
        let line_id = self.line;

        let worker = thread::Builder::new()
            .name(format!("pwm-line-{line_id}"))
            .spawn(move || drive(line, line_id, frequency_hz, worker_control))
            .map_err(|e| ControlError::hardware(line_id, e))?;

        debug!(
            "PWM started on line {}: {:.1}% at {} Hz",
            self.line, duty_cycle, self.frequency_hz
        );
        self.duty_cycle = duty_cycle;
        self.run = Some(Run { control, worker });
        Ok(())
    }

    /// Change the duty cycle; a running worker applies it at the next period.
    pub fn change_duty_cycle(&mut self, duty_cycle: f64) -> ControlResult<()> {
        validate_duty_cycle(duty_cycle)?;
        self.duty_cycle = duty_cycle;
        if let Some(run) = &self.run {
            run.control.set_duty_cycle(duty_cycle);
        }
        Ok(())
    }

    /// Change the frequency used by the next [`start`](Self::start).
    pub fn change_frequency(&mut self, frequency_hz: f64) -> ControlResult<()> {
        validate_frequency(frequency_hz)?;
        self.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Stop the worker, drive the line LOW and release it.
    ///
    /// Blocks until the worker has exited. A no-op on an idle signal.
    pub fn stop(&mut self) -> ControlResult<()> {
        let Some(run) = self.run.take() else {
            return Ok(());
        };

        run.control.request_stop();
        let mut line = run
            .worker
            .join()
            .map_err(|_| ControlError::hardware(self.line, "PWM worker panicked"))?;

        let result = line.write(false);
        drop(line);
        debug!("PWM stopped on line {}", self.line);
        result
    }
}

impl Drop for PwmSignal {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop PWM on line {}: {e}", self.line);
        }
    }
}

fn drive(
    mut line: Box<dyn OutputLine>,
    line_id: u32,
    frequency_hz: f64,
    control: Arc<Control>,
) -> Box<dyn OutputLine> {
    while !control.stop_requested() {
        let duty_cycle = control.duty_cycle();
        let (high, low) = phase_durations(duty_cycle, frequency_hz);

        if duty_cycle > 0.0 {
            if let Err(e) = line.write(true) {
                error!("PWM worker on line {line_id} exiting: {e}");
                break;
            }
            if control.suspend(high) {
                break;
            }
        }

        if duty_cycle < MAX_DUTY_CYCLE {
            if let Err(e) = line.write(false) {
                error!("PWM worker on line {line_id} exiting: {e}");
                break;
            }
            if control.suspend(low) {
                break;
            }
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::MockLineDriver;
    use approx::assert_relative_eq;
    use std::time::Instant;

    const LINE: u32 = 7;

    fn signal(frequency_hz: f64) -> (MockLineDriver, PwmSignal) {
        let driver = MockLineDriver::new();
        let pwm = PwmSignal::new(Arc::new(driver.clone()), LINE, frequency_hz).unwrap();
        (driver, pwm)
    }

    #[test]
    fn test_phase_durations() {
        let (high, low) = phase_durations(25.0, 1.0);
        assert_relative_eq!(high.as_secs_f64(), 0.25, epsilon = 1e-9);
        assert_relative_eq!(low.as_secs_f64(), 0.75, epsilon = 1e-9);

        let (high, low) = phase_durations(50.0, 480.0);
        assert_relative_eq!(high.as_secs_f64(), 0.5 / 480.0, epsilon = 1e-9);
        assert_relative_eq!(low.as_secs_f64(), 0.5 / 480.0, epsilon = 1e-9);

        let (high, low) = phase_durations(0.0, 100.0);
        assert_eq!(high, Duration::ZERO);
        assert_relative_eq!(low.as_secs_f64(), 0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_start_claims_line_and_stop_releases_it() {
        let (driver, mut pwm) = signal(1000.0);
        assert_eq!(pwm.state(), PwmState::Idle);
        assert!(!driver.is_claimed(LINE));

        pwm.start(50.0).unwrap();
        assert_eq!(pwm.state(), PwmState::Running);
        assert!(driver.is_claimed(LINE));

        pwm.stop().unwrap();
        assert_eq!(pwm.state(), PwmState::Idle);
        assert!(!driver.is_claimed(LINE));
        assert!(!driver.level(LINE));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (driver, mut pwm) = signal(1000.0);
        pwm.stop().unwrap();

        pwm.start(30.0).unwrap();
        pwm.stop().unwrap();
        pwm.stop().unwrap();
        assert!(!driver.is_claimed(LINE));
        assert_eq!(driver.open_count(LINE), 1);
    }

    #[test]
    fn test_zero_duty_never_drives_high() {
        let (driver, mut pwm) = signal(1000.0);
        pwm.start(0.0).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(driver.high_writes(LINE), 0);
        assert!(driver.low_writes(LINE) > 0);
        pwm.stop().unwrap();
        assert_eq!(driver.high_writes(LINE), 0);
    }

    #[test]
    fn test_full_duty_never_drives_low_while_running() {
        let (driver, mut pwm) = signal(1000.0);
        pwm.start(100.0).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(driver.high_writes(LINE) > 0);
        assert_eq!(driver.low_writes(LINE), 0);

        // Only the release on stop drives the line LOW.
        pwm.stop().unwrap();
        assert_eq!(driver.low_writes(LINE), 1);
        assert!(!driver.level(LINE));
    }

    #[test]
    fn test_duty_cycle_change_applies_without_restart() {
        let (driver, mut pwm) = signal(1000.0);
        pwm.start(0.0).unwrap();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(driver.high_writes(LINE), 0);

        pwm.change_duty_cycle(100.0).unwrap();
        thread::sleep(Duration::from_millis(10));
        assert!(driver.high_writes(LINE) > 0);
        assert_eq!(driver.open_count(LINE), 1);
        assert_eq!(pwm.duty_cycle(), 100.0);
        pwm.stop().unwrap();
    }

    #[test]
    fn test_waveform_timing() {
        // 50 Hz, 25% duty: 5 ms HIGH, 15 ms LOW
        let (driver, mut pwm) = signal(50.0);
        pwm.start(25.0).unwrap();
        thread::sleep(Duration::from_millis(130));
        pwm.stop().unwrap();

        let changes = driver.changes(LINE);
        let mut high_phases = Vec::new();
        let mut low_phases = Vec::new();
        // The last recorded phase may have been cut short by stop
        let windows: Vec<_> = changes.windows(2).collect();
        for pair in &windows[..windows.len().saturating_sub(1)] {
            let elapsed = pair[1].at - pair[0].at;
            if pair[0].high {
                high_phases.push(elapsed);
            } else {
                low_phases.push(elapsed);
            }
        }

        assert!(high_phases.len() >= 3, "too few periods: {changes:?}");
        assert!(!low_phases.is_empty());
        for high in &high_phases {
            assert!(*high >= Duration::from_millis(5), "HIGH too short: {high:?}");
        }
        for low in &low_phases {
            assert!(*low >= Duration::from_millis(15), "LOW too short: {low:?}");
        }

        let mean = |phases: &[Duration]| {
            phases.iter().sum::<Duration>().as_secs_f64() / phases.len() as f64
        };
        assert!(mean(&high_phases) < mean(&low_phases));
    }

    #[test]
    fn test_stop_interrupts_long_period() {
        // 0.5 Hz gives a 1 s HIGH phase at 50%
        let (_driver, mut pwm) = signal(0.5);
        pwm.start(50.0).unwrap();
        thread::sleep(Duration::from_millis(10));

        let start = Instant::now();
        pwm.stop().unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let (_driver, mut pwm) = signal(1000.0);
        pwm.start(10.0).unwrap();
        assert!(matches!(
            pwm.start(20.0),
            Err(ControlError::AlreadyRunning(LINE))
        ));
        pwm.stop().unwrap();
    }

    #[test]
    fn test_invalid_duty_cycle_rejected() {
        let (driver, mut pwm) = signal(1000.0);
        assert!(matches!(
            pwm.start(101.0),
            Err(ControlError::InvalidPosition { .. })
        ));
        assert!(pwm.start(f64::NAN).is_err());
        assert!(pwm.change_duty_cycle(-1.0).is_err());
        assert_eq!(driver.open_count(LINE), 0);
    }

    #[test]
    fn test_invalid_frequency_rejected() {
        let driver: Arc<dyn LineDriver> = Arc::new(MockLineDriver::new());
        assert!(matches!(
            PwmSignal::new(driver.clone(), LINE, 0.0),
            Err(ControlError::InvalidFrequency(_))
        ));

        let mut pwm = PwmSignal::new(driver, LINE, 100.0).unwrap();
        assert!(pwm.change_frequency(-5.0).is_err());
        assert_eq!(pwm.frequency_hz(), 100.0);
    }

    #[test]
    fn test_frequency_change_applies_on_next_start() {
        let (_driver, mut pwm) = signal(1000.0);
        pwm.start(50.0).unwrap();
        pwm.change_frequency(200.0).unwrap();
        assert_eq!(pwm.frequency_hz(), 200.0);
        assert!(pwm.is_running());

        pwm.stop().unwrap();
        pwm.start(50.0).unwrap();
        assert_eq!(pwm.frequency_hz(), 200.0);
        pwm.stop().unwrap();
    }

    #[test]
    fn test_open_failure_surfaces_from_start() {
        let (driver, mut pwm) = signal(1000.0);
        driver.fail_line(LINE);
        assert!(matches!(
            pwm.start(50.0),
            Err(ControlError::HardwareAccess { line: LINE, .. })
        ));
        assert_eq!(pwm.state(), PwmState::Idle);
    }

    #[test]
    fn test_write_failure_leaves_stopping_then_restart_reaps() {
        let (driver, mut pwm) = signal(1000.0);
        pwm.start(50.0).unwrap();
        driver.set_write_failure(LINE, true);

        let deadline = Instant::now() + Duration::from_secs(2);
        while pwm.state() != PwmState::Stopping && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(pwm.state(), PwmState::Stopping);
        assert!(driver.is_claimed(LINE));

        driver.set_write_failure(LINE, false);
        pwm.start(60.0).unwrap();
        assert_eq!(pwm.state(), PwmState::Running);
        assert_eq!(driver.open_count(LINE), 2);
        pwm.stop().unwrap();
    }

    #[test]
    fn test_drop_releases_line() {
        let (driver, mut pwm) = signal(1000.0);
        pwm.start(50.0).unwrap();
        drop(pwm);
        assert!(!driver.is_claimed(LINE));
    }
}
