//! Command-line control of the pan/tilt mount.
//!
//! Subcommands:
//! - `step`: Issue directional steps (up/down/left/right)
//! - `set`: Move to absolute yaw/pitch angles
//! - `pwm`: Drive a raw PWM waveform on one line for a while

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::{Direction, MountArgs, MountController, PwmSignal};
use tracing::info;

/// Pan/tilt mount control tool
#[derive(Parser, Debug)]
#[command(name = "mount_tool")]
#[command(about = "Drive the pan/tilt mount servos from the command line")]
#[command(version)]
struct Args {
    #[command(flatten)]
    mount: MountArgs,

    /// How long to keep the servos powered after the last command
    #[arg(long, global = true, default_value = "1000")]
    hold_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Step one axis in a direction
    Step {
        /// up, down, left or right
        direction: Direction,

        /// Number of steps to issue
        #[arg(short, long, default_value = "1")]
        count: u32,

        /// Step size override
        #[arg(short, long)]
        step: Option<f64>,

        /// Pause between steps in milliseconds
        #[arg(long, default_value = "50")]
        interval_ms: u64,
    },

    /// Move to absolute angles
    Set {
        #[arg(long)]
        yaw: Option<f64>,

        #[arg(long)]
        pitch: Option<f64>,
    },

    /// Generate a PWM waveform on a single line
    Pwm {
        /// GPIO line offset
        #[arg(short, long)]
        line: u32,

        /// Duty cycle in percent
        #[arg(short, long)]
        duty: f64,

        /// Seconds to run before stopping
        #[arg(short, long, default_value = "2")]
        seconds: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args.mount.to_config();
    let driver = args
        .mount
        .line_driver(&config)
        .context("Failed to set up GPIO driver")?;

    match args.command {
        Command::Step {
            direction,
            count,
            step,
            interval_ms,
        } => {
            let mount = MountController::new(&config, driver)?;
            for i in 0..count {
                let angle = mount.step(direction, step)?;
                info!("Step {}/{}: {direction} -> {angle}", i + 1, count);
                thread::sleep(Duration::from_millis(interval_ms));
            }
            hold_and_release(&mount, args.hold_ms)?;
        }
        Command::Set { yaw, pitch } => {
            if yaw.is_none() && pitch.is_none() {
                bail!("Nothing to do: pass --yaw and/or --pitch");
            }
            let mount = MountController::new(&config, driver)?;
            if let Some(yaw) = yaw {
                info!("Yaw -> {}", mount.set_yaw(yaw)?);
            }
            if let Some(pitch) = pitch {
                info!("Pitch -> {}", mount.set_pitch(pitch)?);
            }
            hold_and_release(&mount, args.hold_ms)?;
        }
        Command::Pwm {
            line,
            duty,
            seconds,
        } => {
            let mut pwm = PwmSignal::new(Arc::clone(&driver), line, config.frequency_hz)?;
            info!(
                "Driving line {line} at {duty}% / {} Hz for {seconds}s",
                config.frequency_hz
            );
            pwm.start(duty)?;
            thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
            pwm.stop()?;
        }
    }

    info!("Done");
    Ok(())
}

fn hold_and_release(mount: &MountController, hold_ms: u64) -> Result<()> {
    let position = mount.position();
    info!("Position: yaw={} pitch={}", position.yaw, position.pitch);
    thread::sleep(Duration::from_millis(hold_ms));
    mount.release()?;
    Ok(())
}
