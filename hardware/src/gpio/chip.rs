//! GPIO character-device driver backed by `gpiod`.

use std::path::PathBuf;

use gpiod::{Chip, Lines, Options, Output};
use tracing::debug;

use super::{LineDriver, OutputLine};
use crate::error::{ControlError, ControlResult};

const CONSUMER: &str = "pantilt-pwm";

/// Opens single output lines on one GPIO chip.
#[derive(Debug, Clone)]
pub struct GpiodDriver {
    chip_path: PathBuf,
}

impl GpiodDriver {
    pub fn new(chip_path: impl Into<PathBuf>) -> Self {
        Self {
            chip_path: chip_path.into(),
        }
    }
}

impl LineDriver for GpiodDriver {
    fn open(&self, line: u32) -> ControlResult<Box<dyn OutputLine>> {
        let chip = Chip::new(&self.chip_path).map_err(|e| {
            ControlError::hardware(line, format!("{}: {e}", self.chip_path.display()))
        })?;

        let opts = Options::output([line]).values([false]).consumer(CONSUMER);
        let lines = chip
            .request_lines(opts)
            .map_err(|e| ControlError::hardware(line, e))?;

        debug!("Claimed line {} on {}", line, self.chip_path.display());
        Ok(Box::new(GpiodLine { line, lines }))
    }
}

struct GpiodLine {
    line: u32,
    lines: Lines<Output>,
}

impl OutputLine for GpiodLine {
    fn write(&mut self, high: bool) -> ControlResult<()> {
        self.lines
            .set_values([high])
            .map_err(|e| ControlError::hardware(self.line, e))
    }
}
