use std::path::Path;

use anyhow::{Context, Result, ensure};
use gpio_cdev::{Chip, LineRequestFlags, MultiLineHandle};
use tracing::debug;

use crate::control_panel::{GrayCodeRing, RotarySource, pack_levels};

const CONSUMER: &str = "duna-rotary";

/// Rotary encoder wired to GPIO lines, read through the character device.
///
/// Pull-ups and debouncing are expected to be handled by the board (or the
/// device tree overlay); lines are requested as plain inputs.
pub struct GpioRotary {
    lines: MultiLineHandle,
    ring: GrayCodeRing,
}

impl GpioRotary {
    pub fn open(chip: &Path, pins: &[u32], sequence: Option<Vec<u32>>) -> Result<Self> {
        ensure!(!pins.is_empty(), "rotary encoder needs at least one pin");
        let mut chip =
            Chip::new(chip).with_context(|| format!("opening GPIO chip {}", chip.display()))?;
        let lines = chip
            .get_lines(pins)
            .with_context(|| format!("getting rotary lines {pins:?}"))?
            .request(LineRequestFlags::INPUT, &vec![0; pins.len()], CONSUMER)
            .context("requesting rotary lines as inputs")?;
        let ring = GrayCodeRing::new(pins.len() as u32, sequence);
        debug!(?pins, ring_size = ring.ring_size(), "rotary lines requested");
        Ok(Self { lines, ring })
    }
}

impl RotarySource for GpioRotary {
    fn read(&mut self) -> Result<u32> {
        let levels = self.lines.get_values().context("reading rotary lines")?;
        Ok(self.ring.translate(pack_levels(&levels))?)
    }

    fn ring_size(&self) -> u32 {
        self.ring.ring_size()
    }
}
