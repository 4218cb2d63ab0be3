/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! Controller configuration, deserialized from TOML.
//!
//! ```toml
//! io_base = 0xB0
//! clock = "Mhz1"
//! head_load_ms = 45.0
//! encoding = "Mfm"
//! ```

use crate::devices::floppy_medium::{TrackEncoding, TrackLayout, DEFAULT_GAP3};
use serde_derive::Deserialize;
use std::path::Path;
use strum_macros::{Display, EnumIter};

pub const DEFAULT_IO_BASE: u16 = 0xB0;
pub const DEFAULT_RPM: f64 = 300.0;
pub const DEFAULT_HEAD_LOAD_MS: f64 = 45.0;
pub const DEFAULT_CYLINDERS: u16 = 40;
pub const DEFAULT_SYSTEM_MHZ: f64 = 5.0;

const fn _default_true() -> bool {
    true
}
const fn _default_io_base() -> u16 {
    DEFAULT_IO_BASE
}
const fn _default_rpm() -> f64 {
    DEFAULT_RPM
}
const fn _default_head_load_ms() -> f64 {
    DEFAULT_HEAD_LOAD_MS
}
const fn _default_gap3() -> usize {
    DEFAULT_GAP3
}
const fn _default_cylinders() -> u16 {
    DEFAULT_CYLINDERS
}
const fn _default_system_mhz() -> f64 {
    DEFAULT_SYSTEM_MHZ
}

/// The chip's master clock. Step rates and the E, settling and verify delays are specified at
/// 1MHz and halve at 2MHz.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq, Display, EnumIter)]
pub enum ChipClock {
    #[default]
    Mhz1,
    Mhz2,
}

impl ChipClock {
    /// Scale factor applied to delays specified at 1MHz.
    pub fn delay_scale(&self) -> f64 {
        match self {
            ChipClock::Mhz1 => 1.0,
            ChipClock::Mhz2 => 0.5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ControllerConfig {
    #[serde(default = "_default_io_base")]
    pub io_base: u16,
    #[serde(default)]
    pub clock: ChipClock,
    /// Duration of the external head load timing one-shot. Drives call for 45 to 60ms.
    #[serde(default = "_default_head_load_ms")]
    pub head_load_ms: f64,
    #[serde(default = "_default_rpm")]
    pub rpm: f64,
    #[serde(default)]
    pub encoding: TrackEncoding,
    #[serde(default = "_default_gap3")]
    pub gap3: usize,
    /// Cylinder count of the attached drive, used when no medium is loaded.
    #[serde(default = "_default_cylinders")]
    pub cylinders: u16,
    /// Host clock used to convert `DeviceRunTimeUnit::SystemTicks` to microseconds.
    #[serde(default = "_default_system_mhz")]
    pub system_clock_mhz: f64,
    /// Accept track, sector and data register writes while a command is executing.
    #[serde(default = "_default_true")]
    pub permissive_busy_writes: bool,
    /// Assert INTRQ when a Type I command completes without verification.
    #[serde(default = "_default_true")]
    pub intrq_without_verify: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            io_base: DEFAULT_IO_BASE,
            clock: ChipClock::default(),
            head_load_ms: DEFAULT_HEAD_LOAD_MS,
            rpm: DEFAULT_RPM,
            encoding: TrackEncoding::default(),
            gap3: DEFAULT_GAP3,
            cylinders: DEFAULT_CYLINDERS,
            system_clock_mhz: DEFAULT_SYSTEM_MHZ,
            permissive_busy_writes: true,
            intrq_without_verify: true,
        }
    }
}

impl ControllerConfig {
    pub fn from_toml_str(toml_string: impl AsRef<str>) -> Result<Self, anyhow::Error> {
        let config: ControllerConfig = toml::from_str(toml_string.as_ref())?;
        if config.rpm <= 0.0 {
            return Err(anyhow::anyhow!("Invalid rpm: {}", config.rpm));
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let toml_string = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Couldn't read config file {}: {}", path.display(), e))?;
        log::debug!("Read controller config from {}", path.display());
        ControllerConfig::from_toml_str(toml_string)
    }

    /// Microseconds per disk revolution.
    pub fn rotation_us(&self) -> f64 {
        60_000_000.0 / self.rpm
    }

    /// The track layout media should be formatted with for this controller.
    pub fn track_layout(&self) -> TrackLayout {
        TrackLayout {
            encoding: self.encoding,
            track_len: (self.rotation_us() / self.encoding.byte_time_us()) as usize,
            gap3: self.gap3,
        }
    }
}
