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

//! `marty_wd1797` emulates the Western Digital WD1797 floppy disk controller.
//!
//! The controller is a tick-driven device. The host advances it with [Wd1797::run] (or implicitly
//! through [IoDevice] accesses that carry a [DeviceRunTimeUnit] delta), and observes it through
//! its registers and the INTRQ and DRQ pins. Media are presented as raw sector images that are
//! formatted into MFM or FM track streams, which rotate under the emulated head.
//!
//! [Wd1797::run]: devices::wd1797::Wd1797::run
//! [IoDevice]: bus::IoDevice
//! [DeviceRunTimeUnit]: bus::DeviceRunTimeUnit

pub mod bus;
pub mod config;
pub mod crc;
pub mod device_types;
pub mod devices;
pub mod history;

pub use config::ControllerConfig;
pub use devices::{
    floppy_medium::{FloppyMedium, MediumError},
    wd1797::{Wd1797, Wd1797DebugState},
};
