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

//! The status register and the controller's pin signals.
//!
//! Status bits 1, 2, 4 and 5 have different meanings depending on whether the last command
//! was a Type I command (or a force interrupt) or a Type II/III command. Named setters are
//! provided for each meaning.

use modular_bitfield::bitfield;

#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusRegister {
    pub busy: bool,
    drq_index: bool,
    lost_data_track00: bool,
    pub crc_error: bool,
    rnf_seek_error: bool,
    record_type_head_loaded: bool,
    pub write_protect: bool,
    pub not_ready: bool,
}

impl Default for StatusRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegister {
    #[inline]
    pub fn byte(&self) -> u8 {
        self.into_bytes()[0]
    }

    /// Type I: index pulse.
    pub fn set_index(&mut self, state: bool) {
        self.set_drq_index(state);
    }
    /// Type II/III: data request.
    pub fn set_drq(&mut self, state: bool) {
        self.set_drq_index(state);
    }
    /// Type I: head at track 0.
    pub fn set_track00(&mut self, state: bool) {
        self.set_lost_data_track00(state);
    }
    /// Type II/III: host failed to service DRQ in time.
    pub fn set_lost_data(&mut self, state: bool) {
        self.set_lost_data_track00(state);
    }
    pub fn lost_data(&self) -> bool {
        self.lost_data_track00()
    }
    /// Type I: verify failed to find the track.
    pub fn set_seek_error(&mut self, state: bool) {
        self.set_rnf_seek_error(state);
    }
    pub fn seek_error(&self) -> bool {
        self.rnf_seek_error()
    }
    /// Type II/III: no matching ID field was found.
    pub fn set_record_not_found(&mut self, state: bool) {
        self.set_rnf_seek_error(state);
    }
    pub fn record_not_found(&self) -> bool {
        self.rnf_seek_error()
    }
    /// Type I: HLD and HLT both asserted.
    pub fn set_head_loaded(&mut self, state: bool) {
        self.set_record_type_head_loaded(state);
    }
    /// Read Sector: a deleted data mark was read.
    pub fn set_record_type(&mut self, state: bool) {
        self.set_record_type_head_loaded(state);
    }
    pub fn record_type(&self) -> bool {
        self.record_type_head_loaded()
    }

    /// Status reset on loading a Type I command.
    pub fn reset_type_i(&mut self) {
        self.set_busy(true);
        self.set_crc_error(false);
        self.set_seek_error(false);
        self.set_drq_index(false);
    }

    /// Status reset on loading a Type II or Type III command.
    pub fn reset_transfer(&mut self) {
        self.set_drq(false);
        self.set_lost_data(false);
        self.set_record_not_found(false);
        self.set_record_type(false);
        self.set_write_protect(false);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StepDirection {
    /// Toward track 0.
    #[default]
    Out,
    /// Toward the hub.
    In,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Pins {
    pub index_pulse: bool,
    pub ready: bool,
    pub tg43: bool,
    pub hld: bool,
    pub hlt: bool,
    pub not_track00: bool,
    pub direction: StepDirection,
    pub side_select: bool,
    pub drq: bool,
    pub intrq: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_positions() {
        let mut status = StatusRegister::new();
        status.set_busy(true);
        assert_eq!(status.byte(), 0x01);
        status.set_drq(true);
        assert_eq!(status.byte(), 0x03);
        status.set_lost_data(true);
        status.set_crc_error(true);
        status.set_record_not_found(true);
        status.set_record_type(true);
        status.set_write_protect(true);
        status.set_not_ready(true);
        assert_eq!(status.byte(), 0xFF);
    }

    #[test]
    fn test_type_i_reset_preserves_not_ready() {
        let mut status = StatusRegister::from_bytes([0xFF]);
        status.reset_type_i();
        assert_eq!(status.byte(), 0b1110_0101);
    }

    #[test]
    fn test_transfer_reset_preserves_crc() {
        let mut status = StatusRegister::from_bytes([0xFF]);
        status.reset_transfer();
        assert_eq!(status.byte(), 0b1000_1001);
    }
}
