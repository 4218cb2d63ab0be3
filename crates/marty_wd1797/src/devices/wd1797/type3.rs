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

    devices::wd1797::type3.rs

    Type III commands: READ ADDRESS, READ TRACK and WRITE TRACK.
*/

use super::{search::SearchEvent, Phase, Wd1797};

/// Bytes WRITE TRACK waits for the host to supply the first byte.
const WRITE_TRACK_FIRST_BYTE_WAIT: usize = 3;

impl Wd1797 {
    pub(super) fn track_byte(&mut self, offset: usize, byte: u8) {
        match self.phase {
            Phase::SearchId => {
                if self.search_expired(offset) {
                    return;
                }
                if let SearchEvent::IdMark = self.search.feed(byte) {
                    self.phase = Phase::ReadAddress { count: 0 };
                }
            }
            Phase::ReadAddress { count } => {
                self.read_transfer_byte(byte);
                match self.search.feed(byte) {
                    SearchEvent::IdField(id) => {
                        self.status.set_crc_error(!id.crc_valid);
                        // The track address is copied into the sector register.
                        self.sector = id.track;
                        self.crc = id.crc;
                        self.complete_command(true);
                    }
                    _ => self.phase = Phase::ReadAddress { count: count + 1 },
                }
            }
            Phase::ReadTrack { remaining } => {
                self.read_transfer_byte(byte);
                if remaining > 1 {
                    self.phase = Phase::ReadTrack {
                        remaining: remaining - 1,
                    };
                }
                else {
                    self.complete_command(true);
                }
            }
            Phase::WriteTrackStart { waited } => {
                if !self.pins.drq {
                    let remaining = self.rotation.track_len();
                    self.phase = Phase::WriteTrack { remaining };
                    self.write_track_byte(remaining);
                }
                else if waited + 1 >= WRITE_TRACK_FIRST_BYTE_WAIT {
                    log::debug!("WriteTrack: first byte not supplied");
                    self.status.set_lost_data(true);
                    self.complete_command(true);
                }
                else {
                    self.phase = Phase::WriteTrackStart { waited: waited + 1 };
                }
            }
            Phase::WriteTrack { remaining } => self.write_track_byte(remaining),
            _ => {}
        }
    }

    fn write_track_byte(&mut self, remaining: usize) {
        let value = self.write_transfer_byte();
        if remaining > 1 {
            self.pins.drq = true;
            self.phase = Phase::WriteTrack {
                remaining: remaining - 1,
            };
        }
        else {
            log::trace!(
                "WriteTrack: discarded track {} side {}, last byte {:02X}",
                self.current_track,
                self.pins.side_select as u8,
                value
            );
            self.complete_command(true);
        }
    }
}
