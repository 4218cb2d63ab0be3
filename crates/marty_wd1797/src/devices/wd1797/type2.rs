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

    devices::wd1797::type2.rs

    Type II commands: READ SECTOR and WRITE SECTOR. Also the E-delay and head load gating
    shared by all data transfer commands.

    Sector transfers search the rotating track for an ID field matching the track, sector and
    side, then move the data field one byte per byte time, raising DRQ for each byte. A byte
    not serviced before the next one arrives sets the lost data status bit.
*/

use super::{
    rotation::RotationTick,
    search::{IdField, SearchEvent, MAX_INDEX_PULSES},
    Phase, TimerId, TransferCommand, TransferFlags, Wd1797,
};
use crate::crc::{crc16, crc16_byte};
use crate::devices::floppy_medium::{MARK_DATA, MARK_DELETED_DATA};

impl Wd1797 {
    /// Common setup for Type II and III commands. If the drive is not ready the command ends
    /// immediately with INTRQ.
    pub(super) fn setup_transfer(&mut self, flags: TransferFlags) {
        self.transfer = flags;
        self.pins.drq = false;
        self.status.reset_transfer();

        if !self.pins.ready {
            log::warn!("{}: drive not ready", self.current_command);
            self.status.set_not_ready(true);
            self.pins.intrq = true;
            self.phase = Phase::Idle;
            return;
        }

        self.status.set_busy(true);
        self.command_done = false;
        self.pins.side_select = flags.update_sso;
        self.load_head();
        self.update_drive_lines();

        self.phase = if flags.delay_15ms {
            self.timers[TimerId::EDelay].start();
            Phase::EDelay
        }
        else {
            Phase::WaitHlt
        };
    }

    pub(super) fn transfer_step(&mut self, us: f64, tick: &RotationTick) {
        match self.phase {
            Phase::Idle => return,
            Phase::EDelay => {
                if self.timers[TimerId::EDelay].tick(us) {
                    self.e_delay_done = true;
                    self.phase = Phase::WaitHlt;
                }
                return;
            }
            Phase::WaitHlt => {
                if self.pins.hlt {
                    self.begin_transfer();
                }
                return;
            }
            _ => {}
        }

        for offset in tick.offsets() {
            if self.command_done {
                break;
            }
            let byte = self.medium_byte(offset);
            match self.transfer_command {
                TransferCommand::ReadSector | TransferCommand::WriteSector => self.sector_byte(offset, byte),
                TransferCommand::ReadAddress | TransferCommand::ReadTrack | TransferCommand::WriteTrack => {
                    self.track_byte(offset, byte)
                }
            }
        }
    }

    fn begin_transfer(&mut self) {
        self.start_byte_set = true;
        self.search.reset();
        self.index_count = 0;

        self.phase = match self.transfer_command {
            TransferCommand::ReadSector | TransferCommand::WriteSector | TransferCommand::ReadAddress => {
                self.image_pointer = self
                    .medium
                    .as_ref()
                    .and_then(|m| m.sector_offset(self.current_track as u16, self.pins.side_select as u8, self.sector))
                    .unwrap_or(0);
                Phase::SearchId
            }
            TransferCommand::ReadTrack => Phase::ReadTrack {
                remaining: self.rotation.track_len(),
            },
            TransferCommand::WriteTrack => {
                self.pins.drq = true;
                Phase::WriteTrackStart { waited: 0 }
            }
        };
        log::trace!("{}: head loaded, starting at offset {}", self.current_command, self.rotation.pointer());
    }

    /// Count index pulses while searching. Returns true if the search should give up.
    pub(super) fn search_expired(&mut self, offset: usize) -> bool {
        if offset != 0 {
            return false;
        }
        self.index_count += 1;
        if self.index_count >= MAX_INDEX_PULSES {
            log::debug!(
                "{}: record not found, track: {} sector: {} side: {}",
                self.current_command,
                self.track,
                self.sector,
                self.pins.side_select as u8
            );
            self.status.set_record_not_found(true);
            self.complete_command(true);
            return true;
        }
        false
    }

    /// Move a byte read from the disk into the data register and request service.
    pub(super) fn read_transfer_byte(&mut self, byte: u8) {
        if self.pins.drq {
            log::trace!("{}: lost data", self.current_command);
            self.status.set_lost_data(true);
        }
        self.data_shift = byte;
        self.data = byte;
        self.pins.drq = true;
    }

    /// Take the next byte to be written from the data register, substituting zero if the host
    /// did not supply one in time.
    pub(super) fn write_transfer_byte(&mut self) -> u8 {
        let byte = if self.pins.drq {
            log::trace!("{}: lost data", self.current_command);
            self.status.set_lost_data(true);
            0
        }
        else {
            self.data
        };
        self.data_shift = byte;
        byte
    }

    fn sector_byte(&mut self, offset: usize, byte: u8) {
        let schema = self.config.encoding.schema();

        match self.phase {
            Phase::SearchId => {
                if self.search_expired(offset) {
                    return;
                }
                if let SearchEvent::IdField(id) = self.search.feed(byte) {
                    self.match_id(id);
                }
            }
            Phase::SearchDataMark { bytes } => {
                if self.search_expired(offset) {
                    return;
                }
                match self.search.feed(byte) {
                    SearchEvent::DataMark { deleted } => {
                        self.status.set_record_type(deleted);
                        self.crc = self.search.crc();
                        self.phase = Phase::ReadData {
                            remaining: self.sector_length,
                        };
                    }
                    _ if bytes + 1 >= schema.dam_window => {
                        log::trace!("No data address mark after ID field");
                        self.phase = Phase::SearchId;
                    }
                    _ => self.phase = Phase::SearchDataMark { bytes: bytes + 1 },
                }
            }
            Phase::ReadData { remaining } => {
                self.read_transfer_byte(byte);
                self.crc = crc16_byte(self.crc, byte);
                self.image_pointer += 1;
                self.phase = match remaining {
                    1 => {
                        self.recorded_crc = 0;
                        Phase::ReadCrc { count: 0 }
                    }
                    _ => Phase::ReadData {
                        remaining: remaining - 1,
                    },
                };
            }
            Phase::ReadCrc { count } => {
                self.recorded_crc = (self.recorded_crc << 8) | byte as u16;
                if count == 0 {
                    self.phase = Phase::ReadCrc { count: 1 };
                    return;
                }
                if self.recorded_crc != self.crc {
                    log::debug!(
                        "Data CRC error in sector {}: recorded {:04X} calculated {:04X}",
                        self.sector,
                        self.recorded_crc,
                        self.crc
                    );
                    self.status.set_crc_error(true);
                    self.complete_command(true);
                    return;
                }
                self.sector_done();
            }
            Phase::WriteGap { bytes } => {
                if bytes + 1 < schema.gap2 {
                    self.phase = Phase::WriteGap { bytes: bytes + 1 };
                    return;
                }
                if self.pins.drq {
                    log::debug!("WriteSector: first byte not supplied");
                    self.status.set_lost_data(true);
                    self.complete_command(true);
                    return;
                }
                self.phase = Phase::WriteMark { bytes: 0 };
            }
            Phase::WriteMark { bytes } => {
                let mark_len = schema.sync_len + schema.mark_prefix.len() + 1;
                if bytes + 1 < mark_len {
                    self.phase = Phase::WriteMark { bytes: bytes + 1 };
                    return;
                }
                let mark = match self.transfer.data_address_mark {
                    true => MARK_DELETED_DATA,
                    false => MARK_DATA,
                };
                self.crc = crc16_byte(crc16(schema.mark_prefix, None), mark);
                self.phase = Phase::WriteData {
                    remaining: self.sector_length,
                };
            }
            Phase::WriteData { remaining } => {
                let value = self.write_transfer_byte();
                self.crc = crc16_byte(self.crc, value);
                self.image_pointer += 1;
                if remaining > 1 {
                    self.pins.drq = true;
                    self.phase = Phase::WriteData {
                        remaining: remaining - 1,
                    };
                }
                else {
                    log::trace!(
                        "WriteSector: discarded sector {} of track {}, crc {:04X}",
                        self.sector,
                        self.current_track,
                        self.crc
                    );
                    self.phase = Phase::WriteCrc { count: 0 };
                }
            }
            Phase::WriteCrc { count } => match count {
                0 => self.phase = Phase::WriteCrc { count: 1 },
                _ => self.sector_done(),
            },
            _ => {}
        }
    }

    fn match_id(&mut self, id: IdField) {
        if !id.crc_valid {
            log::debug!("ID field CRC error: {:?}", id);
            self.status.set_crc_error(true);
            return;
        }
        let length = self.transfer.sector_length(id.length);
        if id.track != self.track
            || id.side != self.pins.side_select as u8
            || id.sector != self.sector
            || length != self.geometry().sector_size()
        {
            return;
        }

        self.status.set_crc_error(false);
        self.sector_length = length;
        self.index_count = 0;
        self.phase = match self.transfer_command {
            TransferCommand::WriteSector => {
                self.pins.drq = true;
                Phase::WriteGap { bytes: 0 }
            }
            _ => Phase::SearchDataMark { bytes: 0 },
        };
    }

    fn sector_done(&mut self) {
        if !self.transfer.multiple_records {
            self.complete_command(true);
            return;
        }
        self.sector = self.sector.wrapping_add(1);
        if self.sector > self.geometry().sectors() {
            self.complete_command(true);
            return;
        }
        log::trace!("{}: continuing with sector {}", self.current_command, self.sector);
        // The data field just transferred was not fed through the search.
        self.search.reset();
        self.index_count = 0;
        self.phase = Phase::SearchId;
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::ControllerConfig,
        devices::wd1797::{
            tests::{controller, controller_with_config, read_transfer, run_for, run_until, write_transfer},
            Wd1797,
        },
    };

    fn expected_sector(c: u8, h: u8, s: u8) -> Vec<u8> {
        (0..512usize)
            .map(|i| match i {
                0 => c,
                1 => h,
                2 => s,
                _ => (i as u8 & 0x3F) | 0x40,
            })
            .collect()
    }

    fn at_track(track: u8) -> Wd1797 {
        let mut fdc = controller();
        fdc.set_current_track(track);
        fdc.write_track(track);
        fdc
    }

    #[test]
    fn test_read_sector() {
        let mut fdc = at_track(2);
        fdc.write_sector(3);
        fdc.write_command(0x88);
        assert_eq!(fdc.peek_status() & 0x01, 0x01);

        let data = read_transfer(&mut fdc, 1_000_000.0);
        assert!(!fdc.busy());
        assert_eq!(data, expected_sector(2, 0, 3));
        assert!(fdc.intrq());
        assert_eq!(fdc.peek_status() & 0x1C, 0);
        assert_eq!(fdc.sector(), 3);
    }

    #[test]
    fn test_read_sector_side_one() {
        let mut fdc = at_track(6);
        fdc.write_sector(1);
        fdc.write_command(0x8A);
        let data = read_transfer(&mut fdc, 1_000_000.0);
        assert_eq!(data, expected_sector(6, 1, 1));
        assert!(fdc.pins().side_select);
    }

    #[test]
    fn test_read_multiple_sectors() {
        let mut fdc = at_track(2);
        fdc.write_sector(8);
        fdc.write_command(0x98);

        let data = read_transfer(&mut fdc, 2_000_000.0);
        assert_eq!(data.len(), 1024);
        assert_eq!(&data[..512], expected_sector(2, 0, 8).as_slice());
        assert_eq!(&data[512..], expected_sector(2, 0, 9).as_slice());
        assert_eq!(fdc.sector(), 10);
        assert_eq!(fdc.peek_status() & 0x1C, 0);
        assert!(fdc.intrq());
    }

    #[test]
    fn test_read_sector_lost_data() {
        let mut fdc = at_track(2);
        fdc.write_sector(1);
        fdc.write_command(0x88);
        assert!(run_until(&mut fdc, 1_000_000.0, 1.0, |fdc| !fdc.busy()).is_some());
        assert_eq!(fdc.peek_status() & 0x04, 0x04);
        // The last byte is still waiting in the data register
        assert_eq!(fdc.read_data(), (511u16 as u8 & 0x3F) | 0x40);
    }

    #[test]
    fn test_record_not_found() {
        let mut fdc = at_track(2);
        fdc.write_sector(12);
        fdc.write_command(0x88);
        let elapsed = run_until(&mut fdc, 2_000_000.0, 10.0, |fdc| !fdc.busy());
        assert!(elapsed.unwrap() >= 800_000.0);
        assert_eq!(fdc.peek_status() & 0x10, 0x10);
        assert!(fdc.intrq());

        // A track register that disagrees with the disk also fails
        fdc.read_status();
        fdc.write_track(5);
        fdc.write_sector(1);
        fdc.write_command(0x88);
        assert!(run_until(&mut fdc, 2_000_000.0, 10.0, |fdc| !fdc.busy()).is_some());
        assert_eq!(fdc.peek_status() & 0x10, 0x10);
    }

    #[test]
    fn test_sector_length_flag() {
        // Without the IBM length flag a length code of 2 means 1024 bytes
        let mut fdc = at_track(2);
        fdc.write_sector(1);
        fdc.write_command(0x80);
        assert!(run_until(&mut fdc, 2_000_000.0, 10.0, |fdc| !fdc.busy()).is_some());
        assert_eq!(fdc.peek_status() & 0x10, 0x10);
    }

    #[test]
    fn test_not_ready() {
        let mut fdc = Wd1797::new(ControllerConfig::default());
        fdc.write_command(0x88);
        assert!(!fdc.busy());
        assert!(fdc.intrq());
        assert_eq!(fdc.peek_status() & 0x81, 0x80);
    }

    #[test]
    fn test_head_load_gates_transfer() {
        let mut fdc = at_track(2);
        fdc.write_sector(1);
        fdc.write_command(0x88);
        assert!(fdc.pins().hld);
        run_for(&mut fdc, 44_999.0, 1.0);
        assert_eq!(fdc.get_debug_state().phase, "WaitHlt");
        fdc.run(1.0);
        let state = fdc.get_debug_state();
        assert_eq!(state.phase, "SearchId");
        assert!(state.start_byte_set);
    }

    #[test]
    fn test_e_delay() {
        let config = ControllerConfig {
            head_load_ms: 10.0,
            ..Default::default()
        };
        let mut fdc = controller_with_config(config);
        fdc.write_sector(1);
        fdc.write_command(0x8C);
        run_for(&mut fdc, 29_999.0, 1.0);
        assert_eq!(fdc.get_debug_state().phase, "EDelay");
        fdc.run(1.0);
        assert!(fdc.get_debug_state().e_delay_done);
        fdc.run(1.0);
        assert_eq!(fdc.get_debug_state().phase, "SearchId");

        let data = read_transfer(&mut fdc, 1_000_000.0);
        assert_eq!(data.len(), 512);
    }

    #[test]
    fn test_write_sector() {
        let mut fdc = at_track(2);
        fdc.write_sector(3);
        fdc.write_command(0xA8);
        let count = write_transfer(&mut fdc, 0x55, 1_000_000.0);
        assert!(!fdc.busy());
        assert_eq!(count, 512);
        assert!(fdc.intrq());
        assert_eq!(fdc.peek_status() & 0x1C, 0);

        // Writes are timed but the medium is unchanged
        let medium = fdc.medium().unwrap();
        assert_eq!(medium.sector_data(2, 0, 3).unwrap(), expected_sector(2, 0, 3).as_slice());
    }

    #[test]
    fn test_write_sector_lost_data() {
        let mut fdc = at_track(2);
        fdc.write_sector(3);
        fdc.write_command(0xA8);
        let elapsed = run_until(&mut fdc, 1_000_000.0, 1.0, |fdc| !fdc.busy());
        assert!(elapsed.is_some());
        assert_eq!(fdc.peek_status() & 0x04, 0x04);
        assert!(fdc.intrq());
    }
}
