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

//! Command byte decoding.

use modular_bitfield::{bitfield, prelude::*};
use strum_macros::Display;

/// Type I step rates at a 1MHz chip clock, indexed by command bits 0-1.
pub const STEP_RATES_MS: [f64; 4] = [6.0, 12.0, 20.0, 30.0];

/// Sector lengths indexed by ID field length code, with the L flag clear.
const SECTOR_LENGTHS_NON_IBM: [usize; 4] = [256, 512, 1024, 128];
/// Sector lengths indexed by ID field length code, with the L flag set.
const SECTOR_LENGTHS_IBM: [usize; 4] = [128, 256, 512, 1024];

#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct TypeIByte {
    pub rate: B2,
    pub verify: bool,
    pub head_load: bool,
    pub update: bool,
    #[skip]
    unused: B3,
}

#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct TransferByte {
    pub a0: bool,
    pub update_sso: bool,
    pub delay: bool,
    pub length: bool,
    pub multiple: bool,
    #[skip]
    unused: B3,
}

#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct ForceInterruptByte {
    pub not_ready_to_ready: bool,
    pub ready_to_not_ready: bool,
    pub index_pulse: bool,
    pub immediate: bool,
    #[skip]
    unused: B4,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum CommandType {
    #[default]
    None,
    I,
    II,
    III,
    IV,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum CommandName {
    #[default]
    None,
    Restore,
    Seek,
    Step,
    StepIn,
    StepOut,
    ReadSector,
    WriteSector,
    ReadAddress,
    ReadTrack,
    WriteTrack,
    ForceInterrupt,
}

/// The commands that drive the stepping state machine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum TypeICommand {
    #[default]
    Restore,
    Seek,
    Step,
    StepIn,
    StepOut,
}

/// The Type II and III commands, which move data between the disk and the data register.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum TransferCommand {
    #[default]
    ReadSector,
    WriteSector,
    ReadAddress,
    ReadTrack,
    WriteTrack,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeIFlags {
    pub rate: u8,
    pub verify: bool,
    pub head_load: bool,
    /// Only meaningful for the step commands.
    pub track_update: bool,
}

impl TypeIFlags {
    pub fn step_rate_ms(&self) -> f64 {
        STEP_RATES_MS[(self.rate & 0x03) as usize]
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferFlags {
    /// Write Sector: write a deleted data mark.
    pub data_address_mark: bool,
    pub update_sso: bool,
    pub delay_15ms: bool,
    /// Selects the IBM sector length table.
    pub swap_sector_length: bool,
    pub multiple_records: bool,
}

impl TransferFlags {
    /// Decode an ID field length code under this command's sector length table.
    pub fn sector_length(&self, code: u8) -> usize {
        let table = match self.swap_sector_length {
            true => &SECTOR_LENGTHS_IBM,
            false => &SECTOR_LENGTHS_NON_IBM,
        };
        table[(code & 0x03) as usize]
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InterruptConditions {
    pub not_ready_to_ready: bool,
    pub ready_to_not_ready: bool,
    pub index_pulse: bool,
    pub immediate: bool,
}

impl InterruptConditions {
    pub fn is_empty(&self) -> bool {
        !(self.not_ready_to_ready || self.ready_to_not_ready || self.index_pulse || self.immediate)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Restore(TypeIFlags),
    Seek(TypeIFlags),
    Step(TypeIFlags),
    StepIn(TypeIFlags),
    StepOut(TypeIFlags),
    ReadSector(TransferFlags),
    WriteSector(TransferFlags),
    ReadAddress(TransferFlags),
    ReadTrack(TransferFlags),
    WriteTrack(TransferFlags),
    ForceInterrupt(InterruptConditions),
}

impl Command {
    /// Decode a command byte. Every byte decodes to some command; the force interrupt pattern
    /// takes precedence over the Type III patterns it overlaps.
    pub fn decode(byte: u8) -> Command {
        let type_i = || {
            let b = TypeIByte::from_bytes([byte]);
            TypeIFlags {
                rate: b.rate(),
                verify: b.verify(),
                head_load: b.head_load(),
                track_update: b.update(),
            }
        };
        let transfer = || {
            let b = TransferByte::from_bytes([byte]);
            TransferFlags {
                data_address_mark: b.a0(),
                update_sso: b.update_sso(),
                delay_15ms: b.delay(),
                swap_sector_length: b.length(),
                multiple_records: b.multiple(),
            }
        };

        match byte >> 4 {
            0xD => {
                let b = ForceInterruptByte::from_bytes([byte]);
                Command::ForceInterrupt(InterruptConditions {
                    not_ready_to_ready: b.not_ready_to_ready(),
                    ready_to_not_ready: b.ready_to_not_ready(),
                    index_pulse: b.index_pulse(),
                    immediate: b.immediate(),
                })
            }
            0x0 => Command::Restore(TypeIFlags {
                track_update: false,
                ..type_i()
            }),
            0x1 => Command::Seek(TypeIFlags {
                track_update: false,
                ..type_i()
            }),
            0x2 | 0x3 => Command::Step(type_i()),
            0x4 | 0x5 => Command::StepIn(type_i()),
            0x6 | 0x7 => Command::StepOut(type_i()),
            0x8 | 0x9 => Command::ReadSector(TransferFlags {
                data_address_mark: false,
                ..transfer()
            }),
            0xA | 0xB => Command::WriteSector(transfer()),
            0xC => Command::ReadAddress(TransferFlags {
                multiple_records: false,
                swap_sector_length: false,
                ..transfer()
            }),
            0xE => Command::ReadTrack(TransferFlags {
                multiple_records: false,
                swap_sector_length: false,
                ..transfer()
            }),
            _ => Command::WriteTrack(TransferFlags {
                multiple_records: false,
                swap_sector_length: false,
                ..transfer()
            }),
        }
    }

    pub fn name(&self) -> CommandName {
        match self {
            Command::Restore(_) => CommandName::Restore,
            Command::Seek(_) => CommandName::Seek,
            Command::Step(_) => CommandName::Step,
            Command::StepIn(_) => CommandName::StepIn,
            Command::StepOut(_) => CommandName::StepOut,
            Command::ReadSector(_) => CommandName::ReadSector,
            Command::WriteSector(_) => CommandName::WriteSector,
            Command::ReadAddress(_) => CommandName::ReadAddress,
            Command::ReadTrack(_) => CommandName::ReadTrack,
            Command::WriteTrack(_) => CommandName::WriteTrack,
            Command::ForceInterrupt(_) => CommandName::ForceInterrupt,
        }
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Restore(_) | Command::Seek(_) | Command::Step(_) | Command::StepIn(_) | Command::StepOut(_) => {
                CommandType::I
            }
            Command::ReadSector(_) | Command::WriteSector(_) => CommandType::II,
            Command::ReadAddress(_) | Command::ReadTrack(_) | Command::WriteTrack(_) => CommandType::III,
            Command::ForceInterrupt(_) => CommandType::IV,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_precedence() {
        for byte in 0..=255u8 {
            let expected = match byte {
                0xD0..=0xDF => CommandType::IV,
                0x00..=0x7F => CommandType::I,
                0x80..=0xBF => CommandType::II,
                _ => CommandType::III,
            };
            assert_eq!(Command::decode(byte).command_type(), expected, "byte {:02X}", byte);
        }
    }

    #[test]
    fn test_type_i_decoding() {
        // Restore, rate 6ms, verify, no head load
        assert_eq!(
            Command::decode(0b0000_0100),
            Command::Restore(TypeIFlags {
                rate: 0,
                verify: true,
                head_load: false,
                track_update: false,
            })
        );
        // Seek, rate 12ms, verify, head load
        let Command::Seek(flags) = Command::decode(0b0001_1101)
        else {
            panic!("expected seek");
        };
        assert_eq!(flags.step_rate_ms(), 12.0);
        assert!(flags.verify && flags.head_load && !flags.track_update);

        // Step In, rate 30ms, track update
        let Command::StepIn(flags) = Command::decode(0b0101_0011)
        else {
            panic!("expected step in");
        };
        assert_eq!(flags.step_rate_ms(), 30.0);
        assert!(flags.track_update && !flags.verify);

        assert_eq!(Command::decode(0x3A).name(), CommandName::Step);
        assert_eq!(Command::decode(0x65).name(), CommandName::StepOut);
    }

    #[test]
    fn test_step_rate_table() {
        for (code, ms) in [(0u8, 6.0), (1, 12.0), (2, 20.0), (3, 30.0)] {
            let flags = TypeIFlags {
                rate: code,
                ..Default::default()
            };
            assert_eq!(flags.step_rate_ms(), ms);
        }
    }

    #[test]
    fn test_transfer_decoding() {
        let Command::ReadSector(flags) = Command::decode(0b1001_1110)
        else {
            panic!("expected read sector");
        };
        assert!(flags.multiple_records && flags.swap_sector_length && flags.delay_15ms && flags.update_sso);

        let Command::WriteSector(flags) = Command::decode(0b1010_1011)
        else {
            panic!("expected write sector");
        };
        assert!(flags.data_address_mark && flags.update_sso && flags.swap_sector_length);
        assert!(!flags.multiple_records && !flags.delay_15ms);

        assert_eq!(Command::decode(0xC4).name(), CommandName::ReadAddress);
        assert_eq!(Command::decode(0xE4).name(), CommandName::ReadTrack);
        assert_eq!(Command::decode(0xF6).name(), CommandName::WriteTrack);
    }

    #[test]
    fn test_sector_length_tables() {
        let ibm = TransferFlags {
            swap_sector_length: true,
            ..Default::default()
        };
        let non_ibm = TransferFlags::default();
        assert_eq!(ibm.sector_length(2), 512);
        assert_eq!(non_ibm.sector_length(2), 1024);
        assert_eq!(non_ibm.sector_length(3), 128);
    }

    #[test]
    fn test_force_interrupt_conditions() {
        let Command::ForceInterrupt(conditions) = Command::decode(0xD0)
        else {
            panic!("expected force interrupt");
        };
        assert!(conditions.is_empty());

        let Command::ForceInterrupt(conditions) = Command::decode(0xD5)
        else {
            panic!("expected force interrupt");
        };
        assert!(conditions.not_ready_to_ready && conditions.index_pulse);
        assert!(!conditions.immediate && !conditions.ready_to_not_ready);
    }
}
