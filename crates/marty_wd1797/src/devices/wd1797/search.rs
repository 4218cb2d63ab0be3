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

//! Address mark detection over the stream of bytes passing under the head.
//!
//! A mark is recognized after a run of sync zeros, followed (in MFM) by three A1 sync marks and
//! then the mark byte itself. ID address marks are followed by the six byte ID field, which is
//! collected and checked against its CRC.
//!
//! FM has no A1 prefix, so sector data holding a run of zeros and a mark byte looks like a real
//! mark. Once a good ID field has announced a sector length, the data field after the next data
//! mark is passed over without looking for marks. A data field with no readable ID in front of
//! it is still scanned.

use crate::{
    crc::{crc16, crc16_byte, CRC_PRESET},
    devices::floppy_medium::{TrackEncoding, MARK_DATA, MARK_DELETED_DATA, MARK_ID, MFM_SYNC_MARK},
};

/// Minimum run of zero bytes that counts as a sync field.
pub const MIN_SYNC_ZEROS: usize = 3;
/// Searches give up after this many index pulses.
pub const MAX_INDEX_PULSES: u32 = 5;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IdField {
    pub track: u8,
    pub side: u8,
    pub sector: u8,
    pub length: u8,
    pub crc: u16,
    pub crc_valid: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchEvent {
    None,
    /// An ID address mark was found. The ID field follows.
    IdMark,
    IdField(IdField),
    DataMark { deleted: bool },
}

#[derive(Clone, Debug)]
pub struct AddressMarkSearch {
    mark_prefix: &'static [u8],
    zero_run: usize,
    sync_count: usize,
    collecting: bool,
    id_bytes: [u8; 6],
    id_collected: usize,
    crc: u16,
    /// Data field length, plus CRC, announced by the last good ID field.
    announced_len: Option<usize>,
    /// Data field bytes still to pass before marks are recognized again.
    skip: usize,
}

impl AddressMarkSearch {
    pub fn new(encoding: TrackEncoding) -> Self {
        Self {
            mark_prefix: encoding.schema().mark_prefix,
            zero_run: 0,
            sync_count: 0,
            collecting: false,
            id_bytes: [0; 6],
            id_collected: 0,
            crc: CRC_PRESET,
            announced_len: None,
            skip: 0,
        }
    }

    pub fn reset(&mut self) {
        self.zero_run = 0;
        self.sync_count = 0;
        self.collecting = false;
        self.id_collected = 0;
        self.crc = CRC_PRESET;
        self.announced_len = None;
        self.skip = 0;
    }

    /// CRC accumulated over the last address mark and any ID bytes collected since.
    pub fn crc(&self) -> u16 {
        self.crc
    }

    pub fn zero_run(&self) -> usize {
        self.zero_run
    }

    pub fn sync_count(&self) -> usize {
        self.sync_count
    }

    pub fn id_collected(&self) -> usize {
        self.id_collected
    }

    pub fn feed(&mut self, byte: u8) -> SearchEvent {
        if self.collecting {
            return self.collect_id(byte);
        }
        if self.skip > 0 {
            self.skip -= 1;
            return SearchEvent::None;
        }

        let synced = self.zero_run >= MIN_SYNC_ZEROS;
        match byte {
            0x00 => {
                self.zero_run += 1;
                self.sync_count = 0;
            }
            MFM_SYNC_MARK if synced && !self.mark_prefix.is_empty() => {
                self.sync_count += 1;
            }
            MARK_ID | MARK_DATA | MARK_DELETED_DATA if synced && self.sync_count >= self.mark_prefix.len() => {
                self.zero_run = 0;
                self.sync_count = 0;
                self.crc = crc16_byte(crc16(self.mark_prefix, None), byte);
                return match byte {
                    MARK_ID => {
                        self.collecting = true;
                        self.id_collected = 0;
                        self.announced_len = None;
                        SearchEvent::IdMark
                    }
                    _ => {
                        self.skip = self.announced_len.take().unwrap_or(0);
                        SearchEvent::DataMark {
                            deleted: byte == MARK_DELETED_DATA,
                        }
                    }
                };
            }
            _ => {
                self.zero_run = 0;
                self.sync_count = 0;
            }
        }
        SearchEvent::None
    }

    fn collect_id(&mut self, byte: u8) -> SearchEvent {
        self.id_bytes[self.id_collected] = byte;
        self.id_collected += 1;
        if self.id_collected <= 4 {
            self.crc = crc16_byte(self.crc, byte);
        }
        if self.id_collected < self.id_bytes.len() {
            return SearchEvent::None;
        }

        self.collecting = false;
        let recorded = u16::from_be_bytes([self.id_bytes[4], self.id_bytes[5]]);
        if recorded == self.crc {
            self.announced_len = Some((128usize << (self.id_bytes[3] & 0x03)) + 2);
        }
        SearchEvent::IdField(IdField {
            track: self.id_bytes[0],
            side: self.id_bytes[1],
            sector: self.id_bytes[2],
            length: self.id_bytes[3],
            crc: recorded,
            crc_valid: recorded == self.crc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device_types::geometry::DiskGeometry,
        devices::floppy_medium::{tests::test_image, FloppyMedium, TrackLayout},
    };

    fn ids(events: &[SearchEvent]) -> Vec<IdField> {
        events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::IdField(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn scan(search: &mut AddressMarkSearch, bytes: &[u8]) -> Vec<SearchEvent> {
        bytes
            .iter()
            .map(|&b| search.feed(b))
            .filter(|e| *e != SearchEvent::None)
            .collect()
    }

    #[test]
    fn test_finds_every_sector_on_a_track() {
        let geometry = DiskGeometry::new(40, 2, 9, 512);
        let medium = FloppyMedium::from_image(test_image(geometry), geometry, TrackLayout::default()).unwrap();
        let mut search = AddressMarkSearch::new(TrackEncoding::Mfm);
        let events = scan(&mut search, medium.track(3, 1).unwrap());

        let ids = ids(&events);
        assert_eq!(ids.len(), 9);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!((id.track, id.side, id.sector, id.length), (3, 1, i as u8 + 1, 2));
            assert!(id.crc_valid);
        }
        let data_marks = events
            .iter()
            .filter(|e| **e == SearchEvent::DataMark { deleted: false })
            .count();
        assert_eq!(data_marks, 9);
    }

    #[test]
    fn test_bad_crc_is_flagged() {
        let mut search = AddressMarkSearch::new(TrackEncoding::Mfm);
        let mut bytes = vec![0x00; 12];
        bytes.extend([0xA1, 0xA1, 0xA1, 0xFE, 1, 0, 1, 2, 0x12, 0x34]);
        let events = scan(&mut search, &bytes);
        assert_eq!(events[0], SearchEvent::IdMark);
        let SearchEvent::IdField(id) = events[1]
        else {
            panic!("expected id field");
        };
        assert!(!id.crc_valid);
        assert_eq!(id.crc, 0x1234);
    }

    #[test]
    fn test_marks_require_sync() {
        let mut search = AddressMarkSearch::new(TrackEncoding::Mfm);
        // Too few zeros, then a mark without its sync bytes
        let events = scan(&mut search, &[0x00, 0x00, 0xA1, 0xA1, 0xA1, 0xFE, 0x00, 0x00, 0x00, 0xFB]);
        assert!(events.is_empty());

        let mut search = AddressMarkSearch::new(TrackEncoding::Fm);
        let events = scan(&mut search, &[0x00, 0x00, 0x00, 0x00, 0xF8]);
        assert_eq!(events, vec![SearchEvent::DataMark { deleted: true }]);
    }

    #[test]
    fn test_fm_data_field_hides_mark_like_bytes() {
        let geometry = DiskGeometry::new(40, 1, 5, 512);
        let mut image = vec![0x40; geometry.total_size()];
        for sector in image.chunks_mut(512) {
            sector[16..26].copy_from_slice(&[0x00, 0x00, 0x00, 0x00, 0xFE, 9, 9, 9, 2, 0x00]);
            sector[100..104].copy_from_slice(&[0x00, 0x00, 0x00, 0xFB]);
        }
        let layout = TrackLayout {
            encoding: TrackEncoding::Fm,
            track_len: 3749,
            gap3: 27,
        };
        let medium = FloppyMedium::from_image(image, geometry, layout).unwrap();
        let mut search = AddressMarkSearch::new(TrackEncoding::Fm);
        let events = scan(&mut search, medium.track(7, 0).unwrap());

        let ids = ids(&events);
        assert_eq!(ids.len(), 5);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!((id.track, id.sector), (7, i as u8 + 1));
            assert!(id.crc_valid);
        }
        assert_eq!(events.iter().filter(|e| matches!(e, SearchEvent::DataMark { .. })).count(), 5);
        assert_eq!(events.len(), 15);
    }

    #[test]
    fn test_data_field_without_id_is_scanned() {
        let mut search = AddressMarkSearch::new(TrackEncoding::Fm);
        let events = scan(&mut search, &[0x00, 0x00, 0x00, 0xFB, 0x00, 0x00, 0x00, 0xF8]);
        assert_eq!(
            events,
            vec![SearchEvent::DataMark { deleted: false }, SearchEvent::DataMark { deleted: true }]
        );
    }
}
