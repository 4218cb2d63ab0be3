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

    devices::floppy_medium.rs

    Presents a raw sector image as a set of formatted tracks, in the byte-level layout a WD179x
    reads from and writes to the disk surface: gaps, sync fields, address marks, ID fields and
    data fields, each protected by a CRC.
*/

use crate::{
    crc::crc16,
    device_types::{chs::DiskChs, formats::geometry_from_size, geometry::DiskGeometry},
};
use anyhow::anyhow;
use serde_derive::Deserialize;
use std::path::Path;
use strum_macros::{Display, EnumIter};
use thiserror::Error;

pub const MARK_INDEX: u8 = 0xFC;
pub const MARK_ID: u8 = 0xFE;
pub const MARK_DATA: u8 = 0xFB;
pub const MARK_DELETED_DATA: u8 = 0xF8;
pub const MFM_SYNC_MARK: u8 = 0xA1;
pub const MFM_INDEX_SYNC_MARK: u8 = 0xC2;

/// Byte assembly time at the 300kbps MFM data rate.
pub const MFM_BYTE_TIME_US: f64 = 26.67;
/// Byte assembly time at the FM data rate, half that of MFM.
pub const FM_BYTE_TIME_US: f64 = 53.34;

pub const DEFAULT_GAP3: usize = 80;
/// Raw images shorter than their detected geometry are padded with the format filler byte.
const FORMAT_FILL_BYTE: u8 = 0xE5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MediumError {
    #[error("Unsupported raw image size: {0} bytes")]
    UnsupportedImageSize(usize),
    #[error("Image of {size} bytes is larger than its geometry ({expected} bytes)")]
    ImageSizeMismatch { size: usize, expected: usize },
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(DiskGeometry),
    #[error("Sector length {0} has no ID field length code")]
    InvalidSectorLength(usize),
    #[error("Formatted track requires {needed} bytes, but only {available} pass under the head")]
    TrackOverflow { needed: usize, available: usize },
}

#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq, Display, EnumIter)]
pub enum TrackEncoding {
    Fm,
    #[default]
    Mfm,
}

/// Field sizes and mark bytes of a track format.
#[derive(Debug)]
pub struct TrackSchema {
    pub gap_byte: u8,
    pub gap4a: usize,
    pub gap1: usize,
    pub gap2: usize,
    pub sync_len: usize,
    /// Sync marks preceding every address mark. Empty for FM, where marks carry missing clocks.
    pub mark_prefix: &'static [u8],
    pub index_mark: &'static [u8],
    /// Bytes after the ID field CRC within which the data address mark must appear.
    pub dam_window: usize,
}

const MFM_SCHEMA: TrackSchema = TrackSchema {
    gap_byte: 0x4E,
    gap4a: 80,
    gap1: 50,
    gap2: 22,
    sync_len: 12,
    mark_prefix: &[MFM_SYNC_MARK, MFM_SYNC_MARK, MFM_SYNC_MARK],
    index_mark: &[MFM_INDEX_SYNC_MARK, MFM_INDEX_SYNC_MARK, MFM_INDEX_SYNC_MARK, MARK_INDEX],
    dam_window: 43,
};

const FM_SCHEMA: TrackSchema = TrackSchema {
    gap_byte: 0xFF,
    gap4a: 40,
    gap1: 26,
    gap2: 11,
    sync_len: 6,
    mark_prefix: &[],
    index_mark: &[MARK_INDEX],
    dam_window: 30,
};

impl TrackEncoding {
    pub fn schema(&self) -> &'static TrackSchema {
        match self {
            TrackEncoding::Fm => &FM_SCHEMA,
            TrackEncoding::Mfm => &MFM_SCHEMA,
        }
    }

    pub fn byte_time_us(&self) -> f64 {
        match self {
            TrackEncoding::Fm => FM_BYTE_TIME_US,
            TrackEncoding::Mfm => MFM_BYTE_TIME_US,
        }
    }
}

/// How raw sectors are laid out on each formatted track.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TrackLayout {
    pub encoding: TrackEncoding,
    /// The number of bytes that pass under the head in one revolution.
    pub track_len: usize,
    pub gap3: usize,
}

impl Default for TrackLayout {
    fn default() -> Self {
        Self {
            encoding: TrackEncoding::Mfm,
            track_len: (200_000.0 / MFM_BYTE_TIME_US) as usize,
            gap3: DEFAULT_GAP3,
        }
    }
}

pub struct FloppyMedium {
    geometry: DiskGeometry,
    layout: TrackLayout,
    image: Vec<u8>,
    tracks: Vec<Vec<u8>>,
}

impl FloppyMedium {
    /// Build a medium from a raw sector image of the specified geometry.
    pub fn from_image(mut image: Vec<u8>, geometry: DiskGeometry, layout: TrackLayout) -> Result<Self, MediumError> {
        if geometry.cylinders() == 0 || geometry.heads() == 0 || geometry.sectors() == 0 {
            return Err(MediumError::InvalidGeometry(geometry));
        }
        if geometry.length_code().is_none() {
            return Err(MediumError::InvalidSectorLength(geometry.sector_size()));
        }

        let expected = geometry.total_size();
        if image.len() > expected {
            return Err(MediumError::ImageSizeMismatch {
                size: image.len(),
                expected,
            });
        }
        if image.len() < expected {
            log::warn!(
                "Image of {} bytes is short for geometry {}, padding to {} bytes",
                image.len(),
                geometry,
                expected
            );
            image.resize(expected, FORMAT_FILL_BYTE);
        }

        let mut medium = FloppyMedium {
            geometry,
            layout,
            image,
            tracks: Vec::new(),
        };
        medium.format()?;
        Ok(medium)
    }

    /// Build a medium from a raw sector image, detecting its geometry from its size.
    pub fn from_image_detect(image: Vec<u8>, layout: TrackLayout) -> Result<Self, MediumError> {
        let geometry = geometry_from_size(image.len()).ok_or(MediumError::UnsupportedImageSize(image.len()))?;
        log::debug!("Detected geometry {} for {} byte image", geometry, image.len());
        FloppyMedium::from_image(image, geometry, layout)
    }

    /// Read a raw sector image from disk and build a medium from it.
    pub fn from_file(path: impl AsRef<Path>, layout: TrackLayout) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let image = std::fs::read(path).map_err(|e| anyhow!("Couldn't read disk image {}: {}", path.display(), e))?;
        FloppyMedium::from_image_detect(image, layout).map_err(|e| anyhow!("Couldn't load {}: {}", path.display(), e))
    }

    /// Rebuild every formatted track from the raw image.
    pub fn format(&mut self) -> Result<(), MediumError> {
        let mut tracks = Vec::with_capacity(self.geometry.cylinders() as usize * self.geometry.heads() as usize);
        for c in 0..self.geometry.cylinders() {
            for h in 0..self.geometry.heads() {
                tracks.push(self.format_track(c, h)?);
            }
        }
        self.tracks = tracks;
        Ok(())
    }

    fn format_track(&self, c: u16, h: u8) -> Result<Vec<u8>, MediumError> {
        let schema = self.layout.encoding.schema();
        let n = self
            .geometry
            .length_code()
            .ok_or(MediumError::InvalidSectorLength(self.geometry.sector_size()))?;
        let mut track = Vec::with_capacity(self.layout.track_len);

        let gap = |track: &mut Vec<u8>, len: usize| track.extend(std::iter::repeat(schema.gap_byte).take(len));
        let sync = |track: &mut Vec<u8>| track.extend(std::iter::repeat(0x00).take(schema.sync_len));

        gap(&mut track, schema.gap4a);
        sync(&mut track);
        track.extend_from_slice(schema.index_mark);
        gap(&mut track, schema.gap1);

        for s in 1..=self.geometry.sectors() {
            sync(&mut track);
            let id_start = track.len();
            track.extend_from_slice(schema.mark_prefix);
            track.push(MARK_ID);
            track.extend_from_slice(&[c as u8, h, s, n]);
            let crc = crc16(&track[id_start..], None);
            track.extend_from_slice(&crc.to_be_bytes());

            gap(&mut track, schema.gap2);
            sync(&mut track);
            let data_start = track.len();
            track.extend_from_slice(schema.mark_prefix);
            track.push(MARK_DATA);
            track.extend_from_slice(self.sector_data(c, h, s).unwrap_or(&[]));
            let crc = crc16(&track[data_start..], None);
            track.extend_from_slice(&crc.to_be_bytes());
            gap(&mut track, self.layout.gap3);
        }

        if track.len() > self.layout.track_len {
            return Err(MediumError::TrackOverflow {
                needed: track.len(),
                available: self.layout.track_len,
            });
        }
        track.resize(self.layout.track_len, schema.gap_byte);
        Ok(track)
    }

    pub fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    pub fn layout(&self) -> TrackLayout {
        self.layout
    }

    /// Lay the tracks out again under `layout`. On failure the medium keeps its old layout.
    pub fn set_layout(&mut self, layout: TrackLayout) -> Result<(), MediumError> {
        let previous = std::mem::replace(&mut self.layout, layout);
        if let Err(e) = self.format() {
            self.layout = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn track_byte_length(&self) -> usize {
        self.layout.track_len
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn track(&self, track: u16, side: u8) -> Option<&[u8]> {
        if track >= self.geometry.cylinders() || side >= self.geometry.heads() {
            return None;
        }
        let idx = track as usize * self.geometry.heads() as usize + side as usize;
        self.tracks.get(idx).map(|t| t.as_slice())
    }

    /// Return the byte at `offset` into the formatted track. Offsets wrap at the track length.
    /// Tracks the medium does not have read as unformatted (zero) bytes.
    pub fn byte_at(&self, track: u16, side: u8, offset: usize) -> u8 {
        self.track(track, side)
            .and_then(|t| t.get(offset % self.layout.track_len))
            .copied()
            .unwrap_or(0)
    }

    /// Return the offset of a sector within the raw image.
    pub fn sector_offset(&self, track: u16, side: u8, sector: u8) -> Option<usize> {
        DiskChs::new(track, side, sector).to_raw_offset(&self.geometry)
    }

    pub fn sector_data(&self, track: u16, side: u8, sector: u8) -> Option<&[u8]> {
        let offset = self.sector_offset(track, side, sector)?;
        self.image.get(offset..offset + self.geometry.sector_size())
    }
}
