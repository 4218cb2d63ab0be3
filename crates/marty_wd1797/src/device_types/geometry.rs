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

//! Define a [DiskGeometry] that describes the sector layout of a standard formatted floppy.

use crate::device_types::chs::DiskChs;
use std::fmt::Display;

/// Sector sizes addressable by a WD179x ID field length code, indexed by IBM length code.
pub const SECTOR_SIZES: [usize; 4] = [128, 256, 512, 1024];

/// A structure representing how sectors are laid out on a disk (assuming standard format)
///  - Cylinder count (c)
///  - Head count (h)
///  - Sectors per track (s)
///  - Sector size in bytes
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct DiskGeometry {
    pub(crate) c: u16,
    pub(crate) h: u8,
    pub(crate) s: u8,
    pub(crate) size: usize,
}

impl Default for DiskGeometry {
    fn default() -> Self {
        Self {
            c: 40,
            h: 2,
            s: 9,
            size: 512,
        }
    }
}

impl Display for DiskGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:2} h:{} s:{:2} size:{}]", self.c, self.h, self.s, self.size)
    }
}

impl DiskGeometry {
    pub fn new(c: u16, h: u8, s: u8, size: usize) -> Self {
        Self { c, h, s, size }
    }
    #[inline]
    pub fn cylinders(&self) -> u16 {
        self.c
    }
    #[inline]
    pub fn heads(&self) -> u8 {
        self.h
    }
    #[inline]
    pub fn sectors(&self) -> u8 {
        self.s
    }
    #[inline]
    pub fn sector_size(&self) -> usize {
        self.size
    }
    /// Return the IBM length code (N) for this geometry's sector size, if it has one.
    pub fn length_code(&self) -> Option<u8> {
        SECTOR_SIZES.iter().position(|&s| s == self.size).map(|n| n as u8)
    }
    pub fn total_sectors(&self) -> usize {
        (self.c as usize) * (self.h as usize) * (self.s as usize)
    }
    /// Return the size in bytes of a raw sector image with this geometry.
    pub fn total_size(&self) -> usize {
        self.total_sectors() * self.size
    }
    /// Return a boolean indicating whether this [DiskGeometry] contains the specified [DiskChs].
    pub fn contains(&self, chs: impl Into<DiskChs>) -> bool {
        let chs = chs.into();
        self.c > chs.c && self.h > chs.h && chs.s >= 1 && chs.s <= self.s
    }
}
