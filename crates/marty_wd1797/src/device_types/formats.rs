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

    device_types::formats.rs

    Standard raw sector image sizes and the geometries they imply.
*/

use crate::device_types::geometry::DiskGeometry;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Copy, Clone, Debug)]
pub struct DiskFormat {
    pub geometry: DiskGeometry,
    pub description: &'static str,
}

lazy_static! {
    pub static ref DISK_FORMATS: HashMap<usize, DiskFormat> = {
        HashMap::from([
            (
                163_840,
                DiskFormat {
                    geometry: DiskGeometry::new(40, 1, 8, 512),
                    description: "160K 5.25\" SSDD",
                },
            ),
            (
                184_320,
                DiskFormat {
                    geometry: DiskGeometry::new(40, 1, 9, 512),
                    description: "180K 5.25\" SSDD",
                },
            ),
            (
                327_680,
                DiskFormat {
                    geometry: DiskGeometry::new(40, 2, 8, 512),
                    description: "320K 5.25\" DSDD",
                },
            ),
            (
                368_640,
                DiskFormat {
                    geometry: DiskGeometry::new(40, 2, 9, 512),
                    description: "360K 5.25\" DSDD",
                },
            ),
            (
                737_280,
                DiskFormat {
                    geometry: DiskGeometry::new(80, 2, 9, 512),
                    description: "720K DSDD",
                },
            ),
        ])
    };
}

/// Look up the geometry implied by a raw sector image of `size` bytes.
pub fn geometry_from_size(size: usize) -> Option<DiskGeometry> {
    DISK_FORMATS.get(&size).map(|format| format.geometry)
}
