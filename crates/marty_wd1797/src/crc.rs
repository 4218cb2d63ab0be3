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

    crc.rs

    CRC-16/CCITT as produced by the WD179x CRC generator: polynomial 0x1021, MSB first,
    preset to all ones. The same CRC protects both ID fields and data fields, and is computed
    over the address mark bytes as well as the field contents.
*/

pub const CRC_CCITT_POLY: u16 = 0x1021;
pub const CRC_PRESET: u16 = 0xFFFF;

const fn build_crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC_CCITT_POLY
            }
            else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u16; 256] = build_crc_table();

/// Shift a single byte into a running CRC.
#[inline]
pub fn crc16_byte(crc: u16, byte: u8) -> u16 {
    (crc << 8) ^ CRC_TABLE[(((crc >> 8) as u8) ^ byte) as usize]
}

/// Calculate the CRC of `data`, continuing from `start` if provided or from the chip's preset
/// value otherwise.
pub fn crc16(data: &[u8], start: Option<u16>) -> u16 {
    data.iter()
        .fold(start.unwrap_or(CRC_PRESET), |crc, &byte| crc16_byte(crc, byte))
}
