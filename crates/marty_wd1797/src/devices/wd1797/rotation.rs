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

//! Disk rotation. The rotational byte pointer tracks which byte of the formatted track is under
//! the head. It advances one position per byte time and wraps once per revolution, at which point
//! the index pulse is raised for its fixed width.

use super::timer::{Timer, TimerMode};

pub const INDEX_PULSE_US: f64 = 20.0;

/// The byte positions that passed under the head during one tick.
#[derive(Copy, Clone, Debug, Default)]
pub struct RotationTick {
    first: usize,
    count: usize,
    track_len: usize,
    /// Set if the index hole was reached at least once during the tick.
    pub index_rising: bool,
    pub index_falling: bool,
}

impl RotationTick {
    /// Iterate the track offsets that arrived under the head, in order. An offset of 0 marks the
    /// passage of the index hole.
    pub fn offsets(&self) -> impl Iterator<Item = usize> {
        let (first, len) = (self.first, self.track_len.max(1));
        (0..self.count).map(move |i| (first + i) % len)
    }

    pub fn byte_count(&self) -> usize {
        self.count
    }
}

#[derive(Clone, Debug)]
pub struct DiskRotation {
    index_encounter: Timer,
    index_pulse: Timer,
    byte_us: f64,
    track_len: usize,
    pointer: usize,
    index_pin: bool,
    revolutions: u64,
}

impl DiskRotation {
    pub fn new(rotation_us: f64, byte_us: f64) -> Self {
        let mut index_encounter = Timer::new(rotation_us, TimerMode::Periodic);
        index_encounter.start();
        Self {
            index_encounter,
            index_pulse: Timer::new(INDEX_PULSE_US, TimerMode::OneShot),
            byte_us,
            track_len: ((rotation_us / byte_us) as usize).max(1),
            pointer: 0,
            index_pin: false,
            revolutions: 0,
        }
    }

    pub fn reset(&mut self) {
        self.index_encounter.start();
        self.index_pulse.stop();
        self.pointer = 0;
        self.index_pin = false;
        self.revolutions = 0;
    }

    fn position(&self) -> usize {
        ((self.index_encounter.elapsed() / self.byte_us) as usize).min(self.track_len - 1)
    }

    /// Advance the disk by `us` microseconds.
    pub fn advance(&mut self, us: f64) -> RotationTick {
        let old_pos = self.pointer;
        let mut tick = RotationTick {
            first: (old_pos + 1) % self.track_len,
            track_len: self.track_len,
            ..Default::default()
        };

        if self.index_pin && self.index_pulse.tick(us) {
            self.index_pin = false;
            tick.index_falling = true;
        }

        let wraps = self.index_encounter.expirations(us) as usize;
        let new_pos = self.position();

        if wraps > 0 {
            self.revolutions += wraps as u64;
            self.index_pin = true;
            tick.index_rising = true;
            self.index_pulse.start();
            // The pulse started when the hole was reached, not at the end of this tick.
            if self.index_pulse.tick(self.index_encounter.elapsed()) {
                self.index_pin = false;
                tick.index_falling = true;
            }
            // Whole revolutions passed in a long tick still pass every byte, and the index hole.
            tick.count = (self.track_len - 1 - old_pos) + new_pos + 1 + (wraps - 1) * self.track_len;
        }
        else {
            tick.count = new_pos - old_pos;
        }

        self.pointer = new_pos;
        tick
    }

    /// The offset of the byte currently under the head.
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn index_pulse(&self) -> bool {
        self.index_pin
    }

    pub fn track_len(&self) -> usize {
        self.track_len
    }

    pub fn byte_time_us(&self) -> f64 {
        self.byte_us
    }

    pub fn revolutions(&self) -> u64 {
        self.revolutions
    }

    pub fn rotation_us(&self) -> f64 {
        self.index_encounter.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_pulse_period_and_width() {
        let mut rotation = DiskRotation::new(200_000.0, 26.67);
        let mut rising = Vec::new();
        let mut falling = Vec::new();
        for t in 1..=650_000u32 {
            let tick = rotation.advance(1.0);
            if tick.index_rising {
                rising.push(t);
            }
            if tick.index_falling {
                falling.push(t);
            }
        }
        assert_eq!(rising, vec![200_000, 400_000, 600_000]);
        assert_eq!(falling, vec![200_020, 400_020, 600_020]);
    }

    #[test]
    fn test_pointer_visits_every_byte_once_per_revolution() {
        let mut rotation = DiskRotation::new(200_000.0, 26.67);
        assert_eq!(rotation.track_len(), 7499);
        let mut seen = vec![0u32; rotation.track_len()];
        for _ in 0..20_000 {
            let tick = rotation.advance(10.0);
            for offset in tick.offsets() {
                seen[offset] += 1;
            }
            assert!(rotation.pointer() < rotation.track_len());
        }
        assert!(seen.iter().all(|&n| n == 1));
        assert_eq!(rotation.revolutions(), 1);
    }

    #[test]
    fn test_large_tick_reports_all_bytes() {
        let mut rotation = DiskRotation::new(200_000.0, 26.67);
        let tick = rotation.advance(1000.0);
        assert_eq!(tick.byte_count(), 37);
        assert_eq!(tick.offsets().next(), Some(1));
        assert_eq!(tick.offsets().last(), Some(37));
    }

    #[test]
    fn test_tick_spanning_revolutions() {
        let mut rotation = DiskRotation::new(200_000.0, 26.67);
        let tick = rotation.advance(500_000.0);
        assert!(tick.index_rising);
        assert_eq!(rotation.revolutions(), 2);
        assert_eq!(tick.offsets().filter(|&offset| offset == 0).count(), 2);
        assert_eq!(tick.byte_count(), 7499 * 2 + 3749);
        // The pulse began 100000us ago, so it has already ended
        assert!(!rotation.index_pulse());

        let tick = rotation.advance(1.0);
        assert!(!tick.index_rising);
        assert_eq!(tick.byte_count(), 0);

        let mut rising = Vec::new();
        for t in 1..=250_000u32 {
            if rotation.advance(1.0).index_rising {
                rising.push(t);
            }
        }
        assert_eq!(rising, vec![99_999]);
    }
}
