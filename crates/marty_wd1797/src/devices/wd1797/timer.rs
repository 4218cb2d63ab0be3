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

//! Named microsecond timers for the controller's internal delays.

use std::ops::{Index, IndexMut};
use strum::EnumCount;
use strum_macros::{Display, EnumCount, EnumIter};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerMode {
    /// Stops when it expires.
    OneShot,
    /// Carries any overshoot into the next period when it expires.
    Periodic,
}

#[derive(Copy, Clone, Debug)]
pub struct Timer {
    elapsed: f64,
    limit: f64,
    mode: TimerMode,
    running: bool,
}

impl Timer {
    pub const fn new(limit: f64, mode: TimerMode) -> Self {
        Self {
            elapsed: 0.0,
            limit,
            mode,
            running: false,
        }
    }

    /// Start the timer from zero.
    pub fn start(&mut self) {
        self.elapsed = 0.0;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.elapsed = 0.0;
        self.running = false;
    }

    pub fn set_limit(&mut self, limit: f64) {
        self.limit = limit;
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advance the timer by `us` microseconds. Returns true if the timer expired on this tick.
    pub fn tick(&mut self, us: f64) -> bool {
        self.expirations(us) > 0
    }

    /// Advance the timer by `us` microseconds, returning how many times it expired. A periodic
    /// timer can expire several times in one long tick; a one-shot timer at most once.
    pub fn expirations(&mut self, us: f64) -> u32 {
        if !self.running {
            return 0;
        }
        self.elapsed += us;
        if self.elapsed < self.limit {
            return 0;
        }
        match self.mode {
            TimerMode::OneShot => {
                self.elapsed = self.limit;
                self.running = false;
                1
            }
            TimerMode::Periodic if self.limit <= 0.0 => {
                self.elapsed = 0.0;
                1
            }
            TimerMode::Periodic => {
                let periods = (self.elapsed / self.limit).floor();
                self.elapsed = (self.elapsed - periods * self.limit).max(0.0);
                periods as u32
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumCount, EnumIter)]
pub enum TimerId {
    Step,
    HeadSettle,
    EDelay,
    HldIdle,
    HeadLoad,
}

/// The controller's timers, indexed by [TimerId].
#[derive(Clone, Debug)]
pub struct TimerBank {
    timers: [Timer; TimerId::COUNT],
}

impl TimerBank {
    pub fn new(step_us: f64, settle_us: f64, e_delay_us: f64, hld_idle_us: f64, head_load_us: f64) -> Self {
        let mut timers = [Timer::new(0.0, TimerMode::OneShot); TimerId::COUNT];
        timers[TimerId::Step as usize] = Timer::new(step_us, TimerMode::Periodic);
        timers[TimerId::HeadSettle as usize] = Timer::new(settle_us, TimerMode::OneShot);
        timers[TimerId::EDelay as usize] = Timer::new(e_delay_us, TimerMode::OneShot);
        timers[TimerId::HldIdle as usize] = Timer::new(hld_idle_us, TimerMode::OneShot);
        timers[TimerId::HeadLoad as usize] = Timer::new(head_load_us, TimerMode::OneShot);
        Self { timers }
    }

    pub fn stop_all(&mut self) {
        self.timers.iter_mut().for_each(|t| t.stop());
    }
}

impl Index<TimerId> for TimerBank {
    type Output = Timer;

    fn index(&self, id: TimerId) -> &Timer {
        &self.timers[id as usize]
    }
}

impl IndexMut<TimerId> for TimerBank {
    fn index_mut(&mut self, id: TimerId) -> &mut Timer {
        &mut self.timers[id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_one_shot_expires_once() {
        let mut timer = Timer::new(10.0, TimerMode::OneShot);
        assert!(!timer.tick(100.0));
        timer.start();
        let expiries = (0..20).filter(|_| timer.tick(1.0)).count();
        assert_eq!(expiries, 1);
        assert!(!timer.is_running());
    }

    #[test]
    fn test_periodic_carries_overshoot() {
        let mut timer = Timer::new(10.0, TimerMode::Periodic);
        timer.start();
        assert!(!timer.tick(7.0));
        assert!(timer.tick(7.0));
        assert_eq!(timer.elapsed(), 4.0);
        assert!(!timer.tick(5.0));
        assert!(timer.tick(1.0));
    }

    #[test]
    fn test_periodic_counts_every_period_in_long_tick() {
        let mut timer = Timer::new(200_000.0, TimerMode::Periodic);
        timer.start();
        timer.tick(150_000.0);
        assert_eq!(timer.expirations(500_000.0), 3);
        assert_eq!(timer.elapsed(), 50_000.0);
        // Nothing is left over to expire on the next small tick
        assert_eq!(timer.expirations(1.0), 0);
        assert_eq!(timer.expirations(149_999.0), 1);
        assert_eq!(timer.elapsed(), 0.0);
    }

    #[test]
    fn test_bank_indexing() {
        let mut bank = TimerBank::new(6_000.0, 30_000.0, 30_000.0, 3_000_000.0, 45_000.0);
        bank[TimerId::Step].start();
        assert!(bank[TimerId::Step].tick(6_000.0));
        assert_eq!(bank[TimerId::HeadLoad].limit(), 45_000.0);
        bank.stop_all();
        assert!(TimerId::iter().all(|id| !bank[id].is_running()));
    }
}
