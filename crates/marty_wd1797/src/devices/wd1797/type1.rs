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

    devices::wd1797::type1.rs

    Type I commands: RESTORE, SEEK, STEP, STEP IN and STEP OUT, with optional verification
    of the destination track.
*/

use super::{
    rotation::RotationTick,
    search::{SearchEvent, MAX_INDEX_PULSES},
    Phase, StepDirection, TimerId, TypeICommand, TypeIFlags, Wd1797,
};

impl Wd1797 {
    pub(super) fn setup_type_i(&mut self, flags: TypeIFlags) {
        self.type_i = flags;
        self.status.reset_type_i();
        self.command_done = false;
        self.phase = Phase::Stepping;
        self.delayed_hld = false;

        match (flags.head_load, flags.verify) {
            (true, _) => self.load_head(),
            (false, false) => self.unload_head(),
            // The head is loaded when verification begins.
            (false, true) => self.delayed_hld = true,
        }

        match self.type_i_command {
            TypeICommand::StepIn => self.pins.direction = StepDirection::In,
            TypeICommand::StepOut => self.pins.direction = StepDirection::Out,
            // STEP repeats the last direction
            TypeICommand::Restore | TypeICommand::Seek | TypeICommand::Step => {}
        }

        let step_us = flags.step_rate_ms() * 1000.0 * self.config.clock.delay_scale();
        self.timers[TimerId::Step].set_limit(step_us);
        self.timers[TimerId::Step].start();
        log::trace!("{}: step rate {}us, {:?}", self.current_command, step_us, flags);
    }

    pub(super) fn type_i_step(&mut self, us: f64, tick: &RotationTick) {
        match self.phase {
            Phase::Stepping => self.stepping(us),
            Phase::HeadSettle => {
                if self.timers[TimerId::HeadSettle].tick(us) {
                    self.head_settling_done = true;
                    self.phase = Phase::VerifyWaitHlt;
                }
            }
            Phase::VerifyWaitHlt => {
                if self.pins.hlt {
                    self.search.reset();
                    self.index_count = 0;
                    self.phase = Phase::Verify;
                }
            }
            Phase::Verify => self.verify(tick),
            _ => {}
        }
    }

    /// Step the head at the step rate. A long tick may cover several step periods.
    fn stepping(&mut self, us: f64) {
        match self.type_i_command {
            TypeICommand::Restore => {
                if self.current_track == 0 {
                    self.track = 0;
                    self.step_action_done();
                    return;
                }
                for _ in 0..self.timers[TimerId::Step].expirations(us) {
                    self.step_head(StepDirection::Out);
                    if self.current_track == 0 {
                        self.track = 0;
                        self.step_action_done();
                        break;
                    }
                }
            }
            TypeICommand::Seek => {
                if self.track == self.data {
                    self.step_action_done();
                    return;
                }
                let direction = if self.data > self.track {
                    StepDirection::In
                }
                else {
                    StepDirection::Out
                };
                self.pins.direction = direction;

                for _ in 0..self.timers[TimerId::Step].expirations(us) {
                    self.track = match direction {
                        StepDirection::In => self.track.wrapping_add(1),
                        StepDirection::Out => self.track.wrapping_sub(1),
                    };
                    self.step_head(direction);
                    if self.track == self.data {
                        self.step_action_done();
                        break;
                    }
                }
            }
            TypeICommand::Step | TypeICommand::StepIn | TypeICommand::StepOut => {
                let direction = self.pins.direction;
                let at_stop = match direction {
                    StepDirection::Out => self.current_track == 0,
                    StepDirection::In => self.current_track >= self.max_track(),
                };
                if at_stop {
                    log::debug!("{}: head already at track {}", self.type_i_command, self.current_track);
                    // TR00 forces the track register to zero whatever the update flag says.
                    if direction == StepDirection::Out {
                        self.track = 0;
                    }
                    self.step_action_done();
                }
                else if self.timers[TimerId::Step].tick(us) {
                    self.step_head(direction);
                    if self.type_i.track_update {
                        self.track = match direction {
                            StepDirection::In => self.track.wrapping_add(1),
                            StepDirection::Out => self.track.wrapping_sub(1),
                        };
                    }
                    self.step_action_done();
                }
            }
        }
    }

    fn step_action_done(&mut self) {
        self.command_action_done = true;
        self.timers[TimerId::Step].stop();

        if !self.type_i.verify {
            self.complete_command(self.config.intrq_without_verify);
            return;
        }

        if self.delayed_hld {
            self.delayed_hld = false;
            self.load_head();
        }
        self.timers[TimerId::HeadSettle].start();
        self.phase = Phase::HeadSettle;
    }

    /// Look for an ID field whose track matches the track register.
    fn verify(&mut self, tick: &RotationTick) {
        for offset in tick.offsets() {
            if offset == 0 {
                self.index_count += 1;
                if self.index_count >= MAX_INDEX_PULSES {
                    log::debug!("Verify found no ID for track {}", self.track);
                    self.status.set_seek_error(true);
                    self.complete_command(true);
                    return;
                }
            }

            if let SearchEvent::IdField(id) = self.search.feed(self.medium_byte(offset)) {
                if !id.crc_valid {
                    self.status.set_crc_error(true);
                }
                else if id.track == self.track {
                    self.status.set_crc_error(false);
                    self.complete_command(true);
                    return;
                }
            }
        }
    }
}
