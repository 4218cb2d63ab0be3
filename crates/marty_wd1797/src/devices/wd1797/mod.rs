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

    devices::wd1797::mod.rs

    Implements the Western Digital WD1797 floppy disk controller.

    The controller is advanced by the host in microsecond ticks. Each tick updates the
    drive-facing pins, rotates the disk under the head, and steps whichever command state
    machine is active. The host observes the controller through its registers and the INTRQ
    and DRQ pins.
*/

mod command;
mod registers;
mod rotation;
mod search;
mod timer;
mod type1;
mod type2;
mod type3;

pub use command::{
    Command, CommandName, CommandType, InterruptConditions, TransferCommand, TransferFlags, TypeICommand, TypeIFlags,
};
pub use registers::{Pins, StatusRegister, StepDirection};
pub use timer::TimerId;

use crate::{
    bus::{DeviceRunTimeUnit, IoDevice},
    config::ControllerConfig,
    device_types::geometry::DiskGeometry,
    devices::floppy_medium::{FloppyMedium, MediumError, TrackLayout},
    history::HistoryBuffer,
};
use rotation::{DiskRotation, RotationTick};
use search::AddressMarkSearch;
use strum::IntoEnumIterator;
use timer::TimerBank;

pub const WD_STATUS_REGISTER: u16 = 0x00;
pub const WD_TRACK_REGISTER: u16 = 0x01;
pub const WD_SECTOR_REGISTER: u16 = 0x02;
pub const WD_DATA_REGISTER: u16 = 0x03;
pub const WD_CONTROL_LATCH: u16 = 0x04;
pub const WD_AUX_STATUS: u16 = 0x05;

/// Head settling delay before a Type I verify, at a 1MHz clock.
pub const VERIFY_HEAD_SETTLING_US: f64 = 30_000.0;
/// The Type II/III 'E' delay, at a 1MHz clock.
pub const E_DELAY_US: f64 = 30_000.0;
/// HLD is dropped after this many idle revolutions.
pub const HLD_IDLE_REVOLUTIONS: f64 = 15.0;
/// TG43 is asserted for tracks beyond this one.
pub const TG43_TRACK: u8 = 43;

const AUX_STATUS_INTRQ: u8 = 0x01;
const AUX_STATUS_DRQ: u8 = 0x80;
const CMD_LOG_LEN: usize = 32;

/// Progress of the active command. Type I commands use the stepping and verify phases, Type II
/// and III commands the remainder.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Stepping,
    HeadSettle,
    VerifyWaitHlt,
    Verify,
    EDelay,
    WaitHlt,
    SearchId,
    SearchDataMark { bytes: usize },
    ReadData { remaining: usize },
    ReadCrc { count: u8 },
    WriteGap { bytes: usize },
    WriteMark { bytes: usize },
    WriteData { remaining: usize },
    WriteCrc { count: u8 },
    ReadAddress { count: u8 },
    ReadTrack { remaining: usize },
    WriteTrackStart { waited: usize },
    WriteTrack { remaining: usize },
}

#[derive(Clone, Debug, Default)]
pub struct Wd1797DebugState {
    pub status: u8,
    pub track: u8,
    pub sector: u8,
    pub data: u8,
    pub data_shift: u8,
    pub command: u8,
    pub crc: u16,
    pub control_latch: u8,
    pub command_name: CommandName,
    pub command_type: CommandType,
    pub phase: String,
    pub pins: Pins,
    pub current_track: u8,
    pub command_action_done: bool,
    pub command_done: bool,
    pub head_settling_done: bool,
    pub e_delay_done: bool,
    pub start_byte_set: bool,
    pub terminate_command: bool,
    pub rotational_pointer: usize,
    pub image_pointer: usize,
    pub master_clock_us: f64,
    pub timers: Vec<(TimerId, f64)>,
    pub search_zero_run: usize,
    pub search_sync_count: usize,
    pub search_id_collected: usize,
    pub cmd_log: Vec<String>,
}

pub struct Wd1797 {
    config: ControllerConfig,

    data_shift: u8,
    data: u8,
    track: u8,
    sector: u8,
    command: u8,
    status: StatusRegister,
    crc: u16,
    recorded_crc: u16,
    control_latch: u8,

    pins: Pins,
    last_ready: bool,
    current_track: u8,

    current_command: CommandName,
    current_command_type: CommandType,
    type_i_command: TypeICommand,
    type_i: TypeIFlags,
    transfer_command: TransferCommand,
    transfer: TransferFlags,
    conditions: InterruptConditions,

    command_action_done: bool,
    command_done: bool,
    head_settling_done: bool,
    e_delay_done: bool,
    start_byte_set: bool,
    terminate_command: bool,
    delayed_hld: bool,

    phase: Phase,
    search: AddressMarkSearch,
    index_count: u32,
    sector_length: usize,

    master_clock: f64,
    timers: TimerBank,
    rotation: DiskRotation,

    medium: Option<FloppyMedium>,
    image_pointer: usize,

    cmd_log: HistoryBuffer<String>,
}

impl Default for Wd1797 {
    fn default() -> Self {
        Wd1797::new(ControllerConfig::default())
    }
}

impl IoDevice for Wd1797 {
    fn read_u8(&mut self, port: u16, delta: DeviceRunTimeUnit) -> u8 {
        self.catch_up(delta);
        match port.wrapping_sub(self.config.io_base) {
            WD_STATUS_REGISTER => self.read_status(),
            WD_TRACK_REGISTER => self.track,
            WD_SECTOR_REGISTER => self.sector,
            WD_DATA_REGISTER => self.read_data(),
            WD_CONTROL_LATCH => {
                log::warn!("Read from write-only control latch");
                0
            }
            WD_AUX_STATUS => self.aux_status(),
            _ => {
                log::warn!("Read from invalid WD1797 port: {:04X}", port);
                0
            }
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, delta: DeviceRunTimeUnit) {
        self.catch_up(delta);
        match port.wrapping_sub(self.config.io_base) {
            WD_STATUS_REGISTER => self.write_command(data),
            WD_TRACK_REGISTER => self.write_track(data),
            WD_SECTOR_REGISTER => self.write_sector(data),
            WD_DATA_REGISTER => self.write_data(data),
            WD_CONTROL_LATCH => {
                log::trace!("Control latch: {:02X}", data);
                self.control_latch = data;
            }
            WD_AUX_STATUS => {
                log::warn!("Write to read-only aux status port: {:02X}", data);
            }
            _ => {
                log::warn!("Write to invalid WD1797 port: {:04X}", port);
            }
        }
    }

    fn port_list(&self) -> Vec<(String, u16)> {
        let base = self.config.io_base;
        vec![
            (String::from("WD1797 Status/Command Register"), base + WD_STATUS_REGISTER),
            (String::from("WD1797 Track Register"), base + WD_TRACK_REGISTER),
            (String::from("WD1797 Sector Register"), base + WD_SECTOR_REGISTER),
            (String::from("WD1797 Data Register"), base + WD_DATA_REGISTER),
            (String::from("WD1797 Control Latch"), base + WD_CONTROL_LATCH),
            (String::from("WD1797 Aux Status"), base + WD_AUX_STATUS),
        ]
    }
}

impl Wd1797 {
    pub fn new(config: ControllerConfig) -> Self {
        let scale = config.clock.delay_scale();
        let rotation_us = config.rotation_us();
        let timers = TimerBank::new(
            0.0,
            VERIFY_HEAD_SETTLING_US * scale,
            E_DELAY_US * scale,
            HLD_IDLE_REVOLUTIONS * rotation_us,
            config.head_load_ms * 1000.0,
        );
        let rotation = DiskRotation::new(rotation_us, config.encoding.byte_time_us());
        let search = AddressMarkSearch::new(config.encoding);

        let mut fdc = Wd1797 {
            config,
            data_shift: 0,
            data: 0,
            track: 0,
            sector: 0,
            command: 0,
            status: StatusRegister::new(),
            crc: 0,
            recorded_crc: 0,
            control_latch: 0,
            pins: Pins::default(),
            last_ready: false,
            current_track: 0,
            current_command: CommandName::None,
            current_command_type: CommandType::None,
            type_i_command: TypeICommand::default(),
            type_i: TypeIFlags::default(),
            transfer_command: TransferCommand::default(),
            transfer: TransferFlags::default(),
            conditions: InterruptConditions::default(),
            command_action_done: false,
            command_done: true,
            head_settling_done: false,
            e_delay_done: false,
            start_byte_set: false,
            terminate_command: false,
            delayed_hld: false,
            phase: Phase::Idle,
            search,
            index_count: 0,
            sector_length: 0,
            master_clock: 0.0,
            timers,
            rotation,
            medium: None,
            image_pointer: 0,
            cmd_log: HistoryBuffer::new(CMD_LOG_LEN),
        };
        fdc.reset();
        fdc
    }

    /// Create a controller with a medium already inserted.
    pub fn with_medium(config: ControllerConfig, medium: FloppyMedium) -> Result<Self, MediumError> {
        let mut fdc = Wd1797::new(config);
        fdc.load_medium(medium)?;
        Ok(fdc)
    }

    pub fn reset(&mut self) {
        self.data_shift = 0;
        self.data = 0;
        self.track = 0;
        self.sector = 0;
        self.command = 0;
        self.status = StatusRegister::new();
        self.crc = 0;
        self.recorded_crc = 0;
        self.control_latch = 0;

        // The head stays where the drive left it.
        self.pins = Pins {
            ready: self.medium.is_some(),
            ..Default::default()
        };
        self.last_ready = self.pins.ready;
        self.update_drive_lines();

        self.current_command = CommandName::None;
        self.current_command_type = CommandType::None;
        self.type_i_command = TypeICommand::default();
        self.type_i = TypeIFlags::default();
        self.transfer_command = TransferCommand::default();
        self.transfer = TransferFlags::default();
        self.conditions = InterruptConditions::default();

        self.command_action_done = false;
        self.command_done = true;
        self.head_settling_done = false;
        self.e_delay_done = false;
        self.start_byte_set = false;
        self.terminate_command = false;
        self.delayed_hld = false;

        self.phase = Phase::Idle;
        self.search.reset();
        self.index_count = 0;
        self.sector_length = 0;

        self.master_clock = 0.0;
        self.timers.stop_all();
        self.rotation.reset();

        if let Some(medium) = &mut self.medium {
            if let Err(e) = medium.format() {
                log::error!("Failed to reformat medium on reset: {}", e);
            }
        }
        self.image_pointer = 0;

        self.cmd_log.clear();
        self.log_str("WD1797 Reset");
        self.refresh_status();
    }

    /// Insert a medium. The drive becomes ready. A medium laid out for another encoding or
    /// track length is formatted again to match the rotation, keeping its GAP3 length, so that
    /// track offset 0 stays under the index hole. A medium that cannot be reformatted is rejected
    /// and the drive is left as it was.
    pub fn load_medium(&mut self, mut medium: FloppyMedium) -> Result<(), MediumError> {
        let layout = medium.layout();
        if layout.encoding != self.config.encoding || layout.track_len != self.rotation.track_len() {
            log::warn!(
                "Medium layout {:?} does not match controller ({}, {} bytes per track), reformatting",
                layout,
                self.config.encoding,
                self.rotation.track_len()
            );
            medium.set_layout(TrackLayout {
                encoding: self.config.encoding,
                track_len: self.rotation.track_len(),
                gap3: layout.gap3,
            })?;
        }
        log::debug!("Loaded medium with geometry {}", medium.geometry());
        self.medium = Some(medium);
        self.current_track = self.current_track.min(self.max_track());
        self.pins.ready = true;
        Ok(())
    }

    /// Remove the medium. The drive becomes not ready.
    pub fn eject_medium(&mut self) -> Option<FloppyMedium> {
        self.pins.ready = false;
        self.medium.take()
    }

    pub fn medium(&self) -> Option<&FloppyMedium> {
        self.medium.as_ref()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn catch_up(&mut self, delta: DeviceRunTimeUnit) {
        let us = delta.to_us(self.config.system_clock_mhz);
        if us > 0.0 {
            self.run(us);
        }
    }

    /// Advance the controller by `us` microseconds.
    pub fn run(&mut self, us: f64) {
        self.master_clock += us;
        self.status.set_not_ready(!self.pins.ready);
        self.update_drive_lines();

        let tick = self.rotation.advance(us);
        self.pins.index_pulse = self.rotation.index_pulse();
        self.check_interrupt_conditions(tick.index_rising);

        if self.timers[TimerId::HeadLoad].tick(us) {
            log::trace!("HLT asserted");
            self.pins.hlt = true;
        }

        self.refresh_status();

        if !self.command_done {
            self.command_step(us, &tick);
            self.refresh_status();
        }

        self.handle_hld_idle(us);
    }

    fn command_step(&mut self, us: f64, tick: &RotationTick) {
        match self.current_command_type {
            CommandType::I => self.type_i_step(us, tick),
            CommandType::II | CommandType::III => self.transfer_step(us, tick),
            CommandType::IV | CommandType::None => {}
        }
    }

    fn update_drive_lines(&mut self) {
        self.pins.not_track00 = self.current_track != 0;
        self.pins.tg43 = self.current_track > TG43_TRACK;
    }

    /// Compose the status register from the pins relevant to the last command type.
    fn refresh_status(&mut self) {
        self.status.set_busy(!self.command_done);
        match self.current_command_type {
            CommandType::II | CommandType::III => {
                self.status.set_drq(self.pins.drq);
            }
            CommandType::I | CommandType::IV | CommandType::None => {
                self.status.set_index(self.pins.index_pulse);
                self.status.set_head_loaded(self.pins.hld && self.pins.hlt);
                self.status.set_track00(!self.pins.not_track00);
            }
        }
    }

    fn handle_hld_idle(&mut self, us: f64) {
        if !self.command_done || !self.pins.hld {
            self.timers[TimerId::HldIdle].stop();
            return;
        }
        if !self.timers[TimerId::HldIdle].is_running() {
            self.timers[TimerId::HldIdle].start();
        }
        if self.timers[TimerId::HldIdle].tick(us) {
            log::trace!("Head unloaded after {} idle revolutions", HLD_IDLE_REVOLUTIONS);
            self.unload_head();
        }
    }

    fn load_head(&mut self) {
        if !self.pins.hld {
            log::trace!("HLD asserted");
            self.pins.hld = true;
            self.pins.hlt = false;
            self.timers[TimerId::HeadLoad].start();
        }
    }

    fn unload_head(&mut self) {
        self.pins.hld = false;
        self.timers[TimerId::HeadLoad].stop();
    }

    pub fn geometry(&self) -> DiskGeometry {
        match &self.medium {
            Some(medium) => medium.geometry(),
            None => DiskGeometry::new(self.config.cylinders, 2, 9, 512),
        }
    }

    fn max_track(&self) -> u8 {
        self.geometry().cylinders().saturating_sub(1).min(u8::MAX as u16) as u8
    }

    /// The byte passing under the head at the given rotational offset.
    fn medium_byte(&self, offset: usize) -> u8 {
        self.medium.as_ref().map_or(0, |medium| {
            medium.byte_at(self.current_track as u16, self.pins.side_select as u8, offset)
        })
    }

    /// Move the head one track, stopping at the mechanical limits.
    fn step_head(&mut self, direction: StepDirection) {
        self.pins.direction = direction;
        self.current_track = match direction {
            StepDirection::Out => self.current_track.saturating_sub(1),
            StepDirection::In => self.current_track.saturating_add(1).min(self.max_track()),
        };
        self.update_drive_lines();
        log::trace!("Step {:?}: head at track {}", direction, self.current_track);
    }

    // ---------------------------------------------------------------------------------------------
    // Register access

    /// Read the status register. Clears INTRQ.
    pub fn read_status(&mut self) -> u8 {
        self.refresh_status();
        self.pins.intrq = false;
        self.status.byte()
    }

    /// Return the status register without side effects.
    pub fn peek_status(&self) -> u8 {
        self.status.byte()
    }

    pub fn status_register(&self) -> StatusRegister {
        self.status
    }

    pub fn aux_status(&self) -> u8 {
        let mut byte = 0;
        if self.pins.intrq {
            byte |= AUX_STATUS_INTRQ;
        }
        if self.pins.drq {
            byte |= AUX_STATUS_DRQ;
        }
        byte
    }

    pub fn track(&self) -> u8 {
        self.track
    }

    pub fn sector(&self) -> u8 {
        self.sector
    }

    pub fn command_register(&self) -> u8 {
        self.command
    }

    pub fn crc_register(&self) -> u16 {
        self.crc
    }

    pub fn control_latch(&self) -> u8 {
        self.control_latch
    }

    fn busy_write_allowed(&self, register: &str, byte: u8) -> bool {
        if self.command_done {
            return true;
        }
        if self.config.permissive_busy_writes {
            log::debug!("{} register written while busy: {:02X}", register, byte);
            true
        }
        else {
            log::warn!("{} register write rejected while busy: {:02X}", register, byte);
            false
        }
    }

    pub fn write_track(&mut self, byte: u8) {
        if self.busy_write_allowed("Track", byte) {
            self.track = byte;
        }
    }

    pub fn write_sector(&mut self, byte: u8) {
        if self.busy_write_allowed("Sector", byte) {
            self.sector = byte;
        }
    }

    /// Read the data register. Services DRQ during a read transfer.
    pub fn read_data(&mut self) -> u8 {
        if !self.command_done
            && matches!(
                self.current_command,
                CommandName::ReadSector | CommandName::ReadAddress | CommandName::ReadTrack
            )
        {
            self.pins.drq = false;
            self.status.set_drq(false);
        }
        self.data
    }

    /// Write the data register. Services DRQ during a write transfer.
    pub fn write_data(&mut self, byte: u8) {
        if !self.command_done && matches!(self.current_command, CommandName::WriteSector | CommandName::WriteTrack) {
            self.data = byte;
            self.pins.drq = false;
            self.status.set_drq(false);
            return;
        }
        if self.busy_write_allowed("Data", byte) {
            self.data = byte;
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Pins

    pub fn intrq(&self) -> bool {
        self.pins.intrq
    }

    pub fn drq(&self) -> bool {
        self.pins.drq
    }

    pub fn pins(&self) -> Pins {
        self.pins
    }

    pub fn ready(&self) -> bool {
        self.pins.ready
    }

    /// Drive the READY line from the drive interface.
    pub fn set_ready(&mut self, ready: bool) {
        self.pins.ready = ready;
    }

    pub fn busy(&self) -> bool {
        !self.command_done
    }

    pub fn current_track(&self) -> u8 {
        self.current_track
    }

    /// Place the physical head. The position is limited to the drive's cylinders.
    pub fn set_current_track(&mut self, track: u8) {
        self.current_track = track.min(self.max_track());
        self.update_drive_lines();
    }

    pub fn current_command(&self) -> CommandName {
        self.current_command
    }

    pub fn current_command_type(&self) -> CommandType {
        self.current_command_type
    }

    pub fn command_action_done(&self) -> bool {
        self.command_action_done
    }

    pub fn master_clock_us(&self) -> f64 {
        self.master_clock
    }

    pub fn rotational_pointer(&self) -> usize {
        self.rotation.pointer()
    }

    // ---------------------------------------------------------------------------------------------
    // Command dispatch

    /// Write the command register.
    pub fn write_command(&mut self, byte: u8) {
        let command = Command::decode(byte);

        match command {
            Command::ForceInterrupt(conditions) => {
                self.load_command(byte, command);
                self.force_interrupt(conditions);
            }
            _ if !self.command_done => {
                log::warn!(
                    "Command {:02X} ({}) rejected: busy with {}",
                    byte,
                    command.name(),
                    self.current_command
                );
            }
            Command::Restore(flags) => self.start_type_i(byte, command, TypeICommand::Restore, flags),
            Command::Seek(flags) => self.start_type_i(byte, command, TypeICommand::Seek, flags),
            Command::Step(flags) => self.start_type_i(byte, command, TypeICommand::Step, flags),
            Command::StepIn(flags) => self.start_type_i(byte, command, TypeICommand::StepIn, flags),
            Command::StepOut(flags) => self.start_type_i(byte, command, TypeICommand::StepOut, flags),
            Command::ReadSector(flags) => self.start_transfer(byte, command, TransferCommand::ReadSector, flags),
            Command::WriteSector(flags) => self.start_transfer(byte, command, TransferCommand::WriteSector, flags),
            Command::ReadAddress(flags) => self.start_transfer(byte, command, TransferCommand::ReadAddress, flags),
            Command::ReadTrack(flags) => self.start_transfer(byte, command, TransferCommand::ReadTrack, flags),
            Command::WriteTrack(flags) => self.start_transfer(byte, command, TransferCommand::WriteTrack, flags),
        }
        self.refresh_status();
    }

    fn start_type_i(&mut self, byte: u8, command: Command, kind: TypeICommand, flags: TypeIFlags) {
        self.load_command(byte, command);
        self.type_i_command = kind;
        self.setup_type_i(flags);
    }

    fn start_transfer(&mut self, byte: u8, command: Command, kind: TransferCommand, flags: TransferFlags) {
        self.load_command(byte, command);
        self.transfer_command = kind;
        self.setup_transfer(flags);
    }

    fn load_command(&mut self, byte: u8, command: Command) {
        self.command = byte;
        self.pins.intrq = false;
        self.cmd_log.push(format!("{:02X}: {}", byte, command.name()));
        log::debug!("Command {:02X}: {} (type {})", byte, command.name(), command.command_type());

        if let Command::ForceInterrupt(_) = command {
            return;
        }
        self.current_command = command.name();
        self.current_command_type = command.command_type();
        self.conditions = InterruptConditions::default();
        self.terminate_command = false;
        self.command_action_done = false;
        self.head_settling_done = false;
        self.e_delay_done = false;
        self.start_byte_set = false;
        self.search.reset();
        self.index_count = 0;
    }

    fn force_interrupt(&mut self, conditions: InterruptConditions) {
        self.conditions = conditions;
        if conditions.is_empty() {
            self.terminate_command = true;
            self.terminate("force interrupt");
        }
        else if conditions.immediate {
            self.terminate_command = true;
            self.terminate("immediate interrupt");
            self.pins.intrq = true;
        }

        if self.command_done {
            self.current_command = CommandName::ForceInterrupt;
            self.current_command_type = CommandType::IV;
        }
    }

    fn check_interrupt_conditions(&mut self, index_rising: bool) {
        let ready = self.pins.ready;
        let fired = (ready && !self.last_ready && self.conditions.not_ready_to_ready)
            || (!ready && self.last_ready && self.conditions.ready_to_not_ready)
            || (index_rising && self.conditions.index_pulse);
        self.last_ready = ready;

        if fired {
            self.terminate("interrupt condition");
            self.pins.intrq = true;
            self.current_command = CommandName::ForceInterrupt;
            self.current_command_type = CommandType::IV;
        }
    }

    /// Stop an in-flight command without signalling completion.
    fn terminate(&mut self, reason: &str) {
        if !self.command_done {
            log::debug!("{} terminated by {}", self.current_command, reason);
            self.command_done = true;
            self.status.set_busy(false);
            self.phase = Phase::Idle;
            self.timers[TimerId::Step].stop();
        }
    }

    fn complete_command(&mut self, interrupt: bool) {
        self.command_done = true;
        self.status.set_busy(false);
        self.phase = Phase::Idle;
        if interrupt {
            self.pins.intrq = true;
        }
        log::debug!(
            "{} complete, status: {:02X}, track: {}, sector: {}",
            self.current_command,
            self.status.byte(),
            self.track,
            self.sector
        );
    }

    // ---------------------------------------------------------------------------------------------
    // Debug

    pub fn log_str(&mut self, s: &str) {
        self.cmd_log.push(s.to_string());
        log::trace!("{}", s);
    }

    pub fn get_debug_state(&self) -> Wd1797DebugState {
        Wd1797DebugState {
            status: self.status.byte(),
            track: self.track,
            sector: self.sector,
            data: self.data,
            data_shift: self.data_shift,
            command: self.command,
            crc: self.crc,
            control_latch: self.control_latch,
            command_name: self.current_command,
            command_type: self.current_command_type,
            phase: format!("{:?}", self.phase),
            pins: self.pins,
            current_track: self.current_track,
            command_action_done: self.command_action_done,
            command_done: self.command_done,
            head_settling_done: self.head_settling_done,
            e_delay_done: self.e_delay_done,
            start_byte_set: self.start_byte_set,
            terminate_command: self.terminate_command,
            rotational_pointer: self.rotation.pointer(),
            image_pointer: self.image_pointer,
            master_clock_us: self.master_clock,
            timers: TimerId::iter().map(|id| (id, self.timers[id].elapsed())).collect(),
            search_zero_run: self.search.zero_run(),
            search_sync_count: self.search.sync_count(),
            search_id_collected: self.search.id_collected(),
            cmd_log: self.cmd_log.as_vec(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::devices::floppy_medium::{tests::test_image, TrackEncoding};

    pub(crate) fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A controller with a 360K medium inserted.
    pub(crate) fn controller() -> Wd1797 {
        controller_with(DiskGeometry::new(40, 2, 9, 512))
    }

    pub(crate) fn controller_with(geometry: DiskGeometry) -> Wd1797 {
        init_logger();
        let config = ControllerConfig::default();
        let medium = FloppyMedium::from_image(test_image(geometry), geometry, config.track_layout()).unwrap();
        Wd1797::with_medium(config, medium).unwrap()
    }

    pub(crate) fn controller_with_config(config: ControllerConfig) -> Wd1797 {
        init_logger();
        let geometry = DiskGeometry::new(40, 2, 9, 512);
        let medium = FloppyMedium::from_image(test_image(geometry), geometry, config.track_layout()).unwrap();
        Wd1797::with_medium(config, medium).unwrap()
    }

    pub(crate) fn run_for(fdc: &mut Wd1797, us: f64, step: f64) {
        let mut elapsed = 0.0;
        while elapsed < us {
            fdc.run(step);
            elapsed += step;
        }
    }

    /// Run until `done` returns true, returning the time taken, or None if `limit` passes first.
    pub(crate) fn run_until(
        fdc: &mut Wd1797,
        limit: f64,
        step: f64,
        mut done: impl FnMut(&mut Wd1797) -> bool,
    ) -> Option<f64> {
        let mut elapsed = 0.0;
        while elapsed < limit {
            fdc.run(step);
            elapsed += step;
            if done(fdc) {
                return Some(elapsed);
            }
        }
        None
    }

    /// Service every DRQ by reading the data register until the command completes.
    pub(crate) fn read_transfer(fdc: &mut Wd1797, limit: f64) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut elapsed = 0.0;
        while fdc.busy() && elapsed < limit {
            fdc.run(1.0);
            elapsed += 1.0;
            if fdc.drq() {
                bytes.push(fdc.read_data());
            }
        }
        bytes
    }

    /// Service every DRQ with `value`, returning the number of bytes supplied.
    pub(crate) fn write_transfer(fdc: &mut Wd1797, value: u8, limit: f64) -> usize {
        let mut count = 0;
        let mut elapsed = 0.0;
        while fdc.busy() && elapsed < limit {
            fdc.run(1.0);
            elapsed += 1.0;
            if fdc.drq() {
                fdc.write_data(value);
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_reset_state() {
        let fdc = controller();
        assert!(!fdc.busy());
        assert!(fdc.ready());
        assert!(!fdc.intrq());
        assert_eq!(fdc.current_command(), CommandName::None);
        // Track 0 is reported in the Type I status after reset
        assert_eq!(fdc.peek_status(), 0x04);
    }

    #[test]
    fn test_no_medium_is_not_ready() {
        init_logger();
        let mut fdc = Wd1797::default();
        fdc.run(1.0);
        assert!(!fdc.ready());
        assert_eq!(fdc.read_status() & 0x80, 0x80);
    }

    #[test]
    fn test_data_register_round_trip() {
        let mut fdc = controller();
        fdc.write_data(0x5A);
        assert_eq!(fdc.read_data(), 0x5A);
        fdc.write_u8(0xB3, 0xA5, DeviceRunTimeUnit::Microseconds(0.0));
        assert_eq!(fdc.read_u8(0xB3, DeviceRunTimeUnit::Microseconds(0.0)), 0xA5);
    }

    #[test]
    fn test_port_decoding() {
        let mut fdc = controller();
        let none = DeviceRunTimeUnit::Microseconds(0.0);
        assert_eq!(fdc.port_list().len(), 6);

        fdc.write_u8(0xB1, 12, none);
        fdc.write_u8(0xB2, 4, none);
        assert_eq!(fdc.read_u8(0xB1, none), 12);
        assert_eq!(fdc.read_u8(0xB2, none), 4);

        fdc.write_u8(0xB4, 0x29, none);
        assert_eq!(fdc.control_latch(), 0x29);
        assert_eq!(fdc.read_u8(0xB4, none), 0);

        // Writes to the aux status port and to unmapped ports are ignored
        fdc.write_u8(0xB5, 0xFF, none);
        fdc.write_u8(0xB9, 0xFF, none);
        assert_eq!(fdc.read_u8(0xB9, none), 0);
        assert_eq!(fdc.read_u8(0x10, none), 0);
        assert_eq!(fdc.track(), 12);
    }

    #[test]
    fn test_port_access_catches_up() {
        let mut fdc = controller();
        // The first index pulse arrives after one revolution
        let status = fdc.read_u8(0xB0, DeviceRunTimeUnit::Microseconds(200_000.0));
        assert_eq!(fdc.master_clock_us(), 200_000.0);
        assert_eq!(status & 0x02, 0x02);

        // 100 ticks at 5MHz is 20us, which ends the pulse
        let status = fdc.read_u8(0xB0, DeviceRunTimeUnit::SystemTicks(100));
        assert_eq!(status & 0x02, 0x00);
    }

    #[test]
    fn test_index_pulse_in_type_i_status() {
        let mut fdc = controller();
        let rise = run_until(&mut fdc, 300_000.0, 1.0, |fdc| fdc.peek_status() & 0x02 != 0);
        assert_eq!(rise, Some(200_000.0));
        let fall = run_until(&mut fdc, 100.0, 1.0, |fdc| fdc.peek_status() & 0x02 == 0);
        assert_eq!(fall, Some(20.0));
    }

    #[test]
    fn test_status_read_clears_intrq() {
        let mut fdc = controller();
        fdc.write_command(0xD8);
        assert!(fdc.intrq());
        assert_eq!(fdc.aux_status() & 0x01, 0x01);
        fdc.read_status();
        assert!(!fdc.intrq());
    }

    #[test]
    fn test_busy_rejects_commands() {
        let mut fdc = controller();
        fdc.set_current_track(5);
        fdc.write_command(0x03);
        assert!(fdc.busy());
        fdc.write_command(0x88);
        assert_eq!(fdc.current_command(), CommandName::Restore);
        assert_eq!(fdc.command_register(), 0x03);
        assert!(fdc.busy());
    }

    #[test]
    fn test_permissive_busy_writes() {
        let mut fdc = controller();
        fdc.set_current_track(5);
        fdc.write_command(0x03);
        fdc.write_sector(7);
        assert_eq!(fdc.sector(), 7);

        let config = ControllerConfig {
            permissive_busy_writes: false,
            ..Default::default()
        };
        let mut strict = Wd1797::new(config);
        strict.set_current_track(5);
        strict.write_command(0x03);
        strict.write_sector(7);
        strict.write_track(9);
        assert_eq!(strict.sector(), 0);
        assert_eq!(strict.track(), 0);
    }

    #[test]
    fn test_force_interrupt_terminates_without_intrq() {
        let mut fdc = controller();
        fdc.set_current_track(10);
        fdc.write_command(0x03);
        run_for(&mut fdc, 10_000.0, 10.0);
        assert!(fdc.busy());

        fdc.write_command(0xD0);
        assert!(!fdc.busy());
        assert!(!fdc.intrq());
        assert_eq!(fdc.peek_status() & 0x01, 0);
        assert_eq!(fdc.current_command_type(), CommandType::IV);
        assert!(fdc.get_debug_state().terminate_command);

        // The head stays where it was stopped
        let track = fdc.current_track();
        run_for(&mut fdc, 100_000.0, 100.0);
        assert_eq!(fdc.current_track(), track);
    }

    #[test]
    fn test_force_interrupt_immediate() {
        let mut fdc = controller();
        fdc.set_current_track(10);
        fdc.write_command(0x03);
        fdc.write_command(0xD8);
        assert!(!fdc.busy());
        assert!(fdc.intrq());
    }

    #[test]
    fn test_force_interrupt_on_index_pulse() {
        let mut fdc = controller();
        fdc.write_command(0xD4);
        assert!(!fdc.intrq());
        let fired = run_until(&mut fdc, 250_000.0, 1.0, |fdc| fdc.intrq());
        assert_eq!(fired, Some(200_000.0));

        // Every index pulse interrupts until another command is loaded
        fdc.read_status();
        let fired = run_until(&mut fdc, 250_000.0, 1.0, |fdc| fdc.intrq());
        assert_eq!(fired, Some(200_000.0));
    }

    #[test]
    fn test_commands_reach_their_state_machines() {
        for byte in [0x00, 0x10, 0x20, 0x40, 0x60] {
            let mut fdc = controller();
            fdc.set_current_track(5);
            fdc.write_track(5);
            fdc.write_data(10);
            fdc.write_command(byte);
            fdc.run(1.0);
            assert_eq!(fdc.get_debug_state().phase, "Stepping", "command {:02X}", byte);
        }

        for (byte, expected) in [
            (0x80, "SearchId"),
            (0xA0, "SearchId"),
            (0xC0, "SearchId"),
            (0xE0, "ReadTrack"),
            (0xF0, "WriteTrackStart"),
        ] {
            let mut fdc = controller();
            fdc.write_command(byte);
            run_for(&mut fdc, 45_000.0, 1.0);
            let phase = fdc.get_debug_state().phase;
            assert!(phase.starts_with(expected), "command {:02X} in phase {}", byte, phase);
        }
    }

    #[test]
    fn test_load_medium_matches_rotation() {
        init_logger();
        let geometry = DiskGeometry::new(40, 2, 9, 512);
        let layout = TrackLayout {
            track_len: 8000,
            ..ControllerConfig::default().track_layout()
        };
        let medium = FloppyMedium::from_image(test_image(geometry), geometry, layout).unwrap();

        let mut fdc = Wd1797::new(ControllerConfig::default());
        fdc.load_medium(medium).unwrap();
        assert!(fdc.ready());
        let medium = fdc.medium().unwrap();
        assert_eq!(medium.track_byte_length(), 7499);
        assert_eq!(medium.track(0, 0).unwrap().len(), 7499);

        // A medium that will not fit the controller's tracks is refused
        let config = ControllerConfig {
            encoding: TrackEncoding::Fm,
            ..Default::default()
        };
        let medium = FloppyMedium::from_image(test_image(geometry), geometry, layout).unwrap();
        let mut fdc = Wd1797::new(config);
        assert!(matches!(fdc.load_medium(medium), Err(MediumError::TrackOverflow { .. })));
        assert!(!fdc.ready());
        assert!(fdc.medium().is_none());
    }

    #[test]
    fn test_long_run_keeps_index_timing() {
        let mut fdc = controller();
        fdc.run(150_000.0);
        fdc.write_command(0xD4);
        // Three index pulses pass during one long run
        fdc.run(500_000.0);
        assert!(fdc.intrq());
        fdc.read_status();

        let mut fired = Vec::new();
        let mut now = 650_000.0;
        while now < 900_000.0 {
            fdc.run(1.0);
            now += 1.0;
            if fdc.intrq() {
                fired.push(now);
                fdc.read_status();
            }
        }
        assert_eq!(fired, vec![800_000.0]);
        assert_eq!(fdc.master_clock_us(), 900_000.0);
    }

    #[test]
    fn test_force_interrupt_on_ready_transition() {
        let mut fdc = controller();
        fdc.set_current_track(10);
        fdc.write_command(0x03);
        fdc.write_command(0xD2);
        // Armed conditions leave the command running
        assert!(fdc.busy());
        fdc.run(10.0);
        assert!(fdc.busy());

        fdc.set_ready(false);
        fdc.run(10.0);
        assert!(!fdc.busy());
        assert!(fdc.intrq());

        fdc.read_status();
        fdc.write_command(0xD1);
        fdc.set_ready(true);
        fdc.run(10.0);
        assert!(fdc.intrq());
    }

    #[test]
    fn test_hld_drops_after_idle_revolutions() {
        let mut fdc = controller();
        fdc.write_command(0x08);
        fdc.run(1.0);
        assert!(!fdc.busy());
        assert!(fdc.pins().hld);

        run_for(&mut fdc, 2_999_000.0, 100.0);
        assert!(fdc.pins().hld);
        run_for(&mut fdc, 2_000.0, 100.0);
        assert!(!fdc.pins().hld);
    }

    #[test]
    fn test_head_loaded_status_after_hlt() {
        let mut fdc = controller();
        fdc.write_command(0x08);
        fdc.run(1.0);
        assert_eq!(fdc.peek_status() & 0x20, 0);
        let loaded = run_until(&mut fdc, 100_000.0, 1.0, |fdc| fdc.peek_status() & 0x20 != 0);
        assert_eq!(loaded, Some(44_999.0));
    }

    #[test]
    fn test_debug_state() {
        let mut fdc = controller();
        fdc.write_command(0x08);
        fdc.run(1.0);
        let state = fdc.get_debug_state();
        assert_eq!(state.command, 0x08);
        assert_eq!(state.command_name, CommandName::Restore);
        assert_eq!(state.timers.len(), 5);
        assert_eq!(state.cmd_log, vec!["WD1797 Reset".to_string(), "08: Restore".to_string()]);
        assert_eq!(state.master_clock_us, 1.0);
    }
}
