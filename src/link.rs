//! Link layer between the device logic and the physical pins.
//!
//! `Link` is the capability set every chip-level sequence is written against: shift the
//! instruction register, shift an 8 or 16 bit data register, and move TCLK.  Both physical
//! encodings share the TAP sequencing in `Tap`; they only differ in how one TAP bit-cycle is put
//! on the wires, which is what the `Wire` trait captures.
//!
//! Data is clocked out least significant bit first.  Captured TDO bits are accumulated by
//! shifting left, so the first bit captured ends up in the most significant position.
use alloc::vec::Vec;

use crate::statemachine::JtagState;

pub mod j4w;
pub mod sbw;

pub trait Link {
    /// Shift 8 bits through the instruction register, returning the captured bits
    fn ir_shift(&mut self, ir: u8) -> u8;
    /// Shift 8 bits through the data register
    fn dr_shift_8(&mut self, dr: u8) -> u8;
    /// Shift 16 bits through the data register
    fn dr_shift_16(&mut self, dr: u16) -> u16;
    /// Drive TCLK low
    fn tclk_clear(&mut self);
    /// Drive TCLK high
    fn tclk_set(&mut self);

    /// Give `count` full TCLK pulses, ending high
    fn tclk_strobe(&mut self, count: u32) {
        for _ in 0..count {
            self.tclk_clear();
            self.tclk_set();
        }
    }
}

/// Bring-up and teardown of the debug connection.  Kept apart from `Link` because the chip
/// sequences never need it between attach and detach.
pub trait Connect {
    /// Run the entry sequence that hands the target pins to the debug logic, then reset the TAP
    fn connect(&mut self);
    /// Force the TAP controller through Test-Logic-Reset into Run-Test/Idle
    fn reset_tap(&mut self);
    /// Hand the pins back to the application
    fn release(&mut self);
}

/// One physical encoding of a TAP bit-cycle.
pub trait Wire {
    /// Present `tms` and `tdi` for one TAP clock and return the sampled TDO.  `tclk` is the
    /// latched TCLK level the data line must be left at when the cycle ends.
    fn cycle(&mut self, tms: bool, tdi: bool, tclk: bool) -> bool;
    /// Move TCLK from `from` to `to` while the TAP sits in Run-Test/Idle
    fn tclk(&mut self, from: bool, to: bool);
    /// Entry sequence putting the target into JTAG/SBW mode
    fn enter(&mut self);
    /// Release the target pins
    fn exit(&mut self);
}

/// TAP sequencer shared by both encodings.  Keeps the latched TCLK level as session state: every
/// shift leaves the line at this level and only `tclk_set`/`tclk_clear` change it.
pub struct Tap<W> {
    pub wire: W,
    state: JtagState,
    tclk: bool,
    to_shift_ir: Vec<bool>,
    to_shift_dr: Vec<bool>,
    to_idle: Vec<bool>,
}

impl<W: Wire> Tap<W> {
    pub fn new(wire: W) -> Self {
        Self {
            wire,
            state: JtagState::Idle,
            tclk: true,
            to_shift_ir: JtagState::Idle.path_to(JtagState::ShiftIR),
            to_shift_dr: JtagState::Idle.path_to(JtagState::ShiftDR),
            // The final shifted bit already moves Shift-xR to Exit1-xR
            to_idle: JtagState::Exit1DR.path_to(JtagState::Idle),
        }
    }

    /// The latched TCLK level
    pub fn tclk(&self) -> bool {
        self.tclk
    }

    /// Last state the sequencer drove the TAP into
    pub fn state(&self) -> JtagState {
        self.state
    }

    fn walk(&mut self, path: &[bool]) {
        let tclk = self.tclk;
        for &tms in path {
            self.wire.cycle(tms, tclk, tclk);
            self.state = self.state.next(tms);
        }
    }

    fn shift(&mut self, register: JtagState, bits: u32, mut data: u32) -> u32 {
        let entry = if register == JtagState::ShiftIR {
            core::mem::take(&mut self.to_shift_ir)
        } else {
            core::mem::take(&mut self.to_shift_dr)
        };
        self.walk(&entry);
        debug_assert!(self.state.is_shift());
        if register == JtagState::ShiftIR {
            self.to_shift_ir = entry;
        } else {
            self.to_shift_dr = entry;
        }

        let tclk = self.tclk;
        let mut out = 0;
        for i in 0..bits {
            let last = i + 1 == bits;
            let tdo = self.wire.cycle(last, data & 1 != 0, tclk);
            data >>= 1;
            out = (out << 1) | tdo as u32;
        }
        self.state = self.state.next(true);

        let exit = core::mem::take(&mut self.to_idle);
        self.walk(&exit);
        self.to_idle = exit;
        out
    }
}

impl<W: Wire> Link for Tap<W> {
    fn ir_shift(&mut self, ir: u8) -> u8 {
        self.shift(JtagState::ShiftIR, 8, ir as u32) as u8
    }

    fn dr_shift_8(&mut self, dr: u8) -> u8 {
        self.shift(JtagState::ShiftDR, 8, dr as u32) as u8
    }

    fn dr_shift_16(&mut self, dr: u16) -> u16 {
        self.shift(JtagState::ShiftDR, 16, dr as u32) as u16
    }

    fn tclk_clear(&mut self) {
        self.wire.tclk(self.tclk, false);
        self.tclk = false;
    }

    fn tclk_set(&mut self) {
        self.wire.tclk(self.tclk, true);
        self.tclk = true;
    }
}

impl<W: Wire> Connect for Tap<W> {
    fn connect(&mut self) {
        self.wire.enter();
        self.reset_tap();
    }

    fn reset_tap(&mut self) {
        // Five TMS-high clocks reach Test-Logic-Reset from any state; one more for margin
        let tclk = self.tclk;
        for _ in 0..6 {
            self.wire.cycle(true, tclk, tclk);
        }
        self.wire.cycle(false, tclk, tclk);
        self.state = JtagState::Idle;
    }

    fn release(&mut self) {
        self.wire.exit();
        self.state = JtagState::Reset;
    }
}
