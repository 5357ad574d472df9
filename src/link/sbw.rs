//! Spy-Bi-Wire: TMS, TDI and TDO time-multiplexed onto the bidirectional SBWTDIO line, clocked
//! by SBWTCK.  There is no TCLK line.  While the TAP idles, the level SBWTDIO holds in the TDI
//! slot is what the target sees as TCLK, so every cycle leaves the line at the latched level.
//!
//! The low phase of SBWTCK must stay below 7 µs or the target drops out of SBW mode; keep the
//! phase delay well under that and never let anything else run while the clock is low.
use embedded_hal::{delay::DelayNs, digital::OutputPin};

use crate::link::j4w::drive;
use crate::link::{Tap, Wire};

/// Phase delay used when none is given, ~0.27 µs
pub const DEFAULT_PHASE_DELAY_NS: u32 = 270;

/// A pin that can switch between driving and sampling.
pub trait InputOutputPin {
    fn set_as_output(&mut self);
    fn set_as_input(&mut self);
    fn set_high(&mut self, high: bool);
    fn is_high(&mut self) -> bool;
}

pub struct Sbw<Tck, Tdio, Delay> where Tck: OutputPin, Tdio: InputOutputPin, Delay: DelayNs {
    phase_delay: u32,
    delay: Delay,
    tck: Tck,
    tdio: Tdio,
}

impl<Tck, Tdio, Delay> Sbw<Tck, Tdio, Delay> where Tck: OutputPin, Tdio: InputOutputPin, Delay: DelayNs {
    /// `phase_delay_ns` must be validated against the target silicon
    pub fn new(phase_delay_ns: u32, tck: Tck, tdio: Tdio, delay: Delay) -> Self {
        Sbw { phase_delay: phase_delay_ns, delay, tck, tdio }
    }

    pub fn into_link(self) -> Tap<Self> {
        Tap::new(self)
    }

    fn wait(&mut self) {
        self.delay.delay_ns(self.phase_delay);
    }

    /// TMS slot.  After the falling edge the line is moved to `restore` so that the following TDI
    /// slot starts from the latched TCLK level.
    fn tms_slot(&mut self, tms: bool, restore: bool) {
        self.tdio.set_high(tms);
        self.wait();
        drive(&mut self.tck, false);
        self.wait();
        self.tdio.set_high(restore);
        drive(&mut self.tck, true);
    }

    fn tdi_slot(&mut self, tdi: bool) {
        self.tdio.set_high(tdi);
        self.wait();
        drive(&mut self.tck, false);
        self.wait();
        drive(&mut self.tck, true);
    }

    /// TDO slot.  The target drives the line while SBWTCK is low; once it is high again we take
    /// the line back at the latched TCLK level.
    fn tdo_slot(&mut self, tclk: bool) -> bool {
        self.tdio.set_as_input();
        self.wait();
        drive(&mut self.tck, false);
        self.wait();
        let tdo = self.tdio.is_high();
        self.wait();
        drive(&mut self.tck, true);
        self.tdio.set_high(tclk);
        self.tdio.set_as_output();
        tdo
    }
}

impl<Tck, Tdio, Delay> Wire for Sbw<Tck, Tdio, Delay> where Tck: OutputPin, Tdio: InputOutputPin, Delay: DelayNs {
    fn cycle(&mut self, tms: bool, tdi: bool, tclk: bool) -> bool {
        self.tms_slot(tms, tclk);
        self.tdi_slot(tdi);
        self.tdo_slot(tclk)
    }

    fn tclk(&mut self, from: bool, to: bool) {
        // A TMS-low cycle keeps the TAP in Run-Test/Idle; the TDI slot carries the new level
        self.tms_slot(false, from);
        self.tdi_slot(to);
        self.tdo_slot(to);
    }

    fn enter(&mut self) {
        // SBWTCK low resets the SBW logic, SBWTDIO high keeps RST released, then SBWTCK high
        // enables Spy-Bi-Wire
        self.tdio.set_as_output();
        drive(&mut self.tck, false);
        self.delay.delay_ms(4);
        self.tdio.set_high(true);
        drive(&mut self.tck, true);
        self.delay.delay_ms(20);
    }

    fn exit(&mut self) {
        // Holding SBWTCK low for longer than 100 µs leaves SBW mode
        drive(&mut self.tck, false);
        self.delay.delay_ms(1);
        self.tdio.set_high(true);
    }
}
