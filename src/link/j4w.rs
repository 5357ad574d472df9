//! Classic 4-wire JTAG on GPIO pins.  TMS, TCK, TDI and TDO are separate lines; the MSP430 reads
//! TCLK from TDI while its TAP sits in Run-Test/Idle, so TCLK moves without any TCK edge.
use embedded_hal::{delay::DelayNs, digital::{InputPin, OutputPin, PinState}};

use crate::link::{Tap, Wire};

/// Drive a GPIO.  Writes on every supported board are infallible, so the result carries nothing.
pub(crate) fn drive<P: OutputPin>(pin: &mut P, level: bool) {
    let _ = pin.set_state(PinState::from(level));
}

pub struct J4w<Tck, Tms, Tdi, Tdo, Rst, Tst, Delay>
    where Tck: OutputPin, Tms: OutputPin, Tdi: OutputPin, Tdo: InputPin, Rst: OutputPin, Tst: OutputPin, Delay: DelayNs
{
    half_period: u32,
    delay: Delay,
    tck: Tck,
    tms: Tms,
    tdi: Tdi,
    tdo: Tdo,
    rst: Rst,
    tst: Tst,
}

impl<Tck, Tms, Tdi, Tdo, Rst, Tst, Delay> J4w<Tck, Tms, Tdi, Tdo, Rst, Tst, Delay>
    where Tck: OutputPin, Tms: OutputPin, Tdi: OutputPin, Tdo: InputPin, Rst: OutputPin, Tst: OutputPin, Delay: DelayNs
{
    /// Create a 4-wire link clocking TCK at roughly `freq_khz`
    #[allow(clippy::too_many_arguments)]
    pub fn new(freq_khz: u32, tck: Tck, tms: Tms, tdi: Tdi, tdo: Tdo, rst: Rst, tst: Tst, delay: Delay) -> Self {
        let period_ns = 1_000_000 / freq_khz.max(1);
        let half_period = period_ns / 2;
        J4w { half_period, delay, tck, tms, tdi, tdo, rst, tst }
    }

    /// Wrap into the shared TAP sequencer
    pub fn into_link(self) -> Tap<Self> {
        Tap::new(self)
    }
}

impl<Tck, Tms, Tdi, Tdo, Rst, Tst, Delay> Wire for J4w<Tck, Tms, Tdi, Tdo, Rst, Tst, Delay>
    where Tck: OutputPin, Tms: OutputPin, Tdi: OutputPin, Tdo: InputPin, Rst: OutputPin, Tst: OutputPin, Delay: DelayNs
{
    fn cycle(&mut self, tms: bool, tdi: bool, _tclk: bool) -> bool {
        // Target samples TMS/TDI on the rising edge and updates TDO on the falling one
        drive(&mut self.tck, false);
        drive(&mut self.tms, tms);
        drive(&mut self.tdi, tdi);
        self.delay.delay_ns(self.half_period);
        let tdo = self.tdo.is_high().unwrap_or(false);
        drive(&mut self.tck, true);
        self.delay.delay_ns(self.half_period);
        tdo
    }

    fn tclk(&mut self, _from: bool, to: bool) {
        drive(&mut self.tdi, to);
        self.delay.delay_ns(self.half_period);
    }

    fn enter(&mut self) {
        // TEST high selects the JTAG pins on devices that share them, RST stays released
        drive(&mut self.rst, true);
        drive(&mut self.tst, true);
        drive(&mut self.tck, true);
        drive(&mut self.tms, true);
        drive(&mut self.tdi, true);
        self.delay.delay_ms(20);
    }

    fn exit(&mut self) {
        drive(&mut self.tst, false);
        drive(&mut self.rst, true);
        self.delay.delay_ms(1);
    }
}
