//! MSP430 (1xx/2xx/4xx) debug access over a JTAG or Spy-Bi-Wire link.
//!
//! The CPU is driven through the JTAG control signal register and the memory address/data
//! registers, with TCLK standing in for the CPU clock.  Breakpoints go through the embedded
//! emulation module (EEM).
//!
//! The target shifts registers most significant bit first while `Link` clocks data out least
//! significant bit first, so instruction and data words are bit-reversed on the way out.
//! Captured values already arrive in the right order.
use bitflags::bitflags;
use log::{debug, trace, warn};

use crate::device::{Breakpoint, CpuState, Device, EraseScope, Width};
use crate::link::{Connect, Link};
use crate::status::Error;

mod ir {
    pub const ADDR_16BIT: u8 = 0x83;
    pub const ADDR_CAPTURE: u8 = 0x84;
    pub const DATA_TO_ADDR: u8 = 0x85;
    pub const DATA_16BIT: u8 = 0x41;
    pub const DATA_CAPTURE: u8 = 0x42;
    pub const BYPASS: u8 = 0xff;
    pub const CNTRL_SIG_16BIT: u8 = 0x13;
    pub const CNTRL_SIG_CAPTURE: u8 = 0x14;
    pub const CNTRL_SIG_RELEASE: u8 = 0x15;
    pub const CONFIG_FUSES: u8 = 0x29;
    pub const EMEX_DATA_EXCHANGE: u8 = 0x09;
    pub const EMEX_WRITE_CONTROL: u8 = 0x0a;
    pub const EMEX_READ_CONTROL: u8 = 0x0b;
}

bitflags! {
    /// JTAG control signal register
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Csr: u16 {
        const READ = 0x0001;
        const HALT_JTAG = 0x0008;
        const BYTE = 0x0010;
        const INSTR_LOAD = 0x0080;
        const TCE0 = 0x0200;
        const TCE1 = 0x0400;
        const POR = 0x0800;
        const RELEASE_LBYTE = 0x1000;
        const TAGFUNCSAT = 0x2000;
    }
}

impl Csr {
    /// JTAG owns the bus, CPU reads
    const JTAG_READ: Csr = Csr::TAGFUNCSAT.union(Csr::TCE1).union(Csr::READ);
    /// JTAG owns the bus, CPU writes
    const JTAG_WRITE: Csr = Csr::TAGFUNCSAT.union(Csr::TCE1);
    /// Control of RW and BYTE handed back to the CPU
    const CPU_CONTROL: Csr = Csr::JTAG_READ.union(Csr::RELEASE_LBYTE);
}

/// Accepted answers to an instruction register shift
const JTAG_IDS: [u8; 2] = [0x89, 0x91];
/// Attempts at any CSR poll before giving up
const POLL_LIMIT: u32 = 50;
/// TCLK cycles the longest instruction takes to reach the next fetch
const STEP_LIMIT: u32 = 10;

/// The CPU bus is 16 bits wide
const ADDRESS_LIMIT: u64 = 0x1_0000;
/// EEM memory bus triggers on the largest parts
const MAX_TRIGGERS: u32 = 8;

const WDTCTL: u32 = 0x0120;
const WDT_HOLD: u16 = 0x5a80;
const DEVICE_ID: u32 = 0x0ff0;

mod flash {
    pub const FCTL1: u16 = 0x0128;
    pub const FCTL2: u16 = 0x012a;
    pub const FCTL3: u16 = 0x012c;

    pub const WRT: u16 = 0xa540;
    pub const MCLK_DIV1: u16 = 0xa540;
    pub const UNLOCK: u16 = 0xa500;
    pub const LOCK: u16 = 0xa510;
    pub const IDLE: u16 = 0xa500;
    pub const ERASE_MASS: u16 = 0xa506;
    pub const ERASE_MAIN: u16 = 0xa504;
    pub const ERASE_SEGMENT: u16 = 0xa502;

    /// TCLK cycles the flash timing generator needs per word
    pub const WORD_STROBES: u32 = 35;
    pub const SEGMENT_STROBES: u32 = 4820;
    pub const MASS_STROBES: u32 = 10600;
    /// Any main memory address; the erase is started by a dummy write there
    pub const MAIN_ADDRESS: u16 = 0xfffe;
    pub const DUMMY: u16 = 0x55aa;
}

mod eem {
    pub const BREAKREACT: u16 = 0x80;
    pub const GENCTRL: u16 = 0x82;
    pub const MBTRIG_VAL: u16 = 0x00;
    pub const MBTRIG_CTL: u16 = 0x02;
    pub const MBTRIG_MSK: u16 = 0x04;
    pub const MBTRIG_CMB: u16 = 0x06;
    pub const READ: u16 = 0x01;
    pub const WRITE: u16 = 0x00;

    pub const EEM_EN: u16 = 0x0001;
    pub const CLEAR_STOP: u16 = 0x0002;
    pub const EMU_CLK_EN: u16 = 0x0004;
    pub const EMU_FEAT_EN: u16 = 0x0008;

    /// Trigger on an instruction fetch from exactly the given address
    pub const FETCH_EQUAL: u16 = 0x0000;
    pub const NO_MASK: u16 = 0x0000;
    /// EMEX control: stop the CPU when a breakpoint reacts
    pub const ARM: u16 = 0x000f;
    pub const STOPPED: u16 = 0x0080;
}

#[derive(Clone, Copy, Debug)]
pub struct Msp430Config {
    /// Number of EEM trigger slots the chip has, at most 8
    pub breakpoints: u32,
}

impl Default for Msp430Config {
    fn default() -> Self {
        Self { breakpoints: 2 }
    }
}

pub struct Msp430<L> {
    link: L,
    config: Msp430Config,
    chip_id: u32,
}

impl<L: Link + Connect> Msp430<L> {
    pub fn new(link: L) -> Self {
        Self::with_config(link, Msp430Config::default())
    }

    pub fn with_config(link: L, mut config: Msp430Config) -> Self {
        if config.breakpoints > MAX_TRIGGERS {
            warn!("{} breakpoints configured, the EEM has at most {}", config.breakpoints, MAX_TRIGGERS);
            config.breakpoints = MAX_TRIGGERS;
        }
        Self { link, config, chip_id: 0 }
    }

    pub fn link(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    fn ir(&mut self, ir: u8) -> u8 {
        self.link.ir_shift(ir.reverse_bits())
    }

    fn dr16(&mut self, dr: u16) -> u16 {
        self.link.dr_shift_16(dr.reverse_bits())
    }

    fn tclk_pulse(&mut self) {
        self.link.tclk_clear();
        self.link.tclk_set();
    }

    fn control(&mut self, csr: Csr) {
        self.ir(ir::CNTRL_SIG_16BIT);
        self.dr16(csr.bits());
    }

    /// Poll the control signal register until `flag` shows up
    fn poll(&mut self, flag: Csr, pulse: bool) -> Result<(), Error> {
        self.ir(ir::CNTRL_SIG_CAPTURE);
        for _ in 0..POLL_LIMIT {
            if Csr::from_bits_retain(self.dr16(0)).contains(flag) {
                return Ok(());
            }
            if pulse {
                self.tclk_pulse();
            }
        }
        warn!("target never raised {:?}", flag);
        Err(Error::TimedOut)
    }

    fn check_jtag_id(id: u8) -> Result<(), Error> {
        if JTAG_IDS.contains(&id) {
            Ok(())
        } else {
            Err(Error::InvalidJtagId(id))
        }
    }

    fn fuse_blown(&mut self) -> bool {
        // the first read after a TAP reset may be wrong
        for _ in 0..3 {
            self.ir(ir::CNTRL_SIG_CAPTURE);
            if self.dr16(0xaaaa) == 0x5555 {
                return true;
            }
        }
        false
    }

    /// Take the CPU under JTAG control
    fn acquire(&mut self) -> Result<(), Error> {
        self.control(Csr::JTAG_READ);
        self.poll(Csr::TCE0, false)
    }

    /// Power-up clear, leaving the CPU at the reset vector with the watchdog held
    fn puc(&mut self) -> Result<(), Error> {
        self.ir(ir::CNTRL_SIG_16BIT);
        self.dr16(Csr::JTAG_READ.union(Csr::POR).bits());
        self.dr16(Csr::JTAG_READ.bits());
        self.link.tclk_strobe(2);
        self.link.tclk_clear();
        let id = self.ir(ir::ADDR_CAPTURE);
        if !JTAG_IDS.contains(&id) {
            warn!("JTAG ID {:#04x} after reset", id);
            return Err(Error::PucFailed);
        }
        self.write_mem(Width::Word, WDTCTL, WDT_HOLD)
    }

    fn set_instruction_fetch(&mut self) -> Result<(), Error> {
        self.poll(Csr::INSTR_LOAD, true)
    }

    fn halt_cpu(&mut self) -> Result<(), Error> {
        self.set_instruction_fetch()?;
        self.ir(ir::DATA_16BIT);
        // jmp $
        self.dr16(0x3fff);
        self.link.tclk_clear();
        self.control(Csr::JTAG_READ.union(Csr::HALT_JTAG));
        self.link.tclk_set();
        Ok(())
    }

    fn release_cpu(&mut self) {
        self.link.tclk_clear();
        self.control(Csr::JTAG_READ);
        self.ir(ir::ADDR_CAPTURE);
        self.link.tclk_set();
    }

    /// Load the PC through an injected `mov #address, pc`
    fn set_pc(&mut self, address: u16) -> Result<(), Error> {
        self.set_instruction_fetch()?;
        self.control(Csr::CPU_CONTROL);
        self.ir(ir::DATA_16BIT);
        self.dr16(0x4030);
        self.tclk_pulse();
        self.dr16(address);
        self.tclk_pulse();
        self.ir(ir::ADDR_CAPTURE);
        self.link.tclk_clear();
        self.control(Csr::JTAG_READ);
        self.link.tclk_set();
        Ok(())
    }

    /// Write a peripheral register while the bus is set up for JTAG writes
    fn poke(&mut self, address: u16, value: u16) {
        self.ir(ir::ADDR_16BIT);
        self.dr16(address);
        self.ir(ir::DATA_TO_ADDR);
        self.dr16(value);
        self.link.tclk_set();
        self.link.tclk_clear();
    }

    fn eem_write(&mut self, register: u16, value: u16) {
        self.ir(ir::EMEX_DATA_EXCHANGE);
        self.dr16(register | eem::WRITE);
        self.dr16(value);
    }

    fn eem_read(&mut self, register: u16) -> u16 {
        self.ir(ir::EMEX_DATA_EXCHANGE);
        self.dr16(register | eem::READ);
        self.dr16(0)
    }

    /// Run the flash controller with `mode` in FCTL1 around `body`, which runs with the CPU halted
    /// and the bus set up for JTAG writes
    fn with_flash_controller<F>(&mut self, mode: u16, body: F) -> Result<(), Error>
        where F: FnOnce(&mut Self)
    {
        self.halt_cpu()?;
        self.link.tclk_clear();
        self.control(Csr::JTAG_WRITE);
        self.poke(flash::FCTL1, mode);
        self.poke(flash::FCTL2, flash::MCLK_DIV1);
        self.poke(flash::FCTL3, flash::UNLOCK);

        body(self);

        self.control(Csr::JTAG_WRITE);
        self.poke(flash::FCTL1, flash::IDLE);
        self.poke(flash::FCTL3, flash::LOCK);
        self.release_cpu();
        Ok(())
    }
}

impl<L: Link + Connect> Device for Msp430<L> {
    fn attach(&mut self) -> Result<u32, Error> {
        self.link.connect();

        let id = self.ir(ir::BYPASS);
        Self::check_jtag_id(id)?;
        if self.fuse_blown() {
            warn!("security fuse is blown");
            return Err(Error::FuseBlown);
        }

        self.acquire()?;
        self.puc()?;
        let raw = self.read_mem(Width::Word, DEVICE_ID)?;
        self.chip_id = raw.swap_bytes() as u32;
        debug!("JTAG ID {:#04x}, chip {:#06x}", id, self.chip_id);
        Ok(self.chip_id)
    }

    fn detach(&mut self, resume_pc: u32) -> Result<(), Error> {
        match resume_pc {
            0xffff => {
                self.set_breakpoint(Breakpoint::ClearAll, 0)?;
                self.ir(ir::CNTRL_SIG_16BIT);
                self.dr16(Csr::JTAG_READ.union(Csr::POR).bits());
                self.dr16(Csr::JTAG_READ.bits());
            }
            0xfffe => {}
            pc => self.set_pc(pc as u16)?,
        }
        self.resume()?;
        self.link.release();
        Ok(())
    }

    fn chip_id(&mut self) -> Result<u32, Error> {
        Ok(self.chip_id)
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.puc()
    }

    fn halt(&mut self) -> Result<(), Error> {
        self.acquire()
    }

    fn resume(&mut self) -> Result<(), Error> {
        self.set_instruction_fetch()?;
        self.eem_read(eem::BREAKREACT);
        self.ir(ir::EMEX_WRITE_CONTROL);
        self.dr16(eem::ARM);
        self.ir(ir::CNTRL_SIG_RELEASE);
        Ok(())
    }

    fn single_step(&mut self) -> Result<(), Error> {
        self.set_instruction_fetch()?;
        self.control(Csr::CPU_CONTROL);
        self.ir(ir::CNTRL_SIG_CAPTURE);
        let mut fetched = false;
        for _ in 0..STEP_LIMIT {
            self.tclk_pulse();
            if Csr::from_bits_retain(self.dr16(0)).contains(Csr::INSTR_LOAD) {
                fetched = true;
                break;
            }
        }
        self.control(Csr::JTAG_READ);
        if fetched { Ok(()) } else { Err(Error::TimedOut) }
    }

    fn cpu_state(&mut self) -> Result<CpuState, Error> {
        self.ir(ir::EMEX_READ_CONTROL);
        if self.dr16(0) & eem::STOPPED != 0 {
            Ok(CpuState::Halted)
        } else {
            Ok(CpuState::Running)
        }
    }

    fn read_mem(&mut self, width: Width, address: u32) -> Result<u16, Error> {
        trace!("read {:?} {:#06x}", width, address);
        self.check_range(address, width.bytes())?;
        let address = address as u16;
        self.halt_cpu()?;
        self.link.tclk_clear();
        let mut csr = Csr::JTAG_READ.union(Csr::HALT_JTAG);
        if width == Width::Byte {
            csr |= Csr::BYTE;
        }
        self.control(csr);
        self.ir(ir::ADDR_16BIT);
        self.dr16(address);
        self.ir(ir::DATA_TO_ADDR);
        self.link.tclk_set();
        self.link.tclk_clear();
        let value = self.dr16(0);
        self.release_cpu();
        Ok(match width {
            Width::Byte => value & 0x00ff,
            Width::Word => value,
        })
    }

    fn write_mem(&mut self, width: Width, address: u32, value: u16) -> Result<(), Error> {
        trace!("write {:?} {:#06x} = {:#06x}", width, address, value);
        self.check_range(address, width.bytes())?;
        let address = address as u16;
        self.halt_cpu()?;
        self.link.tclk_clear();
        let mut csr = Csr::JTAG_WRITE.union(Csr::HALT_JTAG);
        if width == Width::Byte {
            csr |= Csr::BYTE;
        }
        self.control(csr);
        self.ir(ir::ADDR_16BIT);
        self.dr16(address);
        self.ir(ir::DATA_TO_ADDR);
        self.dr16(value);
        self.link.tclk_set();
        self.release_cpu();
        Ok(())
    }

    fn write_flash_words(&mut self, address: u32, words: &[u16]) -> Result<(), Error> {
        if words.is_empty() {
            return Ok(());
        }
        self.check_range(address, 2 * words.len() as u32)?;
        debug!("programming {} words at {:#06x}", words.len(), address);
        self.with_flash_controller(flash::WRT, |dev| {
            let mut at = address as u16;
            for &word in words {
                dev.control(Csr::JTAG_WRITE);
                dev.poke(at, word);
                // bus back to the CPU so the flash timing generator gets clocks
                dev.control(Csr::JTAG_READ);
                dev.link.tclk_strobe(flash::WORD_STROBES);
                at = at.wrapping_add(2);
            }
        })
    }

    fn erase(&mut self, scope: EraseScope, address: u32) -> Result<(), Error> {
        let (mode, target, strobes) = match scope {
            EraseScope::Mass => (flash::ERASE_MASS, flash::MAIN_ADDRESS, flash::MASS_STROBES),
            EraseScope::Main => (flash::ERASE_MAIN, flash::MAIN_ADDRESS, flash::MASS_STROBES),
            EraseScope::Segment => {
                self.check_range(address, 2)?;
                (flash::ERASE_SEGMENT, address as u16, flash::SEGMENT_STROBES)
            }
        };
        debug!("{:?} erase at {:#06x}", scope, target);
        self.with_flash_controller(mode, |dev| {
            dev.poke(target, flash::DUMMY);
            dev.control(Csr::JTAG_READ);
            dev.link.tclk_strobe(strobes);
        })
    }

    fn read_reg(&mut self, index: u32) -> Result<u32, Error> {
        if index > 15 {
            return Err(Error::TransferFailed);
        }
        self.set_instruction_fetch()?;
        self.ir(ir::DATA_16BIT);
        // mov Rn, &0x01fe
        self.dr16(0x4082 | ((index as u16) << 8));
        self.tclk_pulse();
        self.dr16(0x01fe);
        self.tclk_pulse();
        self.ir(ir::DATA_CAPTURE);
        self.tclk_pulse();
        let value = self.dr16(0);
        self.link.tclk_clear();
        self.control(Csr::JTAG_READ);
        self.link.tclk_set();
        Ok(value as u32)
    }

    fn write_reg(&mut self, index: u32, value: u32) -> Result<(), Error> {
        match index {
            0 => return self.set_pc(value as u16),
            1..=15 => {}
            _ => return Err(Error::TransferFailed),
        }
        self.set_instruction_fetch()?;
        self.ir(ir::DATA_16BIT);
        // mov #value, Rn
        self.dr16(0x4030 | index as u16);
        self.tclk_pulse();
        self.dr16(value as u16);
        self.tclk_pulse();
        // jmp $-2
        self.dr16(0x3ffe);
        self.tclk_pulse();
        self.link.tclk_clear();
        self.ir(ir::ADDR_CAPTURE);
        self.link.tclk_set();
        Ok(())
    }

    fn config_fuses(&mut self) -> Result<u8, Error> {
        self.ir(ir::CONFIG_FUSES);
        Ok(self.link.dr_shift_8(0))
    }

    fn address_limit(&self) -> u64 {
        ADDRESS_LIMIT
    }

    fn set_breakpoint(&mut self, bp: Breakpoint, address: u32) -> Result<(), Error> {
        let slot = match bp {
            Breakpoint::ClearAll => {
                self.eem_write(eem::BREAKREACT, 0);
                return Ok(());
            }
            Breakpoint::Slot(slot) if slot < self.config.breakpoints.min(MAX_TRIGGERS) => slot,
            Breakpoint::Slot(slot) => return Err(Error::TooManyBreaks(slot)),
        };
        self.check_range(address, 2)?;

        let offset = 8 * slot as u16;
        let bit = 1 << slot;
        self.eem_write(eem::GENCTRL, eem::EEM_EN | eem::CLEAR_STOP | eem::EMU_CLK_EN | eem::EMU_FEAT_EN);
        self.eem_write(eem::MBTRIG_VAL + offset, address as u16);
        self.eem_write(eem::MBTRIG_CTL + offset, eem::FETCH_EQUAL);
        self.eem_write(eem::MBTRIG_MSK + offset, eem::NO_MASK);
        self.eem_write(eem::MBTRIG_CMB + offset, bit);
        let react = self.eem_read(eem::BREAKREACT);
        self.eem_write(eem::BREAKREACT, react | bit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Op {
        Connect,
        Release,
        Ir(u8),
        Dr(u16),
        Dr8(u8),
        Tclk(bool),
    }

    /// Link double answering like a healthy target.  Values are recorded in the target's bit
    /// order, i.e. with the wire reversal undone.
    struct MockLink {
        ops: Vec<Op>,
        raw_ir: Vec<u8>,
        ir: u8,
        jtag_id: u8,
        fuse_blown: bool,
        csr: u16,
        data: u16,
        eem: u16,
    }

    impl MockLink {
        fn new() -> Self {
            Self {
                ops: Vec::new(),
                raw_ir: Vec::new(),
                ir: 0,
                jtag_id: 0x89,
                fuse_blown: false,
                csr: 0x0280,
                data: 0x49f2,
                eem: 0,
            }
        }

        fn irs(&self) -> Vec<u8> {
            self.ops.iter().filter_map(|op| match *op { Op::Ir(ir) => Some(ir), _ => None }).collect()
        }
    }

    impl Link for MockLink {
        fn ir_shift(&mut self, raw: u8) -> u8 {
            self.raw_ir.push(raw);
            self.ir = raw.reverse_bits();
            self.ops.push(Op::Ir(self.ir));
            self.jtag_id
        }

        fn dr_shift_8(&mut self, dr: u8) -> u8 {
            self.ops.push(Op::Dr8(dr.reverse_bits()));
            0x5a
        }

        fn dr_shift_16(&mut self, raw: u16) -> u16 {
            let dr = raw.reverse_bits();
            self.ops.push(Op::Dr(dr));
            match self.ir {
                ir::CNTRL_SIG_CAPTURE if self.fuse_blown && dr == 0xaaaa => 0x5555,
                ir::CNTRL_SIG_CAPTURE => self.csr,
                ir::DATA_TO_ADDR | ir::DATA_CAPTURE => self.data,
                ir::EMEX_DATA_EXCHANGE | ir::EMEX_READ_CONTROL => self.eem,
                _ => 0,
            }
        }

        fn tclk_clear(&mut self) {
            self.ops.push(Op::Tclk(false));
        }

        fn tclk_set(&mut self) {
            self.ops.push(Op::Tclk(true));
        }
    }

    impl Connect for MockLink {
        fn connect(&mut self) {
            self.ops.push(Op::Connect);
        }

        fn reset_tap(&mut self) {}

        fn release(&mut self) {
            self.ops.push(Op::Release);
        }
    }

    fn attached() -> Msp430<MockLink> {
        let mut dev = Msp430::new(MockLink::new());
        dev.attach().unwrap();
        dev.link().ops.clear();
        dev
    }

    #[test]
    fn attach_reads_chip_id() {
        let mut dev = Msp430::new(MockLink::new());
        assert_eq!(dev.attach(), Ok(0xf249));
        assert_eq!(dev.chip_id(), Ok(0xf249));
        let link = dev.into_link();
        assert_eq!(link.ops[0], Op::Connect);
        // watchdog held before the id read
        let wdt = link.ops.iter().position(|&op| op == Op::Dr(WDT_HOLD)).unwrap();
        let id = link.ops.iter().position(|&op| op == Op::Dr(DEVICE_ID as u16)).unwrap();
        assert!(wdt < id);
    }

    #[test]
    fn instructions_go_out_bit_reversed() {
        let mut dev = Msp430::new(MockLink::new());
        dev.attach().unwrap();
        let link = dev.into_link();
        assert_eq!(link.raw_ir[0], 0xff);
        assert!(link.raw_ir.contains(&0xc8), "CNTRL_SIG_16BIT is 0x13 reversed");
    }

    #[test]
    fn blown_fuse_stops_attach() {
        let mut link = MockLink::new();
        link.fuse_blown = true;
        let mut dev = Msp430::new(link);
        assert_eq!(dev.attach(), Err(Error::FuseBlown));
        let link = dev.into_link();
        assert_eq!(link.ops, [Op::Connect, Op::Ir(ir::BYPASS), Op::Ir(ir::CNTRL_SIG_CAPTURE), Op::Dr(0xaaaa)]);
    }

    #[test]
    fn unknown_jtag_id() {
        let mut link = MockLink::new();
        link.jtag_id = 0x55;
        let mut dev = Msp430::new(link);
        assert_eq!(dev.attach(), Err(Error::InvalidJtagId(0x55)));
        assert_eq!(dev.into_link().ops.len(), 2);
    }

    #[test]
    fn unresponsive_cpu_times_out() {
        let mut link = MockLink::new();
        link.csr = 0;
        let mut dev = Msp430::new(link);
        assert_eq!(dev.attach(), Err(Error::TimedOut));
    }

    #[test]
    fn byte_access_sets_byte_flag() {
        let mut dev = attached();
        assert_eq!(dev.read_mem(Width::Byte, 0x0201), Ok(0xf2));
        assert!(dev.link().ops.contains(&Op::Dr(0x2419)));

        dev.link().ops.clear();
        dev.write_mem(Width::Word, 0x0200, 0xbeef).unwrap();
        let ops = &dev.link().ops;
        assert!(ops.contains(&Op::Dr(0x2408)));
        assert!(ops.contains(&Op::Dr(0xbeef)));
    }

    #[test]
    fn flash_words_get_timing_strobes() {
        let mut dev = attached();
        dev.write_flash_words(0xc000, &[0x1234, 0x5678]).unwrap();
        let ops = &dev.link().ops;
        assert!(ops.contains(&Op::Dr(flash::WRT)));
        assert!(ops.contains(&Op::Dr(0x5678)));
        assert_eq!(ops.iter().filter(|&&op| op == Op::Dr(flash::LOCK)).count(), 1);
        let strobes = ops.iter().filter(|&&op| op == Op::Tclk(false)).count();
        assert!(strobes >= 2 * flash::WORD_STROBES as usize);
    }

    #[test]
    fn breakpoint_slots() {
        let mut dev = attached();
        assert_eq!(dev.set_breakpoint(Breakpoint::Slot(2), 0xc000), Err(Error::TooManyBreaks(2)));
        assert!(dev.link().ops.is_empty());

        dev.link().eem = 0x0001;
        dev.set_breakpoint(Breakpoint::Slot(1), 0xc010).unwrap();
        let ops = &dev.link().ops;
        assert!(ops.contains(&Op::Dr(eem::MBTRIG_VAL + 8)));
        assert!(ops.contains(&Op::Dr(0xc010)));
        assert_eq!(ops[ops.len() - 2..], [Op::Dr(eem::BREAKREACT), Op::Dr(0x0003)]);

        dev.link().ops.clear();
        dev.set_breakpoint(Breakpoint::ClearAll, 0).unwrap();
        assert_eq!(dev.link().ops, [Op::Ir(ir::EMEX_DATA_EXCHANGE), Op::Dr(eem::BREAKREACT), Op::Dr(0)]);
    }

    #[test]
    fn wider_config_allows_more_slots() {
        let mut dev = Msp430::with_config(MockLink::new(), Msp430Config { breakpoints: 3 });
        assert_eq!(dev.set_breakpoint(Breakpoint::Slot(2), 0xc000), Ok(()));
    }

    #[test]
    fn slot_count_is_capped_by_the_eem() {
        let mut dev = Msp430::with_config(MockLink::new(), Msp430Config { breakpoints: 40 });
        assert_eq!(dev.set_breakpoint(Breakpoint::Slot(20), 0xc000), Err(Error::TooManyBreaks(20)));
        assert_eq!(dev.set_breakpoint(Breakpoint::Slot(8), 0xc000), Err(Error::TooManyBreaks(8)));
        assert!(dev.link().ops.is_empty());

        dev.set_breakpoint(Breakpoint::Slot(7), 0xc000).unwrap();
        let ops = &dev.link().ops;
        assert!(ops.contains(&Op::Dr(eem::MBTRIG_CMB + 56)));
        assert_eq!(ops[ops.len() - 2..], [Op::Dr(eem::BREAKREACT), Op::Dr(0x0080)]);
    }

    #[test]
    fn accesses_past_the_16_bit_bus_touch_nothing() {
        let mut dev = attached();
        assert_eq!(
            dev.write_mem(Width::Word, 0x1_0000, 0xbeef),
            Err(Error::AddressRange { address: 0x1_0000, len: 2 })
        );
        assert_eq!(
            dev.read_mem(Width::Word, 0x1_0120),
            Err(Error::AddressRange { address: 0x1_0120, len: 2 })
        );
        assert_eq!(
            dev.write_flash_words(0xfffe, &[1, 2]),
            Err(Error::AddressRange { address: 0xfffe, len: 4 })
        );
        assert_eq!(
            dev.erase(EraseScope::Segment, 0x1_c000),
            Err(Error::AddressRange { address: 0x1_c000, len: 2 })
        );
        assert_eq!(
            dev.set_breakpoint(Breakpoint::Slot(0), 0x1_c000),
            Err(Error::AddressRange { address: 0x1_c000, len: 2 })
        );
        assert!(dev.link().ops.is_empty());

        // the last word of the bus is still reachable
        dev.write_mem(Width::Word, 0xfffe, 0xbeef).unwrap();
        assert!(dev.link().ops.contains(&Op::Dr(0xfffe)));
    }

    #[test]
    fn registers() {
        let mut dev = attached();
        dev.link().data = 0x1234;
        assert_eq!(dev.read_reg(5), Ok(0x1234));
        assert!(dev.link().ops.contains(&Op::Dr(0x4582)));
        assert_eq!(dev.read_reg(16), Err(Error::TransferFailed));

        dev.link().ops.clear();
        dev.write_reg(7, 0xabcd).unwrap();
        assert!(dev.link().ops.contains(&Op::Dr(0x4037)));
        assert!(dev.link().ops.contains(&Op::Dr(0xabcd)));
    }

    #[test]
    fn detach_releases_the_pins() {
        let mut dev = attached();
        dev.detach(0xc000).unwrap();
        let ops = &dev.link().ops;
        assert!(ops.contains(&Op::Dr(0xc000)));
        assert_eq!(ops[ops.len() - 2..], [Op::Ir(ir::CNTRL_SIG_RELEASE), Op::Release]);
        assert!(dev.into_link().irs().contains(&ir::EMEX_WRITE_CONTROL));
    }

    #[test]
    fn cpu_state_follows_eem() {
        let mut dev = attached();
        assert_eq!(dev.cpu_state(), Ok(CpuState::Running));
        dev.link().eem = eem::STOPPED;
        assert_eq!(dev.cpu_state(), Ok(CpuState::Halted));
    }

    #[test]
    fn config_fuses_shift_eight_bits() {
        let mut dev = attached();
        assert_eq!(dev.config_fuses(), Ok(0x5a));
        assert_eq!(dev.link().ops, [Op::Ir(ir::CONFIG_FUSES), Op::Dr8(0)]);
    }
}
