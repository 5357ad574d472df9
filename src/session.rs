//! One host session: dispatches parsed requests to the device and writes the replies.
//!
//! Replies are `NNN message\r\n` status lines, optionally followed by a `0x%08X\r\n` value line,
//! raw bulk data, or for `HELP` a listing closed by `.\r\n`.  Each request gets exactly one reply
//! sequence and the handler that owns the request is the one that writes it.
use alloc::format;

use log::{debug, trace, warn};

use crate::buffer::ScratchBuffer;
use crate::command::{self, Arguments, CommandDescriptor, Handler, COMMANDS};
use crate::device::{Breakpoint, CpuState, Device, EraseScope};
use crate::splice;
use crate::status::{Error, StatusCode};
use crate::transport::{Transport, Watchdog};

/// Bytes moved between watchdog feeds while streaming a download
const DOWNLOAD_CHUNK: usize = 64;

/// Movement between the scratch buffer and target memory
#[derive(Clone, Copy, Debug)]
enum Transfer {
    Read,
    Write,
    Verify,
    Flash,
}

/// `VERSION` reply: major in bits 16..24, minor in bits 8..16
fn version() -> u32 {
    let major: u32 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor: u32 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    (major << 16) | (minor << 8)
}

pub struct Session<D, T, W> {
    pub device: D,
    pub transport: T,
    pub watchdog: W,
    pub buffer: ScratchBuffer,
    commands: &'static [CommandDescriptor],
    attached: bool,
    last_status: StatusCode,
}

impl<D: Device, T: Transport, W: Watchdog> Session<D, T, W> {
    pub fn new(device: D, transport: T, watchdog: W) -> Self {
        Self {
            device,
            transport,
            watchdog,
            buffer: ScratchBuffer::new(),
            commands: COMMANDS,
            attached: false,
            last_status: StatusCode::Ok,
        }
    }

    /// Serve a different command table
    pub fn with_commands(mut self, commands: &'static [CommandDescriptor]) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_buffer(mut self, buffer: ScratchBuffer) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Status of the most recent reply
    pub fn last_status(&self) -> StatusCode {
        self.last_status
    }

    pub fn send_status(&mut self, status: StatusCode) {
        self.last_status = status;
        let line = format!("{:03} {}\r\n", status.code(), status.message());
        self.transport.write(line.as_bytes());
    }

    fn send_value(&mut self, value: u32) {
        let line = format!("0x{:08X}\r\n", value);
        self.transport.write(line.as_bytes());
    }

    /// Status line for `result`, handing the value on when it succeeded
    fn reply<V>(&mut self, result: Result<V, Error>) -> Option<V> {
        match result {
            Ok(v) => {
                self.send_status(StatusCode::Ok);
                Some(v)
            }
            Err(e) => {
                warn!("command failed: {}", e);
                self.send_status(e.status());
                None
            }
        }
    }

    fn reply_value(&mut self, result: Result<u32, Error>) {
        if let Some(value) = self.reply(result) {
            self.send_value(value);
        }
    }

    /// Handle one request line.  Blank lines are ignored without a reply.
    pub fn process_line(&mut self, line: &[u8]) {
        trace!("> {}", core::str::from_utf8(line).unwrap_or("<binary>").trim_end());

        let mut tokens = command::tokens(line);
        let Some(name) = tokens.next() else { return };
        let Some(cmd) = command::lookup(self.commands, name) else {
            self.send_status(StatusCode::UnknownCommand);
            return;
        };

        let args = match command::parse_args(cmd.params, tokens) {
            Ok(args) => args,
            Err(e) => {
                self.send_status(e.into());
                return;
            }
        };

        if cmd.needs_attach && !self.attached {
            self.send_status(StatusCode::NotAttached);
            return;
        }

        self.dispatch(cmd.handler, &args);
    }

    fn dispatch(&mut self, handler: Handler, args: &Arguments<'_>) {
        match handler {
            Handler::Help => self.help(),
            Handler::Version => {
                self.send_status(StatusCode::Ok);
                self.send_value(version());
            }
            Handler::Attach => self.attach(),
            Handler::Detach => {
                let result = self.device.detach(args.word(0));
                if result.is_ok() {
                    debug!("detached, resuming at {:#06x}", args.word(0));
                    self.attached = false;
                }
                self.reply(result);
            }
            Handler::GetId => {
                let result = self.device.chip_id();
                self.reply_value(result);
            }
            Handler::Reset => {
                let result = self.device.reset();
                self.reply(result);
            }
            Handler::Continue => {
                let result = self.device.resume();
                self.reply(result);
            }
            Handler::Halt => {
                let result = self.device.halt();
                self.reply(result);
            }
            Handler::Step => {
                let result = self.device.single_step();
                self.reply(result);
            }
            Handler::IsHalted => {
                let result = self.device.cpu_state().map(|s| (s == CpuState::Halted) as u32);
                self.reply_value(result);
            }
            Handler::BufCapacity => {
                self.send_status(StatusCode::Ok);
                self.send_value(self.buffer.capacity() as u32);
            }
            Handler::UploadBin => self.upload(args.word(0), args.word(1)),
            Handler::DownloadBin => self.download(args.word(0), args.word(1)),
            Handler::RamRead => self.transfer(Transfer::Read, args.word(0), args.word(1), args.word(2)),
            Handler::RamWrite => self.transfer(Transfer::Write, args.word(0), args.word(1), args.word(2)),
            Handler::RamVerify => self.transfer(Transfer::Verify, args.word(0), args.word(1), args.word(2)),
            Handler::FlashWrite => self.transfer(Transfer::Flash, args.word(0), args.word(1), args.word(2)),
            Handler::EraseAll => {
                let result = self.device.erase(EraseScope::Mass, 0);
                self.reply(result);
            }
            Handler::EraseMain => {
                let result = self.device.erase(EraseScope::Main, 0);
                self.reply(result);
            }
            Handler::EraseSegment => {
                let result = self.device.erase(EraseScope::Segment, args.word(0));
                self.reply(result);
            }
            Handler::RegRead => {
                let result = self.device.read_reg(args.word(0));
                self.reply_value(result);
            }
            Handler::RegWrite => {
                let result = self.device.write_reg(args.word(0), args.word(1));
                self.reply(result);
            }
            Handler::GetConfigFuses => {
                let result = self.device.config_fuses().map(u32::from);
                self.reply_value(result);
            }
            Handler::ClearBreakpoints => {
                let result = self.device.set_breakpoint(Breakpoint::ClearAll, 0);
                self.reply(result);
            }
            Handler::SetBreakpoint => {
                let result = self.device.set_breakpoint(Breakpoint::Slot(args.word(0)), args.word(1));
                self.reply(result);
            }
        }
    }

    fn help(&mut self) {
        self.send_status(StatusCode::Ok);
        for cmd in self.commands {
            self.transport.write(cmd.name.as_bytes());
            for param in cmd.params {
                self.transport.write(b" ");
                self.transport.write(param.name.as_bytes());
            }
            self.transport.write(b"\r\n");
        }
        self.transport.write(b".\r\n");
    }

    fn attach(&mut self) {
        match self.device.attach() {
            Ok(id) => {
                debug!("attached to chip {:#06x}", id);
                self.attached = true;
                self.send_status(StatusCode::Ok);
                self.send_value(id);
            }
            Err(e) => {
                warn!("attach failed: {}", e);
                self.attached = false;
                self.send_status(e.status());
            }
        }
    }

    /// Bounds check that must pass before a bulk command touches anything
    fn check_bounds(&mut self, offset: u32, len: u32) -> bool {
        match self.buffer.check(offset, len) {
            Ok(_) => true,
            Err(e) => {
                debug!("{}", e);
                self.send_status(e.status());
                false
            }
        }
    }

    /// Host streams `len` raw bytes into the buffer after the go-ahead
    fn upload(&mut self, offset: u32, len: u32) {
        if !self.check_bounds(offset, len) {
            return;
        }
        self.send_status(StatusCode::ContinueTransfer);
        self.transport.flush();

        debug!("receiving {} bytes at buffer offset {:#x}", len, offset);
        let Ok(dest) = self.buffer.get_mut(offset, len) else { return };
        let mut received = 0;
        while received < dest.len() {
            self.watchdog.feed();
            received += self.transport.read_nonblocking(&mut dest[received..]);
        }
        self.send_status(StatusCode::Ok);
    }

    /// Raw buffer contents follow the go-ahead
    fn download(&mut self, offset: u32, len: u32) {
        if !self.check_bounds(offset, len) {
            return;
        }
        self.send_status(StatusCode::ContinueTransfer);

        debug!("sending {} bytes from buffer offset {:#x}", len, offset);
        let Ok(src) = self.buffer.get(offset, len) else { return };
        for chunk in src.chunks(DOWNLOAD_CHUNK) {
            self.watchdog.feed();
            self.transport.write(chunk);
        }
        self.send_status(StatusCode::Ok);
    }

    /// Memory and flash transfers between the buffer and the target
    fn transfer(&mut self, kind: Transfer, offset: u32, address: u32, len: u32) {
        if !self.check_bounds(offset, len) {
            return;
        }
        let device = &mut self.device;
        let watchdog = &mut self.watchdog;
        let status = match kind {
            Transfer::Read => self.buffer.get_mut(offset, len)
                .and_then(|buf| splice::read_memory(device, watchdog, address, buf))
                .map(|_| StatusCode::Ok),
            Transfer::Write => self.buffer.get(offset, len)
                .and_then(|buf| splice::write_ram(device, watchdog, address, buf))
                .map(|_| StatusCode::Ok),
            Transfer::Verify => self.buffer.get(offset, len)
                .and_then(|buf| splice::verify(device, watchdog, address, buf))
                .map(|same| if same { StatusCode::Ok } else { StatusCode::ContentMismatch }),
            Transfer::Flash => self.buffer.get(offset, len)
                .and_then(|buf| splice::write_flash(device, watchdog, address, buf))
                .map(|_| StatusCode::Ok),
        };
        match status {
            Ok(status) => self.send_status(status),
            Err(e) => {
                warn!("{:?} at {:#x} failed: {}", kind, address, e);
                self.send_status(e.status());
            }
        }
    }
}
