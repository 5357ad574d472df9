//! The probe main loop: frames request lines out of the host byte stream and hands them to the
//! session.
use log::{trace, warn};

use crate::command::MAX_COMMAND_LENGTH;
use crate::device::Device;
use crate::session::Session;
use crate::status::StatusCode;
use crate::transport::{Transport, Watchdog};

/// Accumulates host bytes until a `\n` completes a request.
///
/// Bytes before `start` are consumed, bytes in `start..end` are pending.  Completed lines are
/// handed out in order and the pending tail is moved to the front before the next read.
pub struct LineBuffer {
    buf: [u8; MAX_COMMAND_LENGTH],
    start: usize,
    end: usize,
    /// Dropping bytes up to and including the next `\n` after an overlong request
    discarding: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self { buf: [0; MAX_COMMAND_LENGTH], start: 0, end: 0, discarding: false }
    }

    /// Free space for the next read, after compacting the pending tail
    pub fn spare(&mut self) -> &mut [u8] {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        &mut self.buf[self.end..]
    }

    /// Record `n` bytes written into `spare()`
    pub fn fill(&mut self, n: usize) {
        self.end = (self.end + n).min(self.buf.len());
    }

    /// The next complete line including its terminator, if one is pending
    pub fn next_line(&mut self) -> Option<&[u8]> {
        loop {
            let pending = &self.buf[self.start..self.end];
            let newline = pending.iter().position(|&b| b == b'\n');
            if self.discarding {
                match newline {
                    Some(i) => {
                        self.start += i + 1;
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        self.start = self.end;
                        return None;
                    }
                }
            }
            let len = newline? + 1;
            let line = &self.buf[self.start..self.start + len];
            self.start += len;
            return Some(line);
        }
    }

    /// No terminator anywhere in a full buffer
    pub fn is_overflowing(&self) -> bool {
        !self.discarding && self.start == 0 && self.end == self.buf.len()
    }

    /// Drop the pending bytes and the rest of the request they belong to
    pub fn discard(&mut self) {
        self.start = 0;
        self.end = 0;
        self.discarding = true;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Probe<D, T, W> {
    pub session: Session<D, T, W>,
    line: LineBuffer,
}

impl<D: Device, T: Transport, W: Watchdog> Probe<D, T, W> {
    pub fn new(session: Session<D, T, W>) -> Self {
        Self { session, line: LineBuffer::new() }
    }

    /// Announce a watchdog reboot to the host before serving requests
    pub fn boot(&mut self) {
        if self.session.watchdog.caused_reboot() {
            warn!("rebooted by the watchdog");
            self.session.send_status(StatusCode::ProgrammerFroze);
            self.session.transport.flush();
        }
    }

    /// Read what the host has sent and serve every complete request in it
    pub fn poll(&mut self) {
        self.session.watchdog.feed();
        let n = self.session.transport.read_nonblocking(self.line.spare());
        if n == 0 {
            return;
        }
        trace!("{} bytes from host", n);
        self.line.fill(n);

        while let Some(line) = self.line.next_line() {
            self.session.process_line(line);
            self.session.transport.flush();
            self.session.watchdog.feed();
        }

        if self.line.is_overflowing() {
            warn!("request exceeds {} bytes, dropping it", MAX_COMMAND_LENGTH);
            self.line.discard();
            self.session.send_status(StatusCode::CommandTooLong);
            self.session.transport.flush();
        }
    }

    pub fn run(&mut self) -> ! {
        self.boot();
        loop {
            self.poll();
        }
    }
}
