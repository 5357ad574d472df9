//! Boundaries to the host link and the hardware watchdog.
use core::cell::RefCell;

use embedded_hal::delay::DelayNs;

/// Byte channel to the host.
pub trait Transport {
    /// Read whatever is available into `buf` without blocking, returning the count
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize;
    /// Queue `data` for the host, blocking until it is accepted
    fn write(&mut self, data: &[u8]);
    /// Push queued output to the host
    fn flush(&mut self);
}

/// The hardware watchdog.  It must be fed in every loop iteration and inside every blocking wait.
pub trait Watchdog {
    fn feed(&mut self);
    /// Whether the last reset was caused by the watchdog expiring
    fn caused_reboot(&self) -> bool;
}

impl<W: Watchdog + ?Sized> Watchdog for &mut W {
    fn feed(&mut self) {
        (**self).feed()
    }

    fn caused_reboot(&self) -> bool {
        (**self).caused_reboot()
    }
}

/// A watchdog shared between the command loop and a `FeedingDelay` inside the link.  Feeds never
/// nest, so the cell is only ever borrowed by one of them at a time.
impl<W: Watchdog> Watchdog for &RefCell<W> {
    fn feed(&mut self) {
        if let Ok(mut watchdog) = self.try_borrow_mut() {
            watchdog.feed();
        }
    }

    fn caused_reboot(&self) -> bool {
        self.try_borrow().map_or(false, |watchdog| watchdog.caused_reboot())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_nonblocking(buf)
    }

    fn write(&mut self, data: &[u8]) {
        (**self).write(data)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// `DelayNs` that services a watchdog before every wait, for bit-banging loops that may run
/// long enough to starve it.
pub struct FeedingDelay<D, W> {
    delay: D,
    watchdog: W,
}

impl<D: DelayNs, W: Watchdog> FeedingDelay<D, W> {
    pub fn new(delay: D, watchdog: W) -> Self {
        Self { delay, watchdog }
    }

    pub fn release(self) -> (D, W) {
        (self.delay, self.watchdog)
    }
}

impl<D: DelayNs, W: Watchdog> DelayNs for FeedingDelay<D, W> {
    fn delay_ns(&mut self, ns: u32) {
        self.watchdog.feed();
        self.delay.delay_ns(ns);
    }
}

/// `Transport` over a blocking reader/writer pair, e.g. a serial port or a pipe on a host.
#[cfg(feature = "std")]
pub mod io {
    use std::io::{ErrorKind, Read, Write};

    use log::warn;

    use super::Transport;

    pub struct IoTransport<R, W> {
        reader: R,
        writer: W,
    }

    impl<R: Read, W: Write> IoTransport<R, W> {
        pub fn new(reader: R, writer: W) -> Self {
            Self { reader, writer }
        }

        pub fn into_inner(self) -> (R, W) {
            (self.reader, self.writer)
        }
    }

    impl<R: Read, W: Write> Transport for IoTransport<R, W> {
        fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
            match self.reader.read(buf) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut) => 0,
                Err(e) => {
                    warn!("host read failed: {}", e);
                    0
                }
            }
        }

        fn write(&mut self, data: &[u8]) {
            if let Err(e) = self.writer.write_all(data) {
                warn!("host write failed: {}", e);
            }
        }

        fn flush(&mut self) {
            if let Err(e) = self.writer.flush() {
                warn!("host flush failed: {}", e);
            }
        }
    }
}
