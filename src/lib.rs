//! Firmware core of an MSP430 debug probe.
//!
//! The probe speaks a line-oriented text protocol to a host over a byte stream and drives a
//! target chip through either 4-wire JTAG or 2-wire Spy-Bi-Wire.  The crate is layered the same
//! way a request flows through it:
//!
//! - `probe` frames request lines out of the host byte stream and owns the main loop.
//! - `session` looks requests up in the `command` table, parses their arguments, and runs the
//!   handler, which writes a `status` reply.
//! - `splice` turns byte ranges into the aligned byte and word accesses a `device` can do,
//!   staging data in the `buffer`.
//! - `device::msp430` implements the chip sequences on top of a `link`, which in turn puts TAP
//!   bit-cycles on the pins with the `statemachine` telling it how to walk the TAP.
//!
//! Everything hardware specific comes in through `embedded-hal` pins and delays and the
//! `transport` traits, so the same core runs on the probe MCU and in host-side tests.
//!
//! # Example
//! The watchdog is shared between the command loop and the link's delays, so it stays fed both
//! between requests and inside long flash timing strobes.
//! ```
//! use core::cell::RefCell;
//! use fet_core::link::sbw::{InputOutputPin, Sbw, DEFAULT_PHASE_DELAY_NS};
//! use fet_core::device::msp430::Msp430;
//! use fet_core::probe::Probe;
//! use fet_core::session::Session;
//! use fet_core::transport::{FeedingDelay, Transport, Watchdog};
//!
//! fn serve<Tck, Tdio, Delay, Host, Wdt>(tck: Tck, tdio: Tdio, delay: Delay, host: Host, wdt: Wdt) -> !
//!     where Tck: embedded_hal::digital::OutputPin,
//!           Tdio: InputOutputPin,
//!           Delay: embedded_hal::delay::DelayNs,
//!           Host: Transport,
//!           Wdt: Watchdog,
//! {
//!     let wdt = RefCell::new(wdt);
//!     let delay = FeedingDelay::new(delay, &wdt);
//!     let link = Sbw::new(DEFAULT_PHASE_DELAY_NS, tck, tdio, delay).into_link();
//!     let session = Session::new(Msp430::new(link), host, &wdt);
//!     Probe::new(session).run()
//! }
//! ```
#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod buffer;
pub mod command;
pub mod device;
pub mod link;
pub mod probe;
pub mod session;
pub mod splice;
pub mod statemachine;
pub mod status;
pub mod transport;

pub use device::Device;
pub use link::{Connect, Link};
pub use status::{Error, StatusCode};
