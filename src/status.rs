//! Reply status taxonomy.  Every observable outcome of a command maps to exactly one
//! `StatusCode`; the numeric values are the wire format and never change.
use core::fmt;

use thiserror::Error;

macro_rules! status_codes {
    ($($code:literal $name:ident $message:literal,)*) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[repr(u16)]
        pub enum StatusCode {
            $($name = $code,)*
        }

        impl StatusCode {
            /// Every status code, in table order
            pub const ALL: &'static [StatusCode] = &[$(StatusCode::$name,)*];

            /// The fixed human-readable message sent after the code
            pub const fn message(self) -> &'static str {
                match self {
                    $(StatusCode::$name => $message,)*
                }
            }
        }
    };
}

status_codes! {
    200 Ok               "Okay",
    201 ContentMismatch  "Verification succeeded, but contents differ",
    350 ContinueTransfer "Go Ahead with Transfer",
    400 TimedOut         "JTAG connection with MCU timed out",
    401 TransferFailed   "Transfer failed",
    402 ProgrammerFroze  "Programmer Froze",
    500 UnknownCommand   "Unknown Command",
    501 InvalidArguments "Invalid Command Arguments",
    502 IntegerOverflow  "Integer Overflow",
    503 CommandTooLong   "Command Too Long",
    550 FuseBlown        "JTAG Security Fuse is blown",
    551 InvalidJtagId    "Invalid JTAG ID",
    552 PucFailed        "PUC Failed",
    553 TooManyBreaks    "Too many Breakpoints",
    554 OutOfBounds      "Address or Size is Out of Bounds",
    555 NotAttached      "Not attached to MCU",
}

impl StatusCode {
    /// Numeric wire value
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// 2xx and 3xx codes report that the request itself went through
    pub const fn is_success(self) -> bool {
        self.code() < 400
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03} {}", self.code(), self.message())
    }
}

/// Failures raised by the device layer, the splicer and the session handlers.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("JTAG security fuse is blown")]
    FuseBlown,
    #[error("unexpected JTAG ID {0:#04x}")]
    InvalidJtagId(u8),
    #[error("power-up clear did not complete")]
    PucFailed,
    #[error("breakpoint slot {0} is not available")]
    TooManyBreaks(u32),
    #[error("offset {offset:#x} + {len:#x} bytes exceeds the scratch buffer")]
    OutOfBounds { offset: u32, len: u32 },
    #[error("target range {address:#x} + {len:#x} bytes is past the end of the address space")]
    AddressRange { address: u32, len: u32 },
    #[error("target did not respond in time")]
    TimedOut,
    #[error("transfer to the target failed")]
    TransferFailed,
    #[error("no target attached")]
    NotAttached,
}

impl Error {
    /// The wire status reported for this failure
    pub const fn status(self) -> StatusCode {
        match self {
            Error::FuseBlown => StatusCode::FuseBlown,
            Error::InvalidJtagId(_) => StatusCode::InvalidJtagId,
            Error::PucFailed => StatusCode::PucFailed,
            Error::TooManyBreaks(_) => StatusCode::TooManyBreaks,
            Error::OutOfBounds { .. } | Error::AddressRange { .. } => StatusCode::OutOfBounds,
            Error::TimedOut => StatusCode::TimedOut,
            Error::TransferFailed => StatusCode::TransferFailed,
            Error::NotAttached => StatusCode::NotAttached,
        }
    }
}

impl From<Error> for StatusCode {
    fn from(e: Error) -> Self {
        e.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn codes_are_unique() {
        for (i, a) in StatusCode::ALL.iter().enumerate() {
            for b in &StatusCode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code(), "{:?} and {:?} collide", a, b);
            }
        }
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(StatusCode::Ok.to_string(), "200 Okay");
        assert_eq!(StatusCode::ContinueTransfer.to_string(), "350 Go Ahead with Transfer");
        assert_eq!(StatusCode::OutOfBounds.to_string(), "554 Address or Size is Out of Bounds");
    }

    #[test]
    fn soft_statuses_count_as_success() {
        assert!(StatusCode::ContentMismatch.is_success());
        assert!(StatusCode::ContinueTransfer.is_success());
        assert!(!StatusCode::TimedOut.is_success());
        assert_eq!(Error::TooManyBreaks(9).status(), StatusCode::TooManyBreaks);
    }
}
