//! Command table and typed argument parsing.
//!
//! A request line is `NAME [arg ...]`, whitespace separated.  The name is matched without regard
//! to case; the arguments are parsed positionally against the descriptor's parameter slots.
use crate::status::StatusCode;

/// Longest accepted request line, terminator included
pub const MAX_COMMAND_LENGTH: usize = 256;
/// Most parameter slots a command may declare
pub const MAX_ARGS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Symbol,
    Unsigned,
    Signed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn uint(name: &'static str) -> Param {
    Param { name, kind: ParamKind::Unsigned }
}

const fn sint(name: &'static str) -> Param {
    Param { name, kind: ParamKind::Signed }
}

/// What a command does once its arguments are parsed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    Help,
    Version,
    Attach,
    Detach,
    GetId,
    Reset,
    Continue,
    Halt,
    Step,
    IsHalted,
    BufCapacity,
    UploadBin,
    DownloadBin,
    RamRead,
    RamWrite,
    RamVerify,
    FlashWrite,
    EraseAll,
    EraseMain,
    EraseSegment,
    RegRead,
    RegWrite,
    GetConfigFuses,
    ClearBreakpoints,
    SetBreakpoint,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub params: &'static [Param],
    pub handler: Handler,
    pub needs_attach: bool,
}

const fn cmd(name: &'static str, params: &'static [Param], handler: Handler, needs_attach: bool) -> CommandDescriptor {
    CommandDescriptor { name, params, handler, needs_attach }
}

const NONE: &[Param] = &[];
const PC: &[Param] = &[uint("pc")];
const ADDRESS: &[Param] = &[uint("address")];
const REG: &[Param] = &[uint("reg_idx")];
const REG_VALUE: &[Param] = &[uint("reg_idx"), sint("value")];
const BREAKPOINT: &[Param] = &[uint("bp_idx"), uint("address")];
const BULK: &[Param] = &[uint("buf_offset"), uint("num_bytes")];
const TRANSFER: &[Param] = &[uint("buf_offset"), uint("address"), uint("num_bytes")];

pub static COMMANDS: &[CommandDescriptor] = &[
    cmd("HELP",             NONE,       Handler::Help,               false),
    cmd("VERSION",          NONE,       Handler::Version,            false),
    cmd("MCU:ATTACH",       NONE,       Handler::Attach,             false),
    cmd("MCU:DETACH",       PC,         Handler::Detach,             true),
    cmd("MCU:GET_ID",       NONE,       Handler::GetId,              true),
    cmd("MCU:RESET",        NONE,       Handler::Reset,              true),
    cmd("MCU:CONTINUE",     NONE,       Handler::Continue,           true),
    cmd("MCU:HALT",         NONE,       Handler::Halt,               true),
    cmd("MCU:STEP",         NONE,       Handler::Step,               true),
    cmd("MCU:IS_HALTED",    NONE,       Handler::IsHalted,           true),
    cmd("BUF:CAPACITY",     NONE,       Handler::BufCapacity,        false),
    cmd("BUF:UPLOAD_BIN",   BULK,       Handler::UploadBin,          false),
    cmd("BUF:DOWNLOAD_BIN", BULK,       Handler::DownloadBin,        false),
    cmd("RAM:READ",         TRANSFER,   Handler::RamRead,            true),
    cmd("RAM:WRITE",        TRANSFER,   Handler::RamWrite,           true),
    cmd("RAM:VERIFY",       TRANSFER,   Handler::RamVerify,          true),
    cmd("FLASH:WRITE",      TRANSFER,   Handler::FlashWrite,         true),
    cmd("FLASH:ERASE_ALL",  NONE,       Handler::EraseAll,           true),
    cmd("FLASH:ERASE_MAIN", NONE,       Handler::EraseMain,          true),
    cmd("FLASH:ERASE_SEG",  ADDRESS,    Handler::EraseSegment,       true),
    cmd("REG:READ",         REG,        Handler::RegRead,            true),
    cmd("REG:WRITE",        REG_VALUE,  Handler::RegWrite,           true),
    cmd("FUSES:GET_CONFIG", NONE,       Handler::GetConfigFuses,     true),
    cmd("BREAK:CLEAR_ALL",  NONE,       Handler::ClearBreakpoints,   true),
    cmd("BREAK:SET",        BREAKPOINT, Handler::SetBreakpoint,      true),
];

/// Find a command by name, ignoring case
pub fn lookup<'t>(table: &'t [CommandDescriptor], name: &[u8]) -> Option<&'t CommandDescriptor> {
    table.iter().find(|c| c.name.as_bytes().eq_ignore_ascii_case(name))
}

/// A parsed argument, borrowed from the request line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgumentValue<'a> {
    Symbol(&'a str),
    Unsigned(u32),
    Signed(i32),
}

impl ArgumentValue<'_> {
    /// Numeric value as a 32-bit word; signed values keep their two's complement bits
    pub fn word(&self) -> u32 {
        match *self {
            ArgumentValue::Unsigned(v) => v,
            ArgumentValue::Signed(v) => v as u32,
            ArgumentValue::Symbol(_) => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgError {
    /// Malformed token, missing or surplus arguments
    Invalid,
    /// Well-formed number that does not fit the parameter width
    Overflow,
}

impl From<ArgError> for StatusCode {
    fn from(e: ArgError) -> Self {
        match e {
            ArgError::Invalid => StatusCode::InvalidArguments,
            ArgError::Overflow => StatusCode::IntegerOverflow,
        }
    }
}

/// Parsed arguments of one request
#[derive(Debug)]
pub struct Arguments<'a> {
    values: [ArgumentValue<'a>; MAX_ARGS],
    len: usize,
}

impl<'a> Arguments<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<ArgumentValue<'a>> {
        self.values[..self.len].get(index).copied()
    }

    /// Numeric argument `index`, zero when absent
    pub fn word(&self, index: usize) -> u32 {
        self.get(index).map_or(0, |v| v.word())
    }
}

/// Whitespace-separated tokens of a request line
pub fn tokens(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|b| matches!(*b, b' ' | b'\t' | b'\r' | b'\n')).filter(|t| !t.is_empty())
}

/// Parse the remaining tokens of a request against `params`
pub fn parse_args<'a, I>(params: &[Param], mut tokens: I) -> Result<Arguments<'a>, ArgError>
    where I: Iterator<Item = &'a [u8]>
{
    let mut args = Arguments { values: [ArgumentValue::Unsigned(0); MAX_ARGS], len: 0 };
    for param in params.iter().take(MAX_ARGS) {
        let token = tokens.next().ok_or(ArgError::Invalid)?;
        args.values[args.len] = match param.kind {
            ParamKind::Symbol => ArgumentValue::Symbol(core::str::from_utf8(token).map_err(|_| ArgError::Invalid)?),
            ParamKind::Unsigned => ArgumentValue::Unsigned(parse_unsigned(token)?),
            ParamKind::Signed => ArgumentValue::Signed(parse_signed(token)?),
        };
        args.len += 1;
    }
    if tokens.next().is_some() {
        return Err(ArgError::Invalid);
    }
    Ok(args)
}

/// Digits of a C-style integer: `0x`/`0X` selects hex, a leading `0` octal, decimal otherwise.
/// Returns the magnitude and whether it overflowed `u32`.  Trailing garbage is `Invalid` even if
/// the digits before it overflowed.
fn parse_magnitude(digits: &[u8]) -> Result<(u32, bool), ArgError> {
    let (radix, digits) = match digits {
        [b'0', b'x' | b'X', rest @ ..] if !rest.is_empty() => (16, rest),
        [b'0', rest @ ..] if !rest.is_empty() => (8, rest),
        _ => (10, digits),
    };
    if digits.is_empty() {
        return Err(ArgError::Invalid);
    }
    let mut value: u32 = 0;
    let mut overflow = false;
    for &d in digits {
        let digit = (d as char).to_digit(radix).ok_or(ArgError::Invalid)?;
        match value.checked_mul(radix).and_then(|v| v.checked_add(digit)) {
            Some(v) => value = v,
            None => overflow = true,
        }
    }
    Ok((value, overflow))
}

pub fn parse_unsigned(token: &[u8]) -> Result<u32, ArgError> {
    let digits = token.strip_prefix(b"+").unwrap_or(token);
    match parse_magnitude(digits)? {
        (_, true) => Err(ArgError::Overflow),
        (value, false) => Ok(value),
    }
}

pub fn parse_signed(token: &[u8]) -> Result<i32, ArgError> {
    let (negative, digits) = match token {
        [b'-', rest @ ..] => (true, rest),
        [b'+', rest @ ..] => (false, rest),
        _ => (false, token),
    };
    let (magnitude, overflow) = parse_magnitude(digits)?;
    if overflow {
        return Err(ArgError::Overflow);
    }
    if negative {
        0i32.checked_sub_unsigned(magnitude).ok_or(ArgError::Overflow)
    } else {
        i32::try_from(magnitude).map_err(|_| ArgError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<'a>(params: &[Param], line: &'a str) -> Result<Arguments<'a>, ArgError> {
        parse_args(params, tokens(line.as_bytes()))
    }

    #[test]
    fn unsigned_bases() {
        assert_eq!(parse_unsigned(b"42"), Ok(42));
        assert_eq!(parse_unsigned(b"0x2A"), Ok(42));
        assert_eq!(parse_unsigned(b"0X2a"), Ok(42));
        assert_eq!(parse_unsigned(b"052"), Ok(42));
        assert_eq!(parse_unsigned(b"0"), Ok(0));
        assert_eq!(parse_unsigned(b"+7"), Ok(7));
        assert_eq!(parse_unsigned(b"0xffffffff"), Ok(u32::MAX));
    }

    #[test]
    fn malformed_tokens_never_partially_parse() {
        let malformed: [&[u8]; 8] = [b"12x", b"0x", b"08", b"", b"-1", b"0xg", b"1 2", b"--1"];
        for bad in malformed {
            assert_eq!(parse_unsigned(bad), Err(ArgError::Invalid), "{:?}", bad);
        }
        assert_eq!(parse_signed(b"12x"), Err(ArgError::Invalid));
        assert_eq!(parse_signed(b"-"), Err(ArgError::Invalid));
    }

    #[test]
    fn overflow_is_distinct_from_malformed() {
        assert_eq!(parse_unsigned(b"0x100000000"), Err(ArgError::Overflow));
        assert_eq!(parse_unsigned(b"4294967296"), Err(ArgError::Overflow));
        assert_eq!(parse_unsigned(b"99999999999x"), Err(ArgError::Invalid));
        assert_eq!(parse_signed(b"2147483648"), Err(ArgError::Overflow));
        assert_eq!(parse_signed(b"-2147483649"), Err(ArgError::Overflow));
    }

    #[test]
    fn signed_range() {
        assert_eq!(parse_signed(b"-1"), Ok(-1));
        assert_eq!(parse_signed(b"-0x10"), Ok(-16));
        assert_eq!(parse_signed(b"-2147483648"), Ok(i32::MIN));
        assert_eq!(parse_signed(b"2147483647"), Ok(i32::MAX));
    }

    #[test]
    fn arity_is_exact() {
        let params = &[uint("a"), uint("b")];
        let args = parse(params, "1 0x2").unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args.get(1), Some(ArgumentValue::Unsigned(2)));
        assert_eq!(parse(params, "1").unwrap_err(), ArgError::Invalid);
        assert_eq!(parse(params, "1 2 3").unwrap_err(), ArgError::Invalid);
        assert!(parse(&[], "").unwrap().is_empty());
    }

    #[test]
    fn first_bad_token_decides() {
        let params = &[uint("a"), uint("b")];
        assert_eq!(parse(params, "0x100000000 zz").unwrap_err(), ArgError::Overflow);
        assert_eq!(parse(params, "zz 0x100000000").unwrap_err(), ArgError::Invalid);
    }

    #[test]
    fn symbols_borrow_the_line() {
        let params = &[Param { name: "s", kind: ParamKind::Symbol }, sint("v")];
        let args = parse(params, "\tfoo  -5\r").unwrap();
        assert_eq!(args.get(0), Some(ArgumentValue::Symbol("foo")));
        assert_eq!(args.word(1), (-5i32) as u32);
    }

    #[test]
    fn names_are_case_insensitive_and_unique() {
        assert_eq!(lookup(COMMANDS, b"mcu:get_id").unwrap().handler, Handler::GetId);
        assert_eq!(lookup(COMMANDS, b"Buf:Upload_Bin").unwrap().handler, Handler::UploadBin);
        assert!(lookup(COMMANDS, b"MCU:GET").is_none());
        for (i, a) in COMMANDS.iter().enumerate() {
            assert!(a.params.len() <= MAX_ARGS);
            for b in &COMMANDS[i + 1..] {
                assert!(!a.name.eq_ignore_ascii_case(b.name));
            }
        }
    }
}
