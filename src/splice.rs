//! Byte ranges over a target that only does aligned 8 and 16 bit accesses.
//!
//! Every operation walks the range the same way: one byte access for an odd start, word
//! accesses (low byte first) while two or more bytes remain, one byte access for a trailing odd
//! byte.  The first failing access aborts the walk and its error is returned as is.
//!
//! A range reaching past the end of the target's address space is refused before the first
//! access.  The watchdog is fed before every access so long transfers cannot starve it.
use crate::device::{Device, Width};
use crate::status::Error;
use crate::transport::Watchdog;

/// Words handed to one `write_flash_words` call
const FLASH_CHUNK_WORDS: usize = 64;

enum Step {
    Byte(u32, usize),
    Word(u32, usize),
}

/// Yields the accesses covering `[address, address + len)` with their buffer offsets
fn steps(address: u32, len: usize) -> impl Iterator<Item = Step> {
    let mut cursor = 0usize;
    core::iter::from_fn(move || {
        if cursor >= len {
            return None;
        }
        let at = address.wrapping_add(cursor as u32);
        let step = if at & 1 != 0 || len - cursor == 1 {
            Step::Byte(at, cursor)
        } else {
            Step::Word(at, cursor)
        };
        cursor += match step { Step::Byte(..) => 1, Step::Word(..) => 2 };
        Some(step)
    })
}

fn check<D: Device + ?Sized>(dev: &D, address: u32, len: usize) -> Result<(), Error> {
    let len = u32::try_from(len).map_err(|_| Error::AddressRange { address, len: u32::MAX })?;
    dev.check_range(address, len)
}

pub fn read_memory<D, W>(dev: &mut D, watchdog: &mut W, address: u32, buf: &mut [u8]) -> Result<(), Error>
where
    D: Device + ?Sized,
    W: Watchdog + ?Sized,
{
    check(dev, address, buf.len())?;
    for step in steps(address, buf.len()) {
        watchdog.feed();
        match step {
            Step::Byte(at, i) => buf[i] = dev.read_mem(Width::Byte, at)? as u8,
            Step::Word(at, i) => {
                let word = dev.read_mem(Width::Word, at)?;
                buf[i..i + 2].copy_from_slice(&word.to_le_bytes());
            }
        }
    }
    Ok(())
}

pub fn write_ram<D, W>(dev: &mut D, watchdog: &mut W, address: u32, buf: &[u8]) -> Result<(), Error>
where
    D: Device + ?Sized,
    W: Watchdog + ?Sized,
{
    check(dev, address, buf.len())?;
    for step in steps(address, buf.len()) {
        watchdog.feed();
        match step {
            Step::Byte(at, i) => dev.write_mem(Width::Byte, at, buf[i] as u16)?,
            Step::Word(at, i) => dev.write_mem(Width::Word, at, u16::from_le_bytes([buf[i], buf[i + 1]]))?,
        }
    }
    Ok(())
}

/// Compare target memory against `expected`.  `Ok(false)` means the transfer worked but at
/// least one access read back different contents.
pub fn verify<D, W>(dev: &mut D, watchdog: &mut W, address: u32, expected: &[u8]) -> Result<bool, Error>
where
    D: Device + ?Sized,
    W: Watchdog + ?Sized,
{
    check(dev, address, expected.len())?;
    let mut matches = true;
    for step in steps(address, expected.len()) {
        watchdog.feed();
        match step {
            Step::Byte(at, i) => {
                matches &= dev.read_mem(Width::Byte, at)? as u8 == expected[i];
            }
            Step::Word(at, i) => {
                matches &= dev.read_mem(Width::Word, at)? == u16::from_le_bytes([expected[i], expected[i + 1]]);
            }
        }
    }
    Ok(matches)
}

/// Program flash.  Flash is written in whole words, so an odd byte at either edge is merged into
/// the word currently in flash, keeping its other half.
pub fn write_flash<D, W>(dev: &mut D, watchdog: &mut W, address: u32, buf: &[u8]) -> Result<(), Error>
where
    D: Device + ?Sized,
    W: Watchdog + ?Sized,
{
    check(dev, address, buf.len())?;
    let mut cursor = 0usize;

    if address & 1 != 0 && !buf.is_empty() {
        watchdog.feed();
        let base = address & !1;
        let word = dev.read_mem(Width::Word, base)?;
        let merged = (word & 0x00ff) | (buf[0] as u16) << 8;
        dev.write_flash_words(base, &[merged])?;
        cursor = 1;
    }

    let mut chunk = [0u16; FLASH_CHUNK_WORDS];
    while buf.len() - cursor >= 2 {
        watchdog.feed();
        let words = ((buf.len() - cursor) / 2).min(FLASH_CHUNK_WORDS);
        for (w, pair) in chunk.iter_mut().zip(buf[cursor..cursor + 2 * words].chunks_exact(2)) {
            *w = u16::from_le_bytes([pair[0], pair[1]]);
        }
        dev.write_flash_words(address.wrapping_add(cursor as u32), &chunk[..words])?;
        cursor += 2 * words;
    }

    if cursor < buf.len() {
        watchdog.feed();
        let base = address.wrapping_add(cursor as u32);
        let word = dev.read_mem(Width::Word, base)?;
        let merged = (word & 0xff00) | buf[cursor] as u16;
        dev.write_flash_words(base, &[merged])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::{Access, FakeTarget};
    use crate::transport::testing::CountingWatchdog;
    use alloc::vec;
    use alloc::vec::Vec;

    fn idle() -> CountingWatchdog {
        CountingWatchdog::default()
    }

    fn widths(accesses: &[Access]) -> Vec<(Width, u32)> {
        accesses.iter().filter_map(|a| match *a {
            Access::Read(w, at) | Access::Write(w, at, _) => Some((w, at)),
            _ => None,
        }).collect()
    }

    #[test]
    fn access_sequence_per_parity_and_length() {
        use Width::*;
        let cases: &[(u32, usize, &[Width])] = &[
            (0x200, 0, &[]),
            (0x200, 1, &[Byte]),
            (0x200, 2, &[Word]),
            (0x200, 3, &[Word, Byte]),
            (0x201, 0, &[]),
            (0x201, 1, &[Byte]),
            (0x201, 2, &[Byte, Byte]),
            (0x201, 3, &[Byte, Word]),
        ];
        for &(address, len, expected) in cases {
            let mut dev = FakeTarget::new();
            let mut buf = vec![0; len];
            read_memory(&mut dev, &mut idle(), address, &mut buf).unwrap();
            let got: Vec<Width> = widths(&dev.accesses).into_iter().map(|(w, _)| w).collect();
            assert_eq!(got, expected, "address {:#x} len {}", address, len);
        }
    }

    #[test]
    fn seventeen_bytes() {
        let mut dev = FakeTarget::new();
        let data: Vec<u8> = (1..=17).collect();
        write_ram(&mut dev, &mut idle(), 0x200, &data).unwrap();
        let w = widths(&dev.accesses);
        assert_eq!(w.len(), 9);
        assert!(w[..8].iter().all(|&(w, _)| w == Width::Word));
        assert_eq!(w[8], (Width::Byte, 0x210));

        dev.accesses.clear();
        write_ram(&mut dev, &mut idle(), 0x301, &data).unwrap();
        let w = widths(&dev.accesses);
        assert_eq!(w.len(), 9);
        assert_eq!(w[0], (Width::Byte, 0x301));
        assert!(w[1..].iter().all(|&(w, _)| w == Width::Word));
        assert_eq!(w[8], (Width::Word, 0x310));
    }

    #[test]
    fn read_after_write_round_trips() {
        for address in [0x200u32, 0x201] {
            for len in [0usize, 1, 2, 3, 17] {
                let mut dev = FakeTarget::new();
                let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37).wrapping_add(5)).collect();
                write_ram(&mut dev, &mut idle(), address, &data).unwrap();
                let mut back = vec![0; len];
                read_memory(&mut dev, &mut idle(), address, &mut back).unwrap();
                assert_eq!(back, data);
                // neighbours untouched
                assert_eq!(dev.memory[address as usize - 1], 0);
                assert_eq!(dev.memory[address as usize + len], 0);
            }
        }
    }

    #[test]
    fn words_are_little_endian() {
        let mut dev = FakeTarget::new();
        write_ram(&mut dev, &mut idle(), 0x200, &[0x34, 0x12]).unwrap();
        assert_eq!(dev.accesses, vec![Access::Write(Width::Word, 0x200, 0x1234)]);
    }

    #[test]
    fn verify_reports_mismatch_as_soft_result() {
        let mut dev = FakeTarget::new();
        write_ram(&mut dev, &mut idle(), 0x201, &[1, 2, 3, 4]).unwrap();
        assert_eq!(verify(&mut dev, &mut idle(), 0x201, &[1, 2, 3, 4]), Ok(true));
        assert_eq!(verify(&mut dev, &mut idle(), 0x201, &[1, 2, 9, 4]), Ok(false));
        assert_eq!(verify(&mut dev, &mut idle(), 0x201, &[1, 2, 3, 5]), Ok(false));
    }

    #[test]
    fn failing_access_aborts_immediately() {
        let mut dev = FakeTarget::new();
        dev.fail_at = Some(0x204);
        let err = write_ram(&mut dev, &mut idle(), 0x200, &[0; 10]).unwrap_err();
        assert_eq!(err, Error::TransferFailed);
        // 0x200, 0x202, then the failing 0x204; nothing after it
        assert_eq!(widths(&dev.accesses).len(), 3);
        assert_eq!(dev.memory[0x206], 0);
    }

    #[test]
    fn flash_odd_byte_keeps_other_half() {
        let mut dev = FakeTarget::new();
        dev.memory[0xc000] = 0x5a;
        write_flash(&mut dev, &mut idle(), 0xc001, &[0x3c]).unwrap();
        assert_eq!(&dev.memory[0xc000..0xc002], &[0x5a, 0x3c]);
        assert_eq!(dev.accesses, vec![
            Access::Read(Width::Word, 0xc000),
            Access::Flash { address: 0xc000, words: 1 },
        ]);
    }

    #[test]
    fn flash_trailing_byte_keeps_high_half() {
        let mut dev = FakeTarget::new();
        dev.memory[0xc003] = 0x77;
        write_flash(&mut dev, &mut idle(), 0xc000, &[1, 2, 3]).unwrap();
        assert_eq!(&dev.memory[0xc000..0xc004], &[1, 2, 3, 0x77]);
    }

    #[test]
    fn flash_interior_uses_wide_writes() {
        let mut dev = FakeTarget::new();
        let data: Vec<u8> = (0..=200u8).collect();
        write_flash(&mut dev, &mut idle(), 0xc001, &data).unwrap();
        let flashes: Vec<(u32, usize)> = dev.accesses.iter().filter_map(|a| match *a {
            Access::Flash { address, words } => Some((address, words)),
            _ => None,
        }).collect();
        assert_eq!(flashes, vec![(0xc000, 1), (0xc002, 64), (0xc082, 36)]);
        let mut back = vec![0; data.len()];
        read_memory(&mut dev, &mut idle(), 0xc001, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn range_past_the_address_space_is_refused_up_front() {
        let mut dev = FakeTarget::new();
        let err = Error::AddressRange { address: 0xfffe, len: 4 };
        assert_eq!(write_ram(&mut dev, &mut idle(), 0xfffe, &[1, 2, 3, 4]), Err(err));
        assert_eq!(read_memory(&mut dev, &mut idle(), 0xfffe, &mut [0; 4]), Err(err));
        assert_eq!(verify(&mut dev, &mut idle(), 0xfffe, &[0; 4]), Err(err));
        assert_eq!(write_flash(&mut dev, &mut idle(), 0xfffe, &[0; 4]), Err(err));
        assert!(dev.accesses.is_empty());
        assert_eq!(&dev.memory[0xfffe..], &[0xff, 0xff]);

        // the last bytes of the space are still reachable
        write_flash(&mut dev, &mut idle(), 0xfffc, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&dev.memory[0xfffc..], &[1, 2, 3, 4]);
    }

    #[test]
    fn every_access_feeds_the_watchdog() {
        let mut dev = FakeTarget::new();
        let mut watchdog = CountingWatchdog::default();
        read_memory(&mut dev, &mut watchdog, 0x201, &mut [0; 0x101]).unwrap();
        assert_eq!(watchdog.feeds, widths(&dev.accesses).len());
        assert!(watchdog.feeds >= 0x80);

        let mut watchdog = CountingWatchdog::default();
        write_flash(&mut dev, &mut watchdog, 0xc001, &[0; 0x400]).unwrap();
        // odd head, 7 full chunks of 64 words and one of 63, odd tail
        assert_eq!(watchdog.feeds, 1 + 8 + 1);
    }
}
