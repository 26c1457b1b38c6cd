//! Delimiter scanning and record parsing over the mapped input.

use crate::error::Error;
use crate::measurement::{self, Measurement};

/// Width of one vector scan, and therefore the number of readable bytes the
/// input buffer must carry past its logical end. The padding bytes are
/// zeroed, and zero never matches either delimiter, so a scan that runs
/// into the padding simply reports no match.
pub const SCAN_PADDING: usize = 16;

/// Returns the offset of the first occurrence of `target` in `window`.
///
/// Compares a broadcast of `target` against full 16-byte loads and picks
/// the first set bit of the match mask; the sub-vector tail falls back to
/// a byte-by-byte scan. Loads only happen while a whole vector fits inside
/// `window`, so the caller controls the overread by sizing the window.
#[cfg(target_arch = "x86_64")]
pub fn find_byte(window: &[u8], target: u8) -> Option<usize> {
    use std::arch::x86_64::{
        __m128i, _mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi8,
    };

    let mut i = 0;
    while i + SCAN_PADDING <= window.len() {
        // SAFETY: the loop condition guarantees 16 readable bytes at `i`.
        // SSE2 is part of the x86_64 baseline.
        let mask = unsafe {
            let chunk = _mm_loadu_si128(window.as_ptr().add(i) as *const __m128i);
            _mm_movemask_epi8(_mm_cmpeq_epi8(chunk, _mm_set1_epi8(target as i8)))
        };
        if mask != 0 {
            return Some(i + mask.trailing_zeros() as usize);
        }
        i += SCAN_PADDING;
    }
    memchr::memchr(target, &window[i..]).map(|pos| i + pos)
}

/// Behavior-identical scalar fallback for targets without the vector kernel.
#[cfg(not(target_arch = "x86_64"))]
pub fn find_byte(window: &[u8], target: u8) -> Option<usize> {
    memchr::memchr(target, window)
}

/// One parsed record: a borrowed name, its scaled measurement, and the
/// bytes the record occupied including the line terminator.
#[derive(Debug)]
pub struct Record<'a> {
    pub name: &'a [u8],
    pub value: Measurement,
    pub len: usize,
}

/// Parses the record starting at `pos`.
///
/// `buf` is the padded input buffer and `end` the record-aligned end of the
/// caller's range; `end + SCAN_PADDING` must be within `buf`. A record that
/// does not complete before `end` is a fatal parse error, never an
/// out-of-bounds read.
pub fn parse_record<'a>(buf: &'a [u8], pos: usize, end: usize) -> Result<Record<'a>, Error> {
    debug_assert!(pos < end && end + SCAN_PADDING <= buf.len());

    let sep = match find_byte(&buf[pos..end + SCAN_PADDING], b';') {
        Some(offset) if pos + offset < end => pos + offset,
        _ => return Err(Error::MissingDelimiter { offset: pos }),
    };
    let name = &buf[pos..sep];

    let (value, digits) = measurement::parse_fixed_point(&buf[sep + 1..end], sep + 1)?;

    let terminator = sep + 1 + digits;
    match buf.get(terminator) {
        Some(&b'\n') if terminator < end => Ok(Record {
            name,
            value,
            len: terminator + 1 - pos,
        }),
        Some(&byte) if terminator < end => Err(Error::Malformed {
            offset: terminator,
            byte,
        }),
        _ => Err(Error::MissingTerminator { offset: terminator }),
    }
}
