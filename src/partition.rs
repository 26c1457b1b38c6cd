//! Record-aligned partitioning of the input range.

use std::ops::Range;

use crate::error::Error;

/// Splits `[0, buf.len())` into `workers` contiguous ranges with every
/// internal boundary immediately after a line terminator, so no record
/// straddles two workers.
///
/// Each range except the last ends at the last terminator at or before its
/// ideal even-split boundary; a range whose backward walk reaches its own
/// start collapses to length zero, which is how worker counts exceeding
/// the line count degrade. The final range absorbs every remaining byte.
pub fn partition(buf: &[u8], workers: usize) -> Result<Vec<Range<usize>>, Error> {
    debug_assert!(workers > 0);
    match buf.last() {
        Some(&b'\n') | None => {}
        // an unterminated final record would otherwise surface as a parse
        // error deep inside the last worker; reject it before fan-out
        Some(_) => return Err(Error::MissingTerminator { offset: buf.len() }),
    }

    let target = buf.len() / workers;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for _ in 0..workers - 1 {
        let end = match memchr::memrchr(b'\n', &buf[start..start + target]) {
            Some(pos) => start + pos + 1,
            None => start,
        };
        ranges.push(start..end);
        start = end;
    }
    ranges.push(start..buf.len());
    Ok(ranges)
}
