//! Fixed-point measurement parsing.
//!
//! Measurements carry exactly one fractional digit, so they are stored as
//! integers scaled by 10 (`-12.3` becomes `-123`). Summation then stays
//! exact; values are only turned back into decimals at format time.

use crate::error::Error;

/// A decimal measurement scaled by 10.
pub type Measurement = i32;

/// Parses `-?[0-9]+\.[0-9]` at the start of `text`, returning the scaled
/// value and the number of bytes consumed.
///
/// The fractional digit is folded into the running `value * 10 + digit`
/// accumulation like any other digit; a leading `-` flips the sign at the
/// end. `base` is the absolute file offset of `text[0]`, used to report
/// error positions against the whole input.
pub fn parse_fixed_point(text: &[u8], base: usize) -> Result<(Measurement, usize), Error> {
    let negative = text.first() == Some(&b'-');
    let mut i = usize::from(negative);
    let mut value: Measurement = 0;
    let mut integral_digits = 0;

    loop {
        match text.get(i) {
            Some(digit @ b'0'..=b'9') => {
                value = value * 10 + Measurement::from(digit - b'0');
                integral_digits += 1;
                i += 1;
            }
            Some(&b'.') if integral_digits > 0 => {
                i += 1;
                break;
            }
            Some(&byte) => return Err(Error::Malformed { offset: base + i, byte }),
            None => return Err(Error::MissingTerminator { offset: base + i }),
        }
    }

    let value = match text.get(i) {
        Some(digit @ b'0'..=b'9') => {
            i += 1;
            value * 10 + Measurement::from(digit - b'0')
        }
        Some(&byte) => return Err(Error::Malformed { offset: base + i, byte }),
        None => return Err(Error::MissingTerminator { offset: base + i }),
    };

    Ok((if negative { -value } else { value }, i))
}
