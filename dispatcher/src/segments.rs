//! Count the SMS segments a text occupies.

use crate::Error;

const ASCII_SINGLE: usize = 160;
const ASCII_MULTI: usize = 153;
const UNICODE_SINGLE: usize = 70;
const UNICODE_MULTI: usize = 67;

/// Returns the number of segments needed to deliver `text`.
pub fn count(text: &str) -> usize {
    let (single, multi) = if text.is_ascii() {
        (ASCII_SINGLE, ASCII_MULTI)
    } else {
        (UNICODE_SINGLE, UNICODE_MULTI)
    };
    let chars = text.chars().count();
    if chars < single {
        return 1;
    }
    chars.div_ceil(multi)
}

/// Ensure `text` occupies exactly `expected` segments.
pub fn check(text: &str, expected: usize) -> Result<(), Error> {
    let actual = count(text);
    if actual != expected {
        return Err(Error::SegmentMismatch { expected, actual });
    }
    Ok(())
}
