//! UTF-16 <-> UTF-8 conversion for strings crossing the boundary
//!
//! Host strings are sequences of UTF-16 code units. The guest only ever sees
//! UTF-8, so every string copied out is converted with [`encode_utf8`] and
//! every string copied in is converted with [`decode_utf8`].
//!
//! Encoding follows the classic unit-by-unit algorithm:
//!
//! | Code unit                  | Bytes |
//! |----------------------------|-------|
//! | `< 0x80`                   | 1     |
//! | `< 0x800`                  | 2     |
//! | `< 0xD800` or `>= 0xE000`  | 3     |
//! | high surrogate + next unit | 4     |
//!
//! How unpaired surrogates are treated is selected with [`SurrogatePolicy`].

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

const HIGH_SURROGATES: std::ops::RangeInclusive<u16> = 0xD800..=0xDBFF;
const LOW_SURROGATES: std::ops::RangeInclusive<u16> = 0xDC00..=0xDFFF;

/// Treatment of surrogate code units that do not form a valid pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurrogatePolicy {
    /// A high surrogate always consumes the following unit as its low half,
    /// whatever it is (a missing unit counts as `0`). A lone low surrogate is
    /// encoded as an ordinary 3-byte unit.
    #[default]
    Lenient,
    /// Any surrogate that is not part of a high/low pair is rejected.
    Strict,
}

/// Iterator over the code points of a UTF-16 sequence
///
/// Yields one code point per unit, or per surrogate pair.
pub struct CodePoints<'a> {
    units: &'a [u16],
    pos: usize,
    policy: SurrogatePolicy,
}

/// Iterate the code points of `units` under `policy`
pub fn code_points(units: &[u16], policy: SurrogatePolicy) -> CodePoints<'_> {
    CodePoints { units, pos: 0, policy }
}

impl Iterator for CodePoints<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.units.len() {
            return None;
        }
        let step = match self.policy {
            SurrogatePolicy::Lenient => Ok(lenient_step(self.units, self.pos)),
            SurrogatePolicy::Strict => strict_step(self.units, self.pos),
        };
        match step {
            Ok((cp, consumed)) => {
                self.pos += consumed;
                Some(Ok(cp))
            }
            Err(err) => {
                // Stop after the first error
                self.pos = self.units.len();
                Some(Err(err))
            }
        }
    }
}

/// Decode the code point starting at `pos`, returning it and the number of
/// units consumed.
fn lenient_step(units: &[u16], pos: usize) -> (u32, usize) {
    let unit = units[pos];
    if HIGH_SURROGATES.contains(&unit) {
        let low = units.get(pos + 1).copied().unwrap_or(0);
        (combine_pair(unit, low), 2)
    } else {
        (u32::from(unit), 1)
    }
}

fn strict_step(units: &[u16], pos: usize) -> Result<(u32, usize)> {
    let unit = units[pos];
    if HIGH_SURROGATES.contains(&unit) {
        match units.get(pos + 1) {
            Some(&low) if LOW_SURROGATES.contains(&low) => Ok((combine_pair(unit, low), 2)),
            _ => Err(BridgeError::MalformedUtf16 { index: pos }),
        }
    } else if LOW_SURROGATES.contains(&unit) {
        Err(BridgeError::MalformedUtf16 { index: pos })
    } else {
        Ok((u32::from(unit), 1))
    }
}

#[inline]
fn combine_pair(high: u16, low: u16) -> u32 {
    0x10000 + (((u32::from(high) & 0x3FF) << 10) | (u32::from(low) & 0x3FF))
}

/// Number of UTF-8 bytes needed for a code point
#[inline]
fn utf8_width(cp: u32) -> usize {
    if cp < 0x80 {
        1
    } else if cp < 0x800 {
        2
    } else if cp < 0x10000 {
        3
    } else {
        4
    }
}

#[inline]
fn push_code_point(out: &mut Vec<u8>, cp: u32) {
    match utf8_width(cp) {
        1 => out.push(cp as u8),
        2 => out.extend_from_slice(&[0xC0 | (cp >> 6) as u8, 0x80 | (cp & 0x3F) as u8]),
        3 => out.extend_from_slice(&[
            0xE0 | (cp >> 12) as u8,
            0x80 | ((cp >> 6) & 0x3F) as u8,
            0x80 | (cp & 0x3F) as u8,
        ]),
        _ => out.extend_from_slice(&[
            0xF0 | (cp >> 18) as u8,
            0x80 | ((cp >> 12) & 0x3F) as u8,
            0x80 | ((cp >> 6) & 0x3F) as u8,
            0x80 | (cp & 0x3F) as u8,
        ]),
    }
}

/// Encode UTF-16 code units as UTF-8 using the lenient policy
///
/// Never fails: every input produces some byte sequence.
pub fn encode_utf8(units: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(units.len());
    let mut pos = 0;
    while pos < units.len() {
        let (cp, consumed) = lenient_step(units, pos);
        push_code_point(&mut out, cp);
        pos += consumed;
    }
    out
}

/// Encode UTF-16 code units as UTF-8 under `policy`
///
/// # Errors
/// Returns `MalformedUtf16` under [`SurrogatePolicy::Strict`] when an
/// unpaired surrogate is found.
pub fn encode_utf8_with(units: &[u16], policy: SurrogatePolicy) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(units.len());
    encode_utf8_into(units, policy, &mut out)?;
    Ok(out)
}

/// Append the UTF-8 encoding of `units` to `out`
///
/// On error `out` is left with whatever was appended before the bad unit.
pub fn encode_utf8_into(units: &[u16], policy: SurrogatePolicy, out: &mut Vec<u8>) -> Result<()> {
    for cp in code_points(units, policy) {
        push_code_point(out, cp?);
    }
    Ok(())
}

/// Exact length of the UTF-8 encoding of `units`, without allocating
pub fn encoded_len(units: &[u16], policy: SurrogatePolicy) -> Result<usize> {
    code_points(units, policy).try_fold(0usize, |len, cp| Ok(len + utf8_width(cp?)))
}

/// Decode guest UTF-8 bytes into host UTF-16 code units
///
/// Reading stops at the first NUL byte, if any. Malformed sequences are
/// replaced with U+FFFD rather than rejected.
pub fn decode_utf8(bytes: &[u8]) -> Vec<u16> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).encode_utf16().collect()
}
