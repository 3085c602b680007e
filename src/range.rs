use std::fmt;

use serde::Deserialize;

const BYTES_UNIT: &str = "bytes=";

/// An inclusive, 0-indexed span of bytes inside a representation of known size.
///
/// Only produced by [`parse_range`], which guarantees `start <= end < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteInterval {
    start: u64,
    end: u64,
}

impl ByteInterval {
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte of the interval, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered, `end - start + 1`. Never zero.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`; an interval covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Exclusive end, as used by [`std::ops::Range`].
    pub fn end_exclusive(&self) -> u64 {
        self.end + 1
    }
}

impl fmt::Display for ByteInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// What to do with a range whose first byte lies after its last byte,
/// e.g. `bytes=10-5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvertedRange {
    /// Move the start to one byte before the end and serve the final two
    /// bytes of the requested window.
    #[default]
    Clamp,
    /// Answer 416 Range Not Satisfiable.
    Reject,
}

/// Why a `Range` header could not be resolved to a [`ByteInterval`].
/// Every variant is answered with 416.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("no Range header supplied")]
    Missing,
    #[error("malformed Range header {0:?}")]
    Malformed(String),
    #[error("range cannot be satisfied by the representation")]
    Unsatisfiable,
}

/// Resolve a raw `Range` header value against a representation of `total`
/// bytes.
///
/// Only single ranges in the `bytes` unit are understood:
///
/// - `bytes=500-599` serves bytes 500 through 599
/// - `bytes=900-` serves from byte 900 to the last byte
/// - `bytes=-100` serves the last 100 bytes
///
/// An end past the last byte is clamped to it, and an end that is not a
/// number is read as "to the end". Lists such as `bytes=0-1,5-9` are
/// rejected as malformed.
pub fn parse_range(
    header: Option<&str>,
    total: u64,
    inverted: InvertedRange,
) -> Result<ByteInterval, RangeError> {
    let header = header.ok_or(RangeError::Missing)?;
    let malformed = || RangeError::Malformed(header.to_string());

    let ranges = header.trim().strip_prefix(BYTES_UNIT).ok_or_else(malformed)?;
    if ranges.contains(',') {
        return Err(malformed());
    }

    let (first, last) = ranges.split_once('-').ok_or_else(malformed)?;
    if last.contains('-') {
        return Err(malformed());
    }
    let (first, last) = (first.trim(), last.trim());

    if total == 0 {
        return Err(RangeError::Unsatisfiable);
    }
    let last_byte = total - 1;

    if first.is_empty() {
        let suffix: u64 = last.parse().map_err(|_| malformed())?;
        if suffix == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        let start = total - suffix.min(total);
        return Ok(ByteInterval { start, end: last_byte });
    }

    let start: u64 = first.parse().map_err(|_| malformed())?;
    if start > last_byte {
        return Err(RangeError::Unsatisfiable);
    }

    let end = last.parse::<u64>().map_or(last_byte, |end| end.min(last_byte));

    if start > end {
        return match inverted {
            InvertedRange::Clamp => Ok(ByteInterval {
                start: end.saturating_sub(1),
                end,
            }),
            InvertedRange::Reject => Err(RangeError::Unsatisfiable),
        };
    }

    Ok(ByteInterval { start, end })
}
