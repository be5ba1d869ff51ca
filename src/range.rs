//! Byte ranges as used by `Range` and `Content-Range` headers (RFC 7233).

use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;

/// A span of bytes.
///
/// A negative `pos` counts from the end of the data: with no length it is a
/// suffix range naming the last `-pos` bytes, with a length it wraps around
/// the end and continues from offset zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pos: i64,
    length: Option<i64>,
}

impl Range {
    /// Normalize `(pos, length)` into canonical form.
    ///
    /// A negative `length` means the span ends at `pos` and extends backwards.
    pub fn new(pos: i64, length: Option<i64>) -> Result<Self, FormatError> {
        let unrepresentable = || {
            FormatError::Range(format!(
                "span of {:?} bytes at {} cannot be represented",
                length, pos
            ))
        };

        // Every position must survive negation for display.
        if pos == i64::MIN {
            return Err(unrepresentable());
        }
        let Some(length) = length else {
            return Ok(Self { pos, length: None });
        };

        // `pos` of -1 is the last byte, so a backwards span from it is a suffix.
        if pos == -1 && length < 0 {
            if length == i64::MIN {
                return Err(unrepresentable());
            }
            return Ok(Self {
                pos: length,
                length: None,
            });
        }

        // ... -5 -4 -3 -2 -1 0
        //         |-----|
        if pos < 0 && (length < 0 || pos < -length) {
            return Err(unrepresentable());
        }

        let (pos, length) = if length < 0 {
            let span = length.checked_neg().ok_or_else(unrepresentable)?;
            (pos + length + 1, span)
        } else {
            (pos, length)
        };

        let end = pos.checked_add(length).ok_or_else(unrepresentable)?;
        // A span ending exactly at the end of the data is a suffix.
        if end == 0 {
            return Ok(Self { pos, length: None });
        }

        Ok(Self {
            pos,
            length: Some(length),
        })
    }

    /// Everything from `pos` to the end of the data.
    pub fn from(pos: u64) -> Result<Self, FormatError> {
        Self::new(position(pos)?, None)
    }

    /// The last `n` bytes of the data.
    pub fn suffix(n: u64) -> Result<Self, FormatError> {
        Self::new(-position(n)?, None)
    }

    /// `length` bytes starting at `pos`.
    pub fn span(pos: u64, length: u64) -> Result<Self, FormatError> {
        Self::new(position(pos)?, Some(position(length)?))
    }

    pub fn pos(&self) -> i64 {
        self.pos
    }

    pub fn length(&self) -> Option<i64> {
        self.length
    }

    /// Inclusive last position for a range starting at a non-negative offset.
    pub fn last(&self) -> Option<i64> {
        match self.length {
            Some(length) if self.pos >= 0 => Some(self.pos + length - 1),
            _ => None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let invalid = || FormatError::Range(format!("{:?}", text));

        if let Some(rest) = text.strip_prefix('-') {
            let (suffix, wrapped) = match rest.split_once(',') {
                Some((suffix, wrapped)) => (suffix, Some(wrapped)),
                None => (rest, None),
            };
            let suffix = parse_position(suffix).ok_or_else(invalid)?;
            if suffix == 0 {
                return Err(invalid());
            }

            return match wrapped {
                None => Self::new(-suffix, None),
                Some(wrapped) => {
                    let last = wrapped
                        .strip_prefix("0-")
                        .and_then(parse_position)
                        .ok_or_else(invalid)?;
                    let length = suffix
                        .checked_add(last)
                        .and_then(|n| n.checked_add(1))
                        .ok_or_else(invalid)?;
                    Self::new(-suffix, Some(length))
                }
            };
        }

        let (first, last) = text.split_once('-').ok_or_else(invalid)?;
        let first = parse_position(first).ok_or_else(invalid)?;
        if last.is_empty() {
            return Self::new(first, None);
        }

        let last = parse_position(last).ok_or_else(invalid)?;
        // Both ends are non-negative, so only the `+ 1` can overflow.
        let length = (last - first).checked_add(1).ok_or_else(invalid)?;
        if length < 0 {
            return Err(invalid());
        }
        Self::new(first, Some(length))
    }
}

fn position(n: u64) -> Result<i64, FormatError> {
    i64::try_from(n).map_err(|_| FormatError::Range(format!("position {} out of range", n)))
}

fn parse_position(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.pos < 0, self.length) {
            (true, None) => write!(f, "-{}", -self.pos),
            (true, Some(length)) => write!(f, "-{},0-{}", -self.pos, length + self.pos - 1),
            (false, None) => write!(f, "{}-", self.pos),
            (false, Some(length)) => write!(f, "{}-{}", self.pos, self.pos + length - 1),
        }
    }
}

impl FromStr for Range {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(r: Range) -> (i64, Option<i64>) {
        (r.pos(), r.length())
    }

    #[test]
    fn test_new_normalizes() {
        let cases: &[((i64, Option<i64>), (i64, Option<i64>))] = &[
            ((0, None), (0, None)),
            ((1, None), (1, None)),
            ((0, Some(1)), (0, Some(1))),
            ((1, Some(2)), (1, Some(2))),
            ((-1, None), (-1, None)),
            ((-1, Some(1)), (-1, None)),
            ((-2, None), (-2, None)),
            ((1, Some(1)), (1, Some(1))),
            ((1, Some(-1)), (1, Some(1))),
            ((2, Some(-2)), (1, Some(2))),
            ((1, Some(-4)), (-2, Some(4))),
            ((0, Some(-4)), (-3, Some(4))),
            ((-1, Some(-4)), (-4, None)),
            ((0, Some(-2)), (-1, Some(2))),
        ];
        for &((pos, length), expected) in cases {
            let r = Range::new(pos, length).unwrap();
            assert_eq!(shape(r), expected, "Range::new({}, {:?})", pos, length);
        }
    }

    #[test]
    fn test_new_rejects_unrepresentable() {
        assert!(Range::new(-3, Some(2)).is_err());
        assert!(Range::new(-2, Some(-1)).is_err());
    }

    #[test]
    fn test_parse() {
        let cases: &[(&str, (i64, Option<i64>))] = &[
            ("0-", (0, None)),
            ("1-", (1, None)),
            ("0-0", (0, Some(1))),
            ("1-1", (1, Some(1))),
            ("0-2", (0, Some(3))),
            ("1-2", (1, Some(2))),
            ("-1", (-1, None)),
            ("-3,0-2", (-3, Some(6))),
        ];
        for &(text, expected) in cases {
            assert_eq!(shape(Range::parse(text).unwrap()), expected, "{}", text);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "-", "a-", "1-b", "+1-2", "5-2", "-0", "-3,1-2", "-3,", "1"] {
            assert!(Range::parse(text).is_err(), "{:?}", text);
        }
    }

    #[test]
    fn test_to_string() {
        let cases: &[((i64, Option<i64>), &str)] = &[
            ((1, None), "1-"),
            ((0, Some(1)), "0-0"),
            ((0, Some(2)), "0-1"),
            ((1, Some(2)), "1-2"),
            ((2, Some(-1)), "2-2"),
            ((2, Some(-2)), "1-2"),
            ((0, Some(-2)), "-1,0-0"),
            ((-2, None), "-2"),
            ((2, Some(-6)), "-3,0-2"),
            ((0, Some(-4)), "-3,0-0"),
        ];
        for &((pos, length), expected) in cases {
            assert_eq!(Range::new(pos, length).unwrap().to_string(), expected);
        }
    }

    #[test]
    fn test_round_trip_every_shape() {
        let ranges = [
            Range::from(0).unwrap(),
            Range::from(7).unwrap(),
            Range::span(0, 1).unwrap(),
            Range::span(5, 1).unwrap(),
            Range::span(5, 0).unwrap(),
            Range::span(3, 1024).unwrap(),
            Range::suffix(1).unwrap(),
            Range::suffix(42).unwrap(),
            Range::new(-1, Some(2)).unwrap(),
            Range::new(-3, Some(6)).unwrap(),
        ];
        for r in ranges {
            assert_eq!(Range::parse(&r.to_string()).unwrap(), r, "{}", r);
        }
    }

    #[test]
    fn test_last() {
        assert_eq!(Range::span(10, 5).unwrap().last(), Some(14));
        assert_eq!(Range::from(10).unwrap().last(), None);
        assert_eq!(Range::suffix(3).unwrap().last(), None);
    }

    #[test]
    fn test_parse_rejects_overflowing_spans() {
        for text in [
            "0-9223372036854775807",
            "-9223372036854775807,0-9223372036854775807",
            "-9223372036854775807,0-1",
            "0-99999999999999999999",
        ] {
            assert!(Range::parse(text).is_err(), "{:?}", text);
        }
        // the largest span that still fits
        assert_eq!(
            Range::parse("0-9223372036854775806").unwrap().length(),
            Some(i64::MAX)
        );
    }

    #[test]
    fn test_new_rejects_overflow() {
        assert!(Range::new(i64::MIN, None).is_err());
        assert!(Range::new(-1, Some(i64::MIN)).is_err());
        assert!(Range::new(0, Some(i64::MIN)).is_err());
        assert!(Range::new(i64::MAX, Some(1)).is_err());
        assert!(Range::new(1, Some(i64::MAX)).is_err());
        assert!(Range::from(u64::MAX).is_err());
        assert!(Range::suffix(u64::MAX).is_err());
        assert!(Range::span(1 << 63, 1).is_err());
    }
}
