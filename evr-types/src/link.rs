//! Device-link parameter strings.
//!
//! A link is a whitespace-delimited list of `key=value` tokens, parsed left
//! to right. Unknown keys are errors; each binding decides which keys it
//! accepts and which are required.

use crate::alarm::{Condition, Stat};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("unexpected link parameter {0:?}")]
    Unexpected(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("bad {key}= value {value:?}")]
    BadValue { key: &'static str, value: String },
    #[error("autoclear= must be 'yes' or 'no'")]
    Autoclear,
}

impl Condition for LinkError {
    fn stat(&self) -> Stat {
        Stat::Write
    }
}

/// Iterate `key=value` pairs left to right.
pub fn params(link: &str) -> impl Iterator<Item = Result<(&str, &str), LinkError>> {
    link.split_whitespace().map(|token| {
        token
            .split_once('=')
            .ok_or_else(|| LinkError::Unexpected(token.to_string()))
    })
}

/// Integer with automatic radix detection: a `0x` prefix is hex, a leading
/// `0` is octal, anything else decimal.
pub fn parse_int(s: &str) -> Option<i32> {
    let (sign, magnitude) = match *s.as_bytes().first()? {
        b'-' => (-1i64, &s[1..]),
        b'+' => (1, &s[1..]),
        _ => (1, s),
    };
    let (radix, digits) = if let Some(hex) = magnitude
        .strip_prefix("0x")
        .or_else(|| magnitude.strip_prefix("0X"))
    {
        (16, hex)
    } else if magnitude.len() > 1 && magnitude.starts_with('0') {
        (8, &magnitude[1..])
    } else {
        (10, magnitude)
    };
    if digits.is_empty() {
        return None;
    }
    let value = i64::from_str_radix(digits, radix).ok()?;
    i32::try_from(sign * value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_yield_pairs_in_order() {
        let pairs: Vec<_> = params("log=evt queue=q1 autoclear=no")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            pairs,
            vec![("log", "evt"), ("queue", "q1"), ("autoclear", "no")]
        );
    }

    #[test]
    fn params_allow_empty_values() {
        let pairs: Vec<_> = params("log=evt queue=").collect::<Result<_, _>>().unwrap();
        assert_eq!(pairs, vec![("log", "evt"), ("queue", "")]);
    }

    #[test]
    fn bare_token_is_unexpected() {
        let err = params("log=evt bogus").nth(1).unwrap().unwrap_err();
        assert_eq!(err, LinkError::Unexpected("bogus".to_string()));
    }

    #[test]
    fn parse_int_detects_radix() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-1"), Some(-1));
        assert_eq!(parse_int("+7"), Some(7));
        assert_eq!(parse_int("0"), Some(0));
        assert_eq!(parse_int("0x10"), Some(16));
        assert_eq!(parse_int("0X1f"), Some(31));
        assert_eq!(parse_int("010"), Some(8));
        assert_eq!(parse_int("-0x8"), Some(-8));
    }

    #[test]
    fn parse_int_rejects_garbage() {
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int("ten"), None);
        assert_eq!(parse_int("08"), None);
        assert_eq!(parse_int("4294967296"), None);
    }
}
