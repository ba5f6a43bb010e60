//! SET Option Scanner
//!
//! `SET key value [NX|XX] [GET] [EX seconds]` takes its options as a trailing
//! token sequence in any order. [`SetOptions::parse`] walks that sequence once,
//! left to right, and either produces a [`SetOptions`] record or stops at the
//! first malformed token.

use crate::commands::CommandError;
use bytes::Bytes;
use std::time::{Duration, Instant};

/// The parsed trailing options of a SET command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    /// Only set if the key does not exist
    pub nx: bool,
    /// Only set if the key already exists
    pub xx: bool,
    /// Reply with the previous value
    pub get: bool,
    /// Time to live, from `EX seconds`
    pub ttl: Option<Duration>,
}

/// One recognised option keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Nx,
    Xx,
    Get,
    Ex,
}

impl Keyword {
    fn from_token(token: &[u8]) -> Option<Self> {
        [
            (&b"NX"[..], Keyword::Nx),
            (&b"XX"[..], Keyword::Xx),
            (&b"GET"[..], Keyword::Get),
            (&b"EX"[..], Keyword::Ex),
        ]
        .into_iter()
        .find(|(name, _)| token.eq_ignore_ascii_case(name))
        .map(|(_, keyword)| keyword)
    }
}

impl SetOptions {
    /// Scans the tokens after `key value`.
    ///
    /// Keywords are case-insensitive. `EX` consumes the following token as a
    /// positive number of seconds. NX together with XX is rejected once the
    /// whole sequence has been read.
    ///
    /// # Example
    ///
    /// ```
    /// use sparkkv::commands::SetOptions;
    /// use bytes::Bytes;
    /// use std::time::Duration;
    ///
    /// let tokens = [Bytes::from("nx"), Bytes::from("EX"), Bytes::from("10")];
    /// let opts = SetOptions::parse(&tokens).unwrap();
    /// assert!(opts.nx);
    /// assert_eq!(opts.ttl, Some(Duration::from_secs(10)));
    /// ```
    pub fn parse(tokens: &[Bytes]) -> Result<Self, CommandError> {
        let mut opts = SetOptions::default();
        let mut tokens = tokens.iter();

        while let Some(token) = tokens.next() {
            match Keyword::from_token(token) {
                Some(Keyword::Nx) => opts.nx = true,
                Some(Keyword::Xx) => opts.xx = true,
                Some(Keyword::Get) => opts.get = true,
                Some(Keyword::Ex) => {
                    let seconds = tokens.next().ok_or(CommandError::ExRequiresSeconds)?;
                    opts.ttl = Some(parse_seconds(seconds)?);
                }
                // Reported upper-cased, like the keywords
                None => {
                    return Err(CommandError::SyntaxErrorNear(
                        String::from_utf8_lossy(token).to_ascii_uppercase(),
                    ))
                }
            }
        }

        if opts.nx && opts.xx {
            return Err(CommandError::NxXxIncompatible);
        }

        Ok(opts)
    }

    /// Converts the TTL into an absolute expiry instant measured from `now`.
    ///
    /// A TTL too large to represent is rejected as an invalid expire time.
    pub fn expires_at(&self, now: Instant) -> Result<Option<Instant>, CommandError> {
        match self.ttl {
            Some(ttl) => now
                .checked_add(ttl)
                .map(Some)
                .ok_or(CommandError::InvalidExpireTime),
            None => Ok(None),
        }
    }
}

/// Parses the EX argument: a strictly positive decimal integer.
fn parse_seconds(token: &[u8]) -> Result<Duration, CommandError> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|&secs| secs > 0)
        .map(|secs| Duration::from_secs(secs as u64))
        .ok_or(CommandError::InvalidExpireTime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn parse(items: &[&str]) -> Result<SetOptions, CommandError> {
        SetOptions::parse(&tokens(items))
    }

    #[test]
    fn test_no_options() {
        assert_eq!(parse(&[]), Ok(SetOptions::default()));
    }

    #[test]
    fn test_flags_any_order_and_case() {
        let opts = parse(&["get", "EX", "5", "Nx"]).unwrap();
        assert!(opts.nx);
        assert!(!opts.xx);
        assert!(opts.get);
        assert_eq!(opts.ttl, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_last_ex_wins() {
        let opts = parse(&["EX", "5", "EX", "7"]).unwrap();
        assert_eq!(opts.ttl, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_ex_requires_seconds() {
        assert_eq!(parse(&["EX"]), Err(CommandError::ExRequiresSeconds));
        assert_eq!(parse(&["NX", "EX"]), Err(CommandError::ExRequiresSeconds));
    }

    #[test]
    fn test_invalid_expire_time() {
        for bad in ["abc", "0", "-3", "1.5", ""] {
            assert_eq!(
                parse(&["EX", bad]),
                Err(CommandError::InvalidExpireTime),
                "EX {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_ex_consumes_following_keyword_as_seconds() {
        // EX's argument must immediately follow it
        assert_eq!(parse(&["EX", "NX"]), Err(CommandError::InvalidExpireTime));
    }

    #[test]
    fn test_unknown_token() {
        assert_eq!(
            parse(&["NX", "PX", "100"]),
            Err(CommandError::SyntaxErrorNear("PX".to_string()))
        );
        assert_eq!(
            parse(&["keepttl"]),
            Err(CommandError::SyntaxErrorNear("KEEPTTL".to_string()))
        );
    }

    #[test]
    fn test_nx_and_xx_incompatible() {
        assert_eq!(parse(&["NX", "XX"]), Err(CommandError::NxXxIncompatible));
        assert_eq!(
            parse(&["XX", "GET", "EX", "10", "NX"]),
            Err(CommandError::NxXxIncompatible)
        );
    }

    #[test]
    fn test_malformed_token_reported_before_nx_xx_conflict() {
        assert_eq!(
            parse(&["NX", "XX", "BOGUS"]),
            Err(CommandError::SyntaxErrorNear("BOGUS".to_string()))
        );
    }

    #[test]
    fn test_expires_at() {
        let now = Instant::now();

        let opts = parse(&["EX", "10"]).unwrap();
        assert_eq!(
            opts.expires_at(now),
            Ok(Some(now + Duration::from_secs(10)))
        );

        assert_eq!(SetOptions::default().expires_at(now), Ok(None));
    }

    #[test]
    fn test_expires_at_overflow() {
        let opts = parse(&["EX", i64::MAX.to_string().as_str()]).unwrap();
        assert_eq!(
            opts.expires_at(Instant::now()),
            Err(CommandError::InvalidExpireTime)
        );
    }
}
