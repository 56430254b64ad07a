//! `Range` header handling for single byte ranges

/// What to send back for a request against an object of known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range: send the whole object
    Full,
    /// Inclusive window `start..=end`
    Partial { start: u64, end: u64 },
    /// Well-formed but outside the object
    Unsatisfiable,
}

impl ByteRange {
    /// Resolve a `Range` header value against `size`.
    ///
    /// Supports `bytes=a-b`, `bytes=a-` and `bytes=-n`. Other units,
    /// malformed values and multi-range requests fall back to `Full`.
    pub fn resolve(header: Option<&str>, size: u64) -> Self {
        let Some(ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
            return ByteRange::Full;
        };
        if ranges.contains(',') {
            return ByteRange::Full;
        }
        let Some((first, last)) = ranges.trim().split_once('-') else {
            return ByteRange::Full;
        };

        if first.is_empty() {
            let Ok(suffix) = last.parse::<u64>() else {
                return ByteRange::Full;
            };
            if suffix == 0 || size == 0 {
                return ByteRange::Unsatisfiable;
            }
            return ByteRange::Partial {
                start: size.saturating_sub(suffix),
                end: size - 1,
            };
        }

        let Ok(start) = first.parse::<u64>() else {
            return ByteRange::Full;
        };
        let end = if last.is_empty() {
            u64::MAX
        } else {
            match last.parse::<u64>() {
                Ok(end) if end >= start => end,
                _ => return ByteRange::Full,
            }
        };

        if start >= size {
            return ByteRange::Unsatisfiable;
        }
        ByteRange::Partial {
            start,
            end: end.min(size - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(start: u64, end: u64) -> ByteRange {
        ByteRange::Partial { start, end }
    }

    #[test]
    fn test_bounded_range() {
        assert_eq!(ByteRange::resolve(Some("bytes=0-499"), 1000), partial(0, 499));
        assert_eq!(ByteRange::resolve(Some("bytes=500-2000"), 1000), partial(500, 999));
    }

    #[test]
    fn test_open_ended_range() {
        assert_eq!(ByteRange::resolve(Some("bytes=900-"), 1000), partial(900, 999));
        assert_eq!(ByteRange::resolve(Some("bytes=0-"), 1000), partial(0, 999));
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(ByteRange::resolve(Some("bytes=-100"), 1000), partial(900, 999));
        assert_eq!(ByteRange::resolve(Some("bytes=-5000"), 1000), partial(0, 999));
        assert_eq!(ByteRange::resolve(Some("bytes=-0"), 1000), ByteRange::Unsatisfiable);
    }

    #[test]
    fn test_unsatisfiable() {
        assert_eq!(ByteRange::resolve(Some("bytes=1000-"), 1000), ByteRange::Unsatisfiable);
        assert_eq!(ByteRange::resolve(Some("bytes=0-10"), 0), ByteRange::Unsatisfiable);
    }

    #[test]
    fn test_ignored_headers() {
        assert_eq!(ByteRange::resolve(None, 10), ByteRange::Full);
        assert_eq!(ByteRange::resolve(Some("items=0-1"), 10), ByteRange::Full);
        assert_eq!(ByteRange::resolve(Some("bytes=abc"), 10), ByteRange::Full);
        assert_eq!(ByteRange::resolve(Some("bytes=5-2"), 10), ByteRange::Full);
        assert_eq!(ByteRange::resolve(Some("bytes=0-1,4-5"), 10), ByteRange::Full);
    }
}
