//! HTTP `Range` header parsing and resolution against a content length.

/// A single byte range as written by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-` or `bytes=start-end`.
    FromStart { start: u64, end: Option<u64> },
    /// `bytes=-n`: the last `n` bytes.
    Suffix(u64),
}

/// What to send for a request, given the content length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// The whole content, status 200.
    Full,
    /// An inclusive slice, status 206.
    Partial { start: u64, end: u64 },
    /// Status 416 with `Content-Range: bytes */total`.
    Unsatisfiable,
}

impl ByteRange {
    /// Number of body bytes for content of `total` bytes.
    pub fn len(&self, total: u64) -> u64 {
        match *self {
            ByteRange::Full => total,
            ByteRange::Partial { start, end } => end - start + 1,
            ByteRange::Unsatisfiable => 0,
        }
    }

    pub fn is_empty(&self, total: u64) -> bool {
        self.len(total) == 0
    }
}

/// Parse a `Range` header value.
///
/// Returns `None` for anything other than a single well-formed `bytes`
/// range; callers then serve the full content.
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let (unit, spec) = value.trim().split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.trim().split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return end.parse().ok().map(RangeSpec::Suffix);
    }

    let start: u64 = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some(RangeSpec::FromStart { start, end })
}

/// Resolve a parsed range against `total` bytes of content.
pub fn resolve(spec: Option<RangeSpec>, total: u64) -> ByteRange {
    let Some(spec) = spec else {
        return ByteRange::Full;
    };

    match spec {
        RangeSpec::FromStart { start, end } => {
            if start >= total {
                return ByteRange::Unsatisfiable;
            }
            let end = end.unwrap_or(total - 1).min(total - 1);
            if start > end {
                return ByteRange::Unsatisfiable;
            }
            ByteRange::Partial { start, end }
        }
        RangeSpec::Suffix(n) => {
            if n == 0 || total == 0 {
                return ByteRange::Unsatisfiable;
            }
            ByteRange::Partial {
                start: total.saturating_sub(n),
                end: total - 1,
            }
        }
    }
}
