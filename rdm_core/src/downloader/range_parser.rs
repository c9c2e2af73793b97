use bytes::Bytes;

use crate::types::types::RangeParseError;

/// Byte position after which an unterminated header section is considered malformed.
const HEADER_SCAN_LIMIT: usize = 1024;

/// Result of one fully-parsed range response: the server-confirmed interval,
/// the resource's total size, and the payload bytes received for it.
#[derive(Debug, Clone)]
pub struct RangeRequestResult {
    pub offset: u64,
    pub total_len: u64,
    pub buffer: Bytes,
    pub is_complete: bool,
}

/// Incrementally parses a `Content-Range` header out of a response whose
/// header and body bytes may arrive split across arbitrary `feed()` boundaries,
/// then accumulates the body that follows it.
///
/// One instance is scoped to a single range request; it is not reused across
/// requests.
pub struct RangeBodyParser {
    header_scratch: Vec<u8>,
    header_done: bool,
    offset: u64,
    total_len: u64,
    buffer: Vec<u8>,
    is_complete: bool,
}

impl RangeBodyParser {
    pub fn new() -> Self {
        Self {
            header_scratch: Vec::new(),
            header_done: false,
            offset: 0,
            total_len: 0,
            buffer: Vec::new(),
            is_complete: false,
        }
    }

    /// Feed the next chunk of response bytes, in whatever chunking the
    /// transport delivered them. Safe to call with header-only, body-only,
    /// or mixed chunks, any number of times.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), RangeParseError> {
        if self.header_done {
            self.buffer.extend_from_slice(data);
            return Ok(());
        }

        self.header_scratch.extend_from_slice(data);

        match find_subslice(&self.header_scratch, b"\r\n\r\n") {
            Some(boundary) => {
                let header_section = &self.header_scratch[..boundary];
                let (offset, end, total_len) = parse_content_range(header_section)?;
                if offset > end || end >= total_len {
                    return Err(RangeParseError::InconsistentRange);
                }

                self.offset = offset;
                self.total_len = total_len;
                self.is_complete = end + 1 == total_len;

                let body_start = boundary + 4;
                let expected_len = (end - offset + 1) as usize;
                self.buffer.reserve(expected_len);
                self.buffer
                    .extend_from_slice(&self.header_scratch[body_start..]);
                self.header_done = true;
                Ok(())
            }
            None => {
                if self.header_scratch.len() > HEADER_SCAN_LIMIT {
                    Err(RangeParseError::HeaderNotFound)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Consume the parser once the response body has ended, producing the
    /// parsed range result. Fails if the header/body boundary was never found.
    pub fn finish(self) -> Result<RangeRequestResult, RangeParseError> {
        if !self.header_done {
            return Err(RangeParseError::HeaderNotFound);
        }
        Ok(RangeRequestResult {
            offset: self.offset,
            total_len: self.total_len,
            buffer: Bytes::from(self.buffer),
            is_complete: self.is_complete,
        })
    }
}

impl Default for RangeBodyParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parses `Content-Range: bytes S-E/T` out of a raw header block (the bytes
/// preceding the `\r\n\r\n` terminator, which may contain other header lines).
fn parse_content_range(header_section: &[u8]) -> Result<(u64, u64, u64), RangeParseError> {
    let header_text = String::from_utf8_lossy(header_section);
    let line = header_text
        .split("\r\n")
        .find(|line| line.to_ascii_lowercase().starts_with("content-range:"))
        .ok_or(RangeParseError::HeaderNotFound)?;

    let value = line
        .splitn(2, ':')
        .nth(1)
        .ok_or_else(|| RangeParseError::Malformed(line.to_string()))?
        .trim();

    let rest = value
        .strip_prefix("bytes ")
        .ok_or_else(|| RangeParseError::Malformed(value.to_string()))?;
    let (range_part, total_part) = rest
        .split_once('/')
        .ok_or_else(|| RangeParseError::Malformed(value.to_string()))?;
    let (start_part, end_part) = range_part
        .split_once('-')
        .ok_or_else(|| RangeParseError::Malformed(value.to_string()))?;

    let start: u64 = start_part
        .trim()
        .parse()
        .map_err(|_| RangeParseError::Malformed(value.to_string()))?;
    let end: u64 = end_part
        .trim()
        .parse()
        .map_err(|_| RangeParseError::Malformed(value.to_string()))?;
    let total: u64 = total_part
        .trim()
        .parse()
        .map_err(|_| RangeParseError::Malformed(value.to_string()))?;

    Ok((start, end, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_delivered_in_one_chunk() {
        let mut parser = RangeBodyParser::new();
        parser
            .feed(b"Content-Range: bytes 0-2/12\r\n\r\nABC")
            .unwrap();
        let result = parser.finish().unwrap();
        assert_eq!(result.offset, 0);
        assert_eq!(result.total_len, 12);
        assert!(!result.is_complete);
        assert_eq!(&result.buffer[..], b"ABC");
    }

    #[test]
    fn tolerates_terminator_split_one_byte_at_a_time() {
        let full = b"Content-Range: bytes 3-5/12\r\n\r\nDEF";
        let mut parser = RangeBodyParser::new();
        for byte in full {
            parser.feed(&[*byte]).unwrap();
        }
        let result = parser.finish().unwrap();
        assert_eq!(result.offset, 3);
        assert_eq!(&result.buffer[..], b"DEF");
    }

    #[test]
    fn tolerates_body_fed_across_many_calls() {
        let mut parser = RangeBodyParser::new();
        parser.feed(b"Content-Range: bytes 9-11/12\r\n\r\n").unwrap();
        parser.feed(b"J").unwrap();
        parser.feed(b"K").unwrap();
        parser.feed(b"L").unwrap();
        let result = parser.finish().unwrap();
        assert!(result.is_complete);
        assert_eq!(&result.buffer[..], b"JKL");
    }

    #[test]
    fn marks_final_range_complete() {
        let mut parser = RangeBodyParser::new();
        parser
            .feed(b"Content-Range: bytes 9-11/12\r\n\r\nJKL")
            .unwrap();
        assert!(parser.finish().unwrap().is_complete);
    }

    #[test]
    fn rejects_inconsistent_range() {
        let mut parser = RangeBodyParser::new();
        let err = parser
            .feed(b"Content-Range: bytes 5-2/12\r\n\r\n")
            .unwrap_err();
        assert_eq!(err, RangeParseError::InconsistentRange);
    }

    #[test]
    fn rejects_missing_header_within_scan_window() {
        let mut parser = RangeBodyParser::new();
        let junk = vec![b'x'; HEADER_SCAN_LIMIT + 1];
        let err = parser.feed(&junk).unwrap_err();
        assert_eq!(err, RangeParseError::HeaderNotFound);
    }

    #[test]
    fn finish_before_header_found_is_an_error() {
        let mut parser = RangeBodyParser::new();
        parser.feed(b"Content-Len").unwrap();
        assert!(parser.finish().is_err());
    }
}
