//! Byte-stream to frame decoding.
//!
//! A frame is one complete JSON document logically terminated by a line
//! boundary. The decoder keeps an accumulation buffer; on each inbound
//! chunk it scans line boundaries left to right and emits the shortest
//! candidate that parses as JSON, extending the candidate across further
//! boundaries when the text up to the current one is not yet a complete
//! document. This tolerates documents whose JSON spans multiple lines,
//! at the cost of buffering until a boundary finally closes the document.

use serde::de::IgnoredAny;

use crate::error::McpError;

/// Default cap on the accumulation buffer (8 MiB). Overflowing it is a
/// fatal parse error rather than unbounded growth.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Incremental frame decoder over raw bytes.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame,
        }
    }

    /// Bytes currently buffered awaiting a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed a chunk and collect every frame it completes.
    ///
    /// On overflow the buffer is discarded and an error returned; the
    /// decoder itself stays usable for subsequent input.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, McpError> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.scan() {
            frames.push(frame);
        }

        if self.buf.len() > self.max_frame {
            let size = self.buf.len();
            self.buf.clear();
            return Err(McpError::FrameTooLarge {
                size,
                max: self.max_frame,
            });
        }

        Ok(frames)
    }

    /// Extract the next complete frame from the buffer, if any.
    fn scan(&mut self) -> Option<String> {
        let mut search_from = 0;
        while let Some(rel) = find_newline(&self.buf[search_from..]) {
            let boundary = search_from + rel;
            let candidate = trim_ascii(&self.buf[..boundary]);

            if candidate.is_empty() {
                // Blank line: consume and keep scanning from the start.
                self.buf.drain(..=boundary);
                search_from = 0;
                continue;
            }

            if serde_json::from_slice::<IgnoredAny>(candidate).is_ok() {
                let frame = String::from_utf8_lossy(candidate).into_owned();
                self.buf.drain(..=boundary);
                return Some(frame);
            }

            // Not a complete document yet; extend to the next boundary.
            search_from = boundary + 1;
        }
        None
    }
}

fn find_newline(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n')
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_str(dec: &mut FrameDecoder, s: &str) -> Vec<String> {
        dec.push(s.as_bytes()).unwrap()
    }

    #[test]
    fn test_single_frame() {
        let mut dec = FrameDecoder::new();
        let frames = push_str(&mut dec, "{\"a\":1}\n");
        assert_eq!(frames, vec!["{\"a\":1}"]);
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut dec = FrameDecoder::new();
        let frames = push_str(&mut dec, "{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n");
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], "{\"b\":2}");
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut dec = FrameDecoder::new();
        assert!(push_str(&mut dec, "{\"a\":").is_empty());
        assert!(push_str(&mut dec, "1").is_empty());
        let frames = push_str(&mut dec, "}\n");
        assert_eq!(frames, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_multiline_json_document() {
        let mut dec = FrameDecoder::new();
        let frames = push_str(&mut dec, "{\n  \"a\": 1\n}\n{\"b\":2}\n");
        assert_eq!(frames, vec!["{\n  \"a\": 1\n}", "{\"b\":2}"]);
    }

    #[test]
    fn test_chunk_split_equivalence() {
        let input = "{\"x\":\"long message\"}\n{\n \"y\": [1,2,3]\n}\n{\"z\":true}\n";

        let mut whole = FrameDecoder::new();
        let expected = whole.push(input.as_bytes()).unwrap();
        assert_eq!(expected.len(), 3);

        // Redeliver the same bytes split at every possible single boundary.
        for split in 1..input.len() {
            let mut dec = FrameDecoder::new();
            let mut frames = dec.push(&input.as_bytes()[..split]).unwrap();
            frames.extend(dec.push(&input.as_bytes()[split..]).unwrap());
            assert_eq!(frames, expected, "diverged at split {split}");
        }

        // And byte by byte.
        let mut dec = FrameDecoder::new();
        let mut frames = Vec::new();
        for b in input.as_bytes() {
            frames.extend(dec.push(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_blank_lines_consumed() {
        let mut dec = FrameDecoder::new();
        let frames = push_str(&mut dec, "\n\n{\"a\":1}\n\n");
        assert_eq!(frames, vec!["{\"a\":1}"]);
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn test_carriage_returns_trimmed() {
        let mut dec = FrameDecoder::new();
        let frames = push_str(&mut dec, "{\"a\":1}\r\n");
        assert_eq!(frames, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_overflow_is_fatal_parse_error() {
        let mut dec = FrameDecoder::with_max_frame(16);
        let err = dec.push(b"this is not json and never will be\n").unwrap_err();
        assert!(matches!(err, McpError::FrameTooLarge { .. }));
        // Decoder remains usable afterwards.
        let frames = dec.push(b"{\"ok\":true}\n").unwrap();
        assert_eq!(frames, vec!["{\"ok\":true}"]);
    }

    #[test]
    fn test_scalar_documents() {
        let mut dec = FrameDecoder::new();
        let frames = push_str(&mut dec, "42\n\"hi\"\n");
        assert_eq!(frames, vec!["42", "\"hi\""]);
    }
}
