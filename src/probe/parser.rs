//! Incremental parser for the probe tool's bracketed record format
//!
//! ```text
//! [STREAM]
//! codec_type=video
//! start_time=1.250000
//! [/STREAM]
//! [FRAME]
//! media_type=video
//! pts_time=1.250000
//! [/FRAME]
//! ```
//!
//! Pipe reads can end anywhere, including inside a marker, so the parser
//! buffers and only moves past a record once its closing marker has arrived.

use crate::error::ProbeError;
use crate::probe::types::{ProbeOutput, ProbeRecord, RecordKind};

const EXCERPT_LEN: usize = 40;

enum MarkerMatch {
    Open(RecordKind),
    /// Buffer ends inside what may still become a known marker
    Incomplete,
    Unknown,
}

/// Chunk-tolerant record parser
#[derive(Debug, Default)]
pub struct ProbeParser {
    buffer: Vec<u8>,
    output: ProbeOutput,
}

impl ProbeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk of tool output and consume every complete record in the buffer
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), ProbeError> {
        self.buffer.extend_from_slice(chunk);

        let mut consumed = 0;
        let result = loop {
            let pending = &self.buffer[consumed..];
            let Some(open_at) = pending.iter().position(|&b| b == b'[') else {
                consumed = self.buffer.len();
                break Ok(());
            };
            let rest = &pending[open_at..];

            let kind = match match_marker(rest) {
                MarkerMatch::Open(kind) => kind,
                MarkerMatch::Incomplete => {
                    consumed += open_at;
                    break Ok(());
                }
                MarkerMatch::Unknown => break Err(unsupported(rest)),
            };

            let open = kind.open_marker().as_bytes();
            let close = kind.close_marker().as_bytes();
            let Some(close_at) = find(&rest[open.len()..], close) else {
                consumed += open_at;
                break Ok(());
            };

            let body = &rest[open.len()..open.len() + close_at];
            let record = parse_record(body, kind);
            match kind {
                RecordKind::Frame => self.output.frames.push(record),
                RecordKind::Stream => self.output.streams.push(record),
            }
            consumed += open_at + open.len() + close_at + close.len();
        };

        self.buffer.drain(..consumed);
        result
    }

    /// Records parsed so far
    pub fn output(&self) -> &ProbeOutput {
        &self.output
    }

    /// End of input: anything still buffered is an unterminated record
    pub fn finish(self) -> Result<ProbeOutput, ProbeError> {
        if let Some(open_at) = self.buffer.iter().position(|&b| b == b'[') {
            let rest = &self.buffer[open_at..];
            return Err(match match_marker(rest) {
                MarkerMatch::Open(kind) => ProbeError::MalformedRecord {
                    marker: kind.open_marker().to_string(),
                },
                MarkerMatch::Incomplete | MarkerMatch::Unknown => unsupported(rest),
            });
        }
        Ok(self.output)
    }
}

/// Parse a complete probe dump
pub fn parse(text: &str) -> Result<ProbeOutput, ProbeError> {
    let mut parser = ProbeParser::new();
    parser.feed(text.as_bytes())?;
    parser.finish()
}

fn match_marker(rest: &[u8]) -> MarkerMatch {
    let mut incomplete = false;
    for kind in RecordKind::ALL {
        let marker = kind.open_marker().as_bytes();
        if rest.starts_with(marker) {
            return MarkerMatch::Open(kind);
        }
        if rest.len() < marker.len() && marker.starts_with(rest) {
            incomplete = true;
        }
    }
    if incomplete {
        MarkerMatch::Incomplete
    } else {
        MarkerMatch::Unknown
    }
}

fn parse_record(body: &[u8], kind: RecordKind) -> ProbeRecord {
    let text = String::from_utf8_lossy(body);
    let mut record = ProbeRecord::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        record.insert(key, kind.type_value(key, value));
    }
    record
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn unsupported(rest: &[u8]) -> ProbeError {
    let end = rest.len().min(EXCERPT_LEN);
    ProbeError::UnsupportedData {
        excerpt: String::from_utf8_lossy(&rest[..end]).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::types::ProbeValue;

    const SAMPLE: &str = "\
[STREAM]
index=0
codec_type=video
r_frame_rate=30/1
start_time=1.500000
width=640
[/STREAM]
[FRAME]
media_type=video
pts=1500
pts_time=1.500000
duration_time=0.033333
width=640
height=360
[/FRAME]
[FRAME]
media_type=video
pts_time=1.533333
width=640
height=360
[/FRAME]
";

    #[test]
    fn test_parses_streams_and_frames_in_order() {
        let out = parse(SAMPLE).unwrap();
        assert_eq!(out.streams.len(), 1);
        assert_eq!(out.frames.len(), 2);

        let stream = &out.streams[0];
        assert_eq!(stream.get("index"), Some(&ProbeValue::Int(0)));
        assert_eq!(stream.float("start_time"), Some(1.5));
        assert_eq!(stream.text("r_frame_rate"), Some("30/1"));

        assert_eq!(out.frames[0].int("pts"), Some(1500));
        assert_eq!(out.frames[1].float("pts_time"), Some(1.533333));
    }

    #[test]
    fn test_any_chunking_gives_same_result() {
        let whole = parse(SAMPLE).unwrap();
        let bytes = SAMPLE.as_bytes();

        for chunk_size in [1, 2, 3, 5, 7, 13, 64] {
            let mut parser = ProbeParser::new();
            for chunk in bytes.chunks(chunk_size) {
                parser.feed(chunk).unwrap();
            }
            let out = parser.finish().unwrap();
            assert_eq!(out.frames, whole.frames, "chunk size {chunk_size}");
            assert_eq!(out.streams, whole.streams, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_record_is_not_emitted_before_close_marker() {
        let mut parser = ProbeParser::new();
        parser.feed(b"[FRAME]\npts_time=0.1\n[/FRA").unwrap();
        assert!(parser.output().frames.is_empty());
        parser.feed(b"ME]\n").unwrap();
        assert_eq!(parser.output().frames.len(), 1);
    }

    #[test]
    fn test_unknown_marker_is_unsupported() {
        let err = parse("[PACKET]\nsize=10\n[/PACKET]\n").unwrap_err();
        assert!(matches!(err, ProbeError::UnsupportedData { .. }));
    }

    #[test]
    fn test_missing_close_marker_is_malformed() {
        let err = parse("[FRAME]\npts_time=0.0\n").unwrap_err();
        assert!(matches!(err, ProbeError::MalformedRecord { marker } if marker == "[FRAME]"));
    }

    #[test]
    fn test_truncated_marker_at_end_is_unsupported() {
        let err = parse("[FRAME]\npts_time=0.0\n[/FRAME]\n[STR").unwrap_err();
        assert!(matches!(err, ProbeError::UnsupportedData { .. }));
    }

    #[test]
    fn test_nested_side_data_stays_inside_frame() {
        let text = "[FRAME]\npts_time=0.0\n[SIDE_DATA]\nside_data_type=foo\n[/SIDE_DATA]\n[/FRAME]\n";
        let out = parse(text).unwrap();
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].text("side_data_type"), Some("foo"));
    }

    #[test]
    fn test_empty_input() {
        let out = parse("").unwrap();
        assert!(out.frames.is_empty() && out.streams.is_empty());
    }
}
