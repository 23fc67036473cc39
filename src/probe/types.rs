use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// A single value from a probe record
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeValue {
    Int(i64),
    Float(f64),
    /// Anything not on the record kind's typed key lists, or a typed value that didn't parse (`N/A`)
    Text(String),
}

impl ProbeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// The two record kinds emitted by the probe tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Frame,
    Stream,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Frame, RecordKind::Stream];

    pub fn open_marker(self) -> &'static str {
        match self {
            Self::Frame => "[FRAME]",
            Self::Stream => "[STREAM]",
        }
    }

    pub fn close_marker(self) -> &'static str {
        match self {
            Self::Frame => "[/FRAME]",
            Self::Stream => "[/STREAM]",
        }
    }

    /// Keys parsed as integers
    pub fn int_keys(self) -> &'static [&'static str] {
        match self {
            Self::Frame => &[
                "pts",
                "pkt_dts",
                "pkt_duration",
                "duration",
                "width",
                "height",
                "stream_index",
            ],
            Self::Stream => &[
                "index",
                "width",
                "height",
                "coded_width",
                "coded_height",
                "start_pts",
            ],
        }
    }

    /// Keys parsed as floats
    pub fn float_keys(self) -> &'static [&'static str] {
        match self {
            Self::Frame => &["pts_time", "pkt_dts_time", "duration_time"],
            Self::Stream => &["start_time"],
        }
    }

    /// Type a raw `key=value` pair according to this kind's allow-lists
    pub fn type_value(self, key: &str, raw: &str) -> ProbeValue {
        if self.int_keys().contains(&key) {
            if let Ok(v) = raw.trim().parse::<i64>() {
                return ProbeValue::Int(v);
            }
        } else if self.float_keys().contains(&key) {
            if let Ok(v) = raw.trim().parse::<f64>() {
                if v.is_finite() {
                    return ProbeValue::Float(v);
                }
            }
        }
        ProbeValue::Text(raw.to_string())
    }
}

/// One bracketed record: its `key=value` lines, typed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeRecord {
    fields: BTreeMap<String, ProbeValue>,
}

impl ProbeRecord {
    pub fn insert(&mut self, key: impl Into<String>, value: ProbeValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ProbeValue> {
        self.fields.get(key)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ProbeValue::as_f64)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ProbeValue::as_i64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ProbeValue::as_str)
    }

    fn u32(&self, key: &str) -> Option<u32> {
        self.int(key).and_then(|v| u32::try_from(v).ok())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parsed probe output for one file, both lists in arrival order
#[derive(Debug, Clone, Default)]
pub struct ProbeOutput {
    pub streams: Vec<ProbeRecord>,
    pub frames: Vec<ProbeRecord>,
}

impl ProbeOutput {
    pub fn stream_descriptors(&self) -> Vec<StreamDescriptor> {
        self.streams.iter().map(StreamDescriptor::from_record).collect()
    }

    /// Frame samples in arrival order
    ///
    /// A frame with neither `pts_time` nor `pkt_dts_time` has no position on
    /// the timeline and makes the file invalid.
    pub fn frame_samples(&self) -> Result<Vec<FrameSample>, TrackError> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, record)| FrameSample::from_record(i, record))
            .collect()
    }
}

/// Media kind of a stream or frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaKind {
    Video,
    Audio,
    Other(String),
}

impl MediaKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for MediaKind {
    fn from(s: &str) -> Self {
        match s {
            "video" => Self::Video,
            "audio" => Self::Audio,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MediaKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<MediaKind> for String {
    fn from(kind: MediaKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded frame's timing and geometry
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub presentation_time: f64,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub media_kind: Option<MediaKind>,
}

impl FrameSample {
    pub fn from_record(index: usize, record: &ProbeRecord) -> Result<Self, TrackError> {
        let presentation_time = record
            .float("pts_time")
            .or_else(|| record.float("pkt_dts_time"))
            .ok_or_else(|| TrackError::InvalidInputFile {
                reason: format!("frame {} has no presentation time", index),
            })?;

        Ok(Self {
            presentation_time,
            duration: record.float("duration_time"),
            width: record.u32("width"),
            height: record.u32("height"),
            media_kind: record.text("media_type").map(MediaKind::from),
        })
    }

    /// Declared duration, zero if absent
    pub fn duration_or_zero(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }
}

/// Stream-level metadata
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: Option<i64>,
    pub media_kind: Option<MediaKind>,
    pub start_time: Option<f64>,
    /// Rational frame rate string as reported, e.g. `30000/1001`
    pub frame_rate: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub coded_width: Option<u32>,
    pub coded_height: Option<u32>,
}

impl StreamDescriptor {
    pub fn from_record(record: &ProbeRecord) -> Self {
        Self {
            index: record.int("index"),
            media_kind: record.text("codec_type").map(MediaKind::from),
            start_time: record.float("start_time"),
            frame_rate: record.text("r_frame_rate").map(str::to_string),
            width: record.u32("width"),
            height: record.u32("height"),
            coded_width: record.u32("coded_width"),
            coded_height: record.u32("coded_height"),
        }
    }
}
