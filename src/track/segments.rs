use serde::Serialize;

use crate::track::analyzer::Gap;

/// Whether a segment comes from captured media or has to be synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Source,
    Gap,
}

/// One piece of a reconstructed timeline, `[start, end)` in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub kind: SegmentKind,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Duration rounded to whole milliseconds, the precision tool arguments carry
    pub fn rounded_duration(&self) -> f64 {
        (self.duration() * 1000.0).round() / 1000.0
    }

    pub fn is_gap(&self) -> bool {
        self.kind == SegmentKind::Gap
    }
}

/// Tile `[0, end_time)` with source segments between the detected gaps
///
/// Gaps must be ascending and non-overlapping, which is what gap detection
/// produces. Zero-length source pieces before a gap or after the last one
/// are left out.
pub fn reconstruct_segments(end_time: f64, gaps: &[Gap]) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(gaps.len() * 2 + 1);
    let mut t = 0.0;

    for gap in gaps {
        if gap.start > t {
            segments.push(Segment {
                start: t,
                end: gap.start,
                kind: SegmentKind::Source,
            });
        }
        segments.push(Segment {
            start: gap.start,
            end: gap.end,
            kind: SegmentKind::Gap,
        });
        t = gap.end;
    }

    if end_time > t {
        segments.push(Segment {
            start: t,
            end: end_time,
            kind: SegmentKind::Source,
        });
    }

    segments
}
