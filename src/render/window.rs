use std::collections::BTreeSet;
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::schedule::{CompositeSchedule, SlotVector};

/// A fixed span of output frames rendered by one compositor call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub index: usize,
    pub start_frame: u64,
    pub frame_count: u64,
}

impl Window {
    pub fn frames(&self) -> Range<u64> {
        self.start_frame..self.start_frame + self.frame_count
    }

    pub fn start_secs(&self, fps: u32) -> f64 {
        self.start_frame as f64 / fps as f64
    }

    pub fn duration_secs(&self, fps: u32) -> f64 {
        self.frame_count as f64 / fps as f64
    }
}

/// Split `total_frames` into consecutive windows of `frames_per_window`
///
/// Every window is full except the last, which covers whatever remains.
pub fn plan_windows(total_frames: u64, frames_per_window: u64) -> Vec<Window> {
    if total_frames == 0 || frames_per_window == 0 {
        return Vec::new();
    }

    let count = total_frames.div_ceil(frames_per_window);
    (0..count)
        .map(|i| {
            let start_frame = i * frames_per_window;
            Window {
                index: i as usize,
                start_frame,
                frame_count: frames_per_window.min(total_frames - start_frame),
            }
        })
        .collect()
}

/// Inputs a window has to extract, and the slot state it hands to the next window
///
/// The window starts from `carried`, the snapshot in effect when the
/// previous window ended. Every schedule entry inside the window adds its
/// ids and replaces the carried snapshot.
pub fn collect_active_inputs(
    schedule: &CompositeSchedule,
    window: &Window,
    carried: SlotVector,
) -> (BTreeSet<u32>, SlotVector) {
    let mut ids: BTreeSet<u32> = carried.ids().collect();
    let mut carried = carried;

    for (_, event) in schedule.events_in(window.frames()) {
        ids.extend(event.active_video_input_slots.ids());
        carried = event.active_video_input_slots.clone();
    }

    (ids, carried)
}

/// Where the compositor finds one input's raw frames for a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEvent {
    pub video_input_id: u32,
    /// First window frame the sequence plays at
    pub frame: u64,
    pub duration_in_frames: u64,
    pub seq_dir: PathBuf,
    pub w: u32,
    pub h: u32,
}

/// Per-window input timing descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputTimings {
    pub start_frame: u64,
    pub duration_in_frames: u64,
    pub playback_events: Vec<PlaybackEvent>,
}

/// Outcome of checking extracted frame counts against the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Every input produced the requested frames
    Complete,
    /// Some input came up short; the whole window was cut to its count
    Clamped { requested: u64, frames: u64 },
}

impl InputTimings {
    pub fn new(window: &Window) -> Self {
        Self {
            start_frame: window.start_frame,
            duration_in_frames: window.frame_count,
            playback_events: Vec::new(),
        }
    }

    /// Make every input agree on the smallest extracted frame count
    ///
    /// `observed` holds the frame count each input actually produced. A
    /// shortfall down to one frame or less means the decode failed and the
    /// window cannot be rendered.
    pub fn reconcile(&mut self, window: usize, observed: &[u64]) -> Result<Reconciled, RenderError> {
        let requested = self.duration_in_frames;
        let min = observed.iter().copied().fold(requested, u64::min);
        if min == requested {
            return Ok(Reconciled::Complete);
        }
        if min <= 1 {
            return Err(RenderError::PartialDecode {
                window,
                requested,
                observed: min,
            });
        }

        self.duration_in_frames = min;
        for event in &mut self.playback_events {
            event.duration_in_frames = min;
        }
        Ok(Reconciled::Clamped {
            requested,
            frames: min,
        })
    }
}
