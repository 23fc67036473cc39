use std::path::PathBuf;

use serde::Serialize;

use crate::error::ScheduleError;
use crate::track::VideoSize;

/// A participant's normalized video asset, ready to be scheduled
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTrack {
    pub participant_id: String,
    pub file: PathBuf,
    /// Offset of the track from the session start (seconds)
    pub start_offset_secs: f64,
    /// Container duration of the normalized asset (seconds)
    pub duration_secs: f64,
    pub size: VideoSize,
}

/// Video tracks collected during normalization, bounded by the compositor's slot count
#[derive(Debug, Clone)]
pub struct VideoTrackSet {
    tracks: Vec<VideoTrack>,
    max_slots: usize,
}

impl VideoTrackSet {
    pub fn new(max_slots: usize) -> Self {
        Self {
            tracks: Vec::new(),
            max_slots,
        }
    }

    /// Whether another track would still fit
    pub fn has_room(&self) -> bool {
        self.tracks.len() < self.max_slots
    }

    /// Add a track, leaving the set untouched when it is already full
    pub fn try_add(&mut self, track: VideoTrack) -> Result<(), ScheduleError> {
        if !self.has_room() {
            return Err(ScheduleError::SlotCapExceeded {
                max: self.max_slots,
                participant: track.participant_id,
            });
        }
        self.tracks.push(track);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[VideoTrack] {
        &self.tracks
    }

    /// Longest track duration, the length of the session
    pub fn max_duration(&self) -> Option<f64> {
        self.tracks
            .iter()
            .map(|t| t.duration_secs)
            .filter(|d| *d > 0.0)
            .max_by(f64::total_cmp)
    }

    /// Freeze the set into id-addressed inputs
    pub fn into_inputs(self, base_id: u32) -> VideoInputs {
        VideoInputs::from_tracks(self.tracks, base_id)
    }
}

/// A scheduled video input: its numeric compositor id and the track behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInput {
    pub id: u32,
    #[serde(flatten)]
    pub track: VideoTrack,
}

/// Immutable arena of video inputs
///
/// Inputs are ordered by start offset and the id of the input at position
/// `i` is `base_id + i`, so an id resolves back to its track by subtraction.
#[derive(Debug, Clone)]
pub struct VideoInputs {
    base_id: u32,
    inputs: Vec<VideoInput>,
}

impl VideoInputs {
    pub fn from_tracks(mut tracks: Vec<VideoTrack>, base_id: u32) -> Self {
        // stable: equal offsets keep insertion order
        tracks.sort_by(|a, b| a.start_offset_secs.total_cmp(&b.start_offset_secs));

        let inputs = tracks
            .into_iter()
            .zip(base_id..)
            .map(|(track, id)| VideoInput { id, track })
            .collect();

        Self { base_id, inputs }
    }

    pub fn base_id(&self) -> u32 {
        self.base_id
    }

    /// Look up the input behind a scheduled id
    pub fn resolve(&self, id: u32) -> Result<&VideoInput, ScheduleError> {
        id.checked_sub(self.base_id)
            .and_then(|index| self.inputs.get(index as usize))
            .ok_or(ScheduleError::UnresolvedInput { id })
    }

    pub fn iter(&self) -> impl Iterator<Item = &VideoInput> {
        self.inputs.iter()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}
