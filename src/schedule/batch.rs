use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::CompositeConfig;
use crate::error::Result;
use crate::schedule::inputs::VideoInputs;
use crate::track::VideoSize;

/// One occupied position of the active slot vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSlot {
    pub id: u32,
    pub display_name: String,
}

/// Ordered compositor slots; a position holds at most one input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotVector(Vec<Option<ActiveSlot>>);

impl SlotVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy `index`, growing the vector with empty slots as needed
    pub fn set(&mut self, index: usize, slot: ActiveSlot) {
        if self.0.len() <= index {
            self.0.resize(index + 1, None);
        }
        self.0[index] = Some(slot);
    }

    pub fn get(&self, index: usize) -> Option<&ActiveSlot> {
        self.0.get(index).and_then(Option::as_ref)
    }

    /// Ids of the occupied slots in slot order
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().flatten().map(|slot| slot.id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// State stored at one frame of the schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEvent {
    /// Complete slot snapshot, never a delta against earlier frames
    pub active_video_input_slots: SlotVector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

/// Fixed properties of a schedule
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub composition_id: String,
    pub fps: u32,
    pub output_size: VideoSize,
    pub duration_in_frames: u64,
    pub initial_params: Map<String, Value>,
}

impl ScheduleSettings {
    pub fn from_config(config: &CompositeConfig, duration_in_frames: u64) -> Self {
        Self {
            composition_id: config.composition_id.clone(),
            fps: config.fps,
            output_size: VideoSize {
                w: config.output_width,
                h: config.output_height,
            },
            duration_in_frames,
            initial_params: config.initial_params.clone(),
        }
    }
}

/// Sparse frame -> state map read by the batch runner
///
/// The state in effect at any frame is the entry at the greatest key not
/// after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSchedule {
    pub composition_id: String,
    pub duration_in_frames: u64,
    pub frames_per_second: u32,
    pub output_size: VideoSize,
    pub events_by_frame: BTreeMap<u64, FrameEvent>,
}

impl CompositeSchedule {
    /// Forward-fill the slot vector over the inputs' start frames
    pub fn build(inputs: &VideoInputs, settings: &ScheduleSettings) -> Self {
        let mut starts: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (index, input) in inputs.iter().enumerate() {
            let frame = start_frame(input.track.start_offset_secs, settings.fps);
            starts.entry(frame).or_default().push(index);
        }

        let mut events_by_frame = BTreeMap::new();
        events_by_frame.insert(
            0,
            FrameEvent {
                active_video_input_slots: SlotVector::new(),
                params: Some(settings.initial_params.clone()),
            },
        );

        let mut current = SlotVector::new();
        let all: Vec<_> = inputs.iter().collect();
        for (frame, indexes) in starts {
            let mut next = current.clone();
            for index in indexes {
                let input = all[index];
                next.set(
                    index,
                    ActiveSlot {
                        id: input.id,
                        display_name: input.track.participant_id.clone(),
                    },
                );
            }

            debug!(frame, active = next.ids().count(), "Schedule event");
            events_by_frame
                .entry(frame)
                .or_insert_with(|| FrameEvent {
                    active_video_input_slots: SlotVector::new(),
                    params: None,
                })
                .active_video_input_slots = next.clone();
            current = next;
        }

        Self {
            composition_id: settings.composition_id.clone(),
            duration_in_frames: settings.duration_in_frames,
            frames_per_second: settings.fps,
            output_size: settings.output_size,
            events_by_frame,
        }
    }

    /// Event in effect at `frame`
    pub fn active_at(&self, frame: u64) -> Option<&FrameEvent> {
        self.events_by_frame
            .range(..=frame)
            .next_back()
            .map(|(_, event)| event)
    }

    /// Events stored at frames inside `range`, ascending
    pub fn events_in(&self, range: Range<u64>) -> impl Iterator<Item = (u64, &FrameEvent)> {
        self.events_by_frame
            .range(range)
            .map(|(frame, event)| (*frame, event))
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Output frame a track starts on; offsets before the session start clamp to frame 0
pub fn start_frame(start_offset_secs: f64, fps: u32) -> u64 {
    (start_offset_secs * fps as f64).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::inputs::tests::track;
    use crate::schedule::inputs::VideoInputs;

    fn settings() -> ScheduleSettings {
        ScheduleSettings::from_config(&CompositeConfig::default(), 900)
    }

    #[test]
    fn test_keys_are_start_frames() {
        let inputs =
            VideoInputs::from_tracks(vec![track("a", 0.0), track("b", 5.0), track("c", 10.0)], 1001);
        let schedule = CompositeSchedule::build(&inputs, &settings());

        let keys: Vec<_> = schedule.events_by_frame.keys().copied().collect();
        assert_eq!(keys, vec![0, 150, 300]);
    }

    #[test]
    fn test_snapshots_are_complete() {
        let inputs =
            VideoInputs::from_tracks(vec![track("a", 0.0), track("b", 5.0), track("c", 10.0)], 1001);
        let schedule = CompositeSchedule::build(&inputs, &settings());

        let at_200 = schedule.active_at(200).unwrap();
        assert_eq!(at_200, &schedule.events_by_frame[&150]);
        assert_eq!(at_200.active_video_input_slots.ids().collect::<Vec<_>>(), vec![1001, 1002]);

        let last = &schedule.events_by_frame[&300];
        assert_eq!(
            last.active_video_input_slots.ids().collect::<Vec<_>>(),
            vec![1001, 1002, 1003]
        );
        // earlier snapshots are not touched by later events
        assert_eq!(
            schedule.events_by_frame[&0].active_video_input_slots.ids().count(),
            1
        );
    }

    #[test]
    fn test_frame_zero_carries_initial_params() {
        let inputs = VideoInputs::from_tracks(vec![track("a", 2.0)], 1001);
        let schedule = CompositeSchedule::build(&inputs, &settings());

        let first = &schedule.events_by_frame[&0];
        assert!(first.active_video_input_slots.is_empty());
        let params = first.params.as_ref().unwrap();
        assert_eq!(params.get("mode"), Some(&Value::from("grid")));
        assert!(schedule.events_by_frame[&60].params.is_none());
    }

    #[test]
    fn test_tracks_sharing_a_start_frame() {
        let inputs = VideoInputs::from_tracks(
            vec![track("a", 1.0), track("b", 1.01), track("c", 0.0)],
            1001,
        );
        let schedule = CompositeSchedule::build(&inputs, &settings());

        assert_eq!(schedule.events_by_frame.len(), 2);
        let slots = &schedule.events_by_frame[&30].active_video_input_slots;
        assert_eq!(slots.get(1).map(|s| s.display_name.as_str()), Some("a"));
        assert_eq!(slots.get(2).map(|s| s.display_name.as_str()), Some("b"));
    }

    #[test]
    fn test_serialized_shape() {
        let inputs = VideoInputs::from_tracks(vec![track("a", 0.0)], 1001);
        let schedule = CompositeSchedule::build(&inputs, &settings());
        let json = serde_json::to_value(&schedule).unwrap();

        assert_eq!(json["compositionId"], "daily:baseline");
        assert_eq!(json["framesPerSecond"], 30);
        assert_eq!(json["outputSize"]["w"], 1280);
        let slot = &json["eventsByFrame"]["0"]["activeVideoInputSlots"][0];
        assert_eq!(slot["id"], 1001);
        assert_eq!(slot["displayName"], "a");

        let back: CompositeSchedule = serde_json::from_value(json).unwrap();
        assert_eq!(back, schedule);
    }

    #[test]
    fn test_negative_offset_clamps_to_zero() {
        assert_eq!(start_frame(-0.4, 30), 0);
        assert_eq!(start_frame(4.99, 30), 150);
    }
}
