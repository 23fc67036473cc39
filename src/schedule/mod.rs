//! # Slot Scheduling
//!
//! Video inputs get numeric compositor ids in start order and a sparse,
//! forward-filled schedule of which inputs occupy which slots from which
//! output frame on.

pub mod batch;
pub mod inputs;

pub use batch::{
    start_frame, ActiveSlot, CompositeSchedule, FrameEvent, ScheduleSettings, SlotVector,
};
pub use inputs::{VideoInput, VideoInputs, VideoTrack, VideoTrackSet};
