//! Session manifest: which raw track files belong to which participant

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ManifestError, Result};

pub const CAM_VIDEO: &str = "cam-video";
pub const CAM_AUDIO: &str = "cam-audio";

/// Extension of raw track files picked up by [`SessionManifest::from_directory`]
const RAW_TRACK_EXTENSION: &str = "webm";

/// Length of the participant id embedded in raw track file names
const PARTICIPANT_ID_LEN: usize = 36;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionManifest {
    /// Recording start, milliseconds since the Unix epoch
    pub recording_start_ts: i64,
    pub participants: Vec<Participant>,

    /// Directory relative track paths are resolved against
    #[serde(skip)]
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub tracks: Vec<TrackEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEntry {
    pub file: PathBuf,
    pub media_type: String,
    #[serde(default)]
    pub start_ts: i64,
    #[serde(default)]
    pub start_offset_secs: f64,
}

impl TrackEntry {
    pub fn is_audio(&self) -> bool {
        self.media_type.contains("audio")
    }
}

/// How a participant's tracks are turned into compositor inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticipantTracks<'a> {
    /// Camera video and camera audio, normalized and muxed together
    Combined {
        video: &'a TrackEntry,
        audio: &'a TrackEntry,
    },
    /// One track on its own, the participant's first
    Single(&'a TrackEntry),
    Empty,
}

impl Participant {
    pub fn classify(&self) -> std::result::Result<ParticipantTracks<'_>, ManifestError> {
        let video = self.unique_track(CAM_VIDEO)?;
        let audio = self.unique_track(CAM_AUDIO)?;

        Ok(match (video, audio, self.tracks.first()) {
            (Some(video), Some(audio), _) => ParticipantTracks::Combined { video, audio },
            (_, _, Some(first)) => ParticipantTracks::Single(first),
            (_, _, None) => ParticipantTracks::Empty,
        })
    }

    fn unique_track(&self, media_type: &str) -> std::result::Result<Option<&TrackEntry>, ManifestError> {
        let mut matching = self.tracks.iter().filter(|t| t.media_type == media_type);
        let first = matching.next();
        if matching.next().is_some() {
            return Err(ManifestError::DuplicateTrack {
                participant: self.id.clone(),
                media_type: media_type.to_string(),
            });
        }
        Ok(first)
    }
}

impl SessionManifest {
    /// Read a manifest; track paths resolve against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ManifestError::NotFound {
                path: path.display().to_string(),
            },
            _ => ManifestError::Invalid {
                path: path.display().to_string(),
                reason: e.to_string(),
            },
        })?;

        let mut manifest: SessionManifest =
            serde_json::from_str(&text).map_err(|e| ManifestError::Invalid {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        manifest.root_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!(
            path = %path.display(),
            participants = manifest.participants.len(),
            "Loaded session manifest"
        );
        Ok(manifest)
    }

    /// Build a manifest from the raw track files in `dir`
    ///
    /// File names look like `<recordingStartTs>-<participantId>-<mediaType>-<trackStartTs>.webm`.
    /// Files that don't match, or that belong to a different recording than
    /// the first match, are skipped.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let mut names: Vec<String> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| {
                Path::new(name).extension().and_then(|e| e.to_str()) == Some(RAW_TRACK_EXTENSION)
            })
            .collect();
        names.sort();

        let mut manifest = SessionManifest {
            recording_start_ts: -1,
            participants: Vec::new(),
            root_dir: dir.to_path_buf(),
        };

        for name in names {
            let Some(parsed) = RawTrackName::parse(&name) else {
                warn!(file = %name, "File name doesn't match the raw track pattern");
                continue;
            };

            if manifest.recording_start_ts >= 0
                && parsed.recording_start_ts != manifest.recording_start_ts
            {
                warn!(
                    file = %name,
                    "Ignoring file from another recording: got {}, expected {}",
                    parsed.recording_start_ts,
                    manifest.recording_start_ts
                );
                continue;
            }
            manifest.recording_start_ts = parsed.recording_start_ts;

            let entry = TrackEntry {
                file: PathBuf::from(&name),
                media_type: parsed.media_type.to_string(),
                start_ts: parsed.track_start_ts,
                start_offset_secs: (parsed.track_start_ts - parsed.recording_start_ts) as f64
                    / 1000.0,
            };

            match manifest
                .participants
                .iter_mut()
                .find(|p| p.id == parsed.participant_id)
            {
                Some(participant) => participant.tracks.push(entry),
                None => manifest.participants.push(Participant {
                    id: parsed.participant_id.to_string(),
                    tracks: vec![entry],
                }),
            }
        }

        if manifest.participants.is_empty() {
            return Err(ManifestError::Invalid {
                path: dir.display().to_string(),
                reason: "no raw track files found".to_string(),
            }
            .into());
        }
        Ok(manifest)
    }

    /// Conventional file name for this recording's manifest
    pub fn default_file_name(&self) -> String {
        format!("raw-tracks-manifest-{}.json", self.recording_start_ts)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Absolute location of a track file; it has to exist
    pub fn track_path(&self, entry: &TrackEntry) -> std::result::Result<PathBuf, ManifestError> {
        let path = self.root_dir.join(&entry.file);
        if !path.is_file() {
            return Err(ManifestError::MissingTrackFile { path });
        }
        Ok(path)
    }
}

/// Fields encoded in a raw track file name
#[derive(Debug, PartialEq)]
struct RawTrackName<'a> {
    recording_start_ts: i64,
    participant_id: &'a str,
    media_type: &'a str,
    track_start_ts: i64,
}

impl<'a> RawTrackName<'a> {
    fn parse(name: &'a str) -> Option<Self> {
        let (stem, _ext) = name.rsplit_once('.')?;
        let (rec_ts, rest) = stem.split_once('-')?;
        let recording_start_ts = parse_digits(rec_ts)?;

        let participant_id = rest.get(..PARTICIPANT_ID_LEN)?;
        let rest = rest.get(PARTICIPANT_ID_LEN..)?.strip_prefix('-')?;

        let (media_type, track_ts) = rest.rsplit_once('-')?;
        if media_type.is_empty() {
            return None;
        }

        Some(Self {
            recording_start_ts,
            participant_id,
            media_type,
            track_start_ts: parse_digits(track_ts)?,
        })
    }
}

fn parse_digits(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositorError;
    use tempfile::tempdir;

    const P1: &str = "0a1b2c3d-0000-4000-8000-000000000001";
    const P2: &str = "0a1b2c3d-0000-4000-8000-000000000002";

    fn entry(media_type: &str) -> TrackEntry {
        TrackEntry {
            file: PathBuf::from(format!("{}.webm", media_type)),
            media_type: media_type.to_string(),
            start_ts: 0,
            start_offset_secs: 0.0,
        }
    }

    #[test]
    fn test_load_resolves_against_manifest_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(
            &path,
            r#"{"recordingStartTs": 1700000000000,
                "participants": [{"id": "p1", "tracks": [
                    {"file": "a.webm", "mediaType": "cam-video", "startTs": 1700000001000, "startOffsetSecs": 1.0}
                ]}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("a.webm"), b"").unwrap();

        let manifest = SessionManifest::load(&path).unwrap();
        assert_eq!(manifest.participants[0].tracks[0].start_offset_secs, 1.0);
        let track = &manifest.participants[0].tracks[0];
        assert_eq!(manifest.track_path(track).unwrap(), dir.path().join("a.webm"));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let err = SessionManifest::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CompositorError::Manifest(ManifestError::NotFound { .. })));
        assert_eq!(err.exit_code(), 1);

        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"recordingStartTs": 1}"#).unwrap();
        let err = SessionManifest::load(&path).unwrap_err();
        assert!(matches!(err, CompositorError::Manifest(ManifestError::Invalid { .. })));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_track_file() {
        let manifest = SessionManifest {
            recording_start_ts: 0,
            participants: Vec::new(),
            root_dir: PathBuf::from("/definitely/not/here"),
        };
        assert!(matches!(
            manifest.track_path(&entry(CAM_VIDEO)),
            Err(ManifestError::MissingTrackFile { .. })
        ));
    }

    #[test]
    fn test_classify() {
        let both = Participant {
            id: "p".into(),
            tracks: vec![entry(CAM_AUDIO), entry("screen-video"), entry(CAM_VIDEO)],
        };
        assert!(matches!(
            both.classify().unwrap(),
            ParticipantTracks::Combined { video, audio }
                if video.media_type == CAM_VIDEO && audio.media_type == CAM_AUDIO
        ));

        let single = Participant {
            id: "p".into(),
            tracks: vec![entry("screen-video"), entry(CAM_AUDIO)],
        };
        assert!(matches!(
            single.classify().unwrap(),
            ParticipantTracks::Single(t) if t.media_type == "screen-video"
        ));

        let empty = Participant {
            id: "p".into(),
            tracks: Vec::new(),
        };
        assert_eq!(empty.classify().unwrap(), ParticipantTracks::Empty);
    }

    #[test]
    fn test_duplicate_kinds_rejected() {
        let videos = Participant {
            id: "p".into(),
            tracks: vec![entry(CAM_VIDEO), entry(CAM_VIDEO)],
        };
        assert!(matches!(
            videos.classify(),
            Err(ManifestError::DuplicateTrack { ref media_type, .. }) if media_type == CAM_VIDEO
        ));

        // a lone audio track never counts as a duplicate of a video track
        let audios = Participant {
            id: "p".into(),
            tracks: vec![entry(CAM_VIDEO), entry(CAM_AUDIO), entry(CAM_AUDIO)],
        };
        assert!(matches!(
            audios.classify(),
            Err(ManifestError::DuplicateTrack { ref media_type, .. }) if media_type == CAM_AUDIO
        ));
    }

    #[test]
    fn test_audio_media_types() {
        assert!(entry("cam-audio").is_audio());
        assert!(entry("screen-audio").is_audio());
        assert!(!entry("cam-video").is_audio());
    }

    #[test]
    fn test_raw_track_name() {
        let name = format!("1700000000000-{}-cam-video-1700000002500.webm", P1);
        assert_eq!(
            RawTrackName::parse(&name),
            Some(RawTrackName {
                recording_start_ts: 1_700_000_000_000,
                participant_id: P1,
                media_type: "cam-video",
                track_start_ts: 1_700_000_002_500,
            })
        );
        assert_eq!(RawTrackName::parse("notes.webm"), None);
        assert_eq!(RawTrackName::parse(&format!("abc-{}-cam-video-1.webm", P1)), None);
    }

    #[test]
    fn test_from_directory() {
        let dir = tempdir().unwrap();
        for name in [
            format!("1000-{}-cam-video-1500.webm", P1),
            format!("1000-{}-cam-audio-1400.webm", P1),
            format!("1000-{}-cam-video-4000.webm", P2),
            format!("2000-{}-cam-video-2500.webm", P2),
            "README.txt".to_string(),
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let manifest = SessionManifest::from_directory(dir.path()).unwrap();
        assert_eq!(manifest.recording_start_ts, 1000);
        assert_eq!(manifest.participants.len(), 2);

        let p1 = manifest.participants.iter().find(|p| p.id == P1).unwrap();
        assert_eq!(p1.tracks.len(), 2);
        let video = p1.tracks.iter().find(|t| t.media_type == CAM_VIDEO).unwrap();
        assert_eq!(video.start_offset_secs, 0.5);

        let p2 = manifest.participants.iter().find(|p| p.id == P2).unwrap();
        assert_eq!(p2.tracks.len(), 1);
        assert_eq!(p2.tracks[0].start_offset_secs, 3.0);
        assert_eq!(manifest.default_file_name(), "raw-tracks-manifest-1000.json");

        let path = dir.path().join(manifest.default_file_name());
        manifest.write_to(&path).unwrap();
        let reloaded = SessionManifest::load(&path).unwrap();
        assert_eq!(reloaded.participants, manifest.participants);
    }

    #[test]
    fn test_from_empty_directory() {
        let dir = tempdir().unwrap();
        assert!(SessionManifest::from_directory(dir.path()).is_err());
    }
}
