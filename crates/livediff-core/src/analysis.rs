//! Musical content statistics: note ranges, velocities and automation lanes.
//!
//! Malformed numeric attributes never abort analysis. A note whose pitch or
//! velocity does not parse still counts as a note but is left out of the
//! corresponding range and average.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::document::{Clip, ClipKind, DocumentModel, Locator, Track, TrackKind};

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Octave offset of the naming convention: key 60 is `C4`.
const OCTAVE_OFFSET: i32 = 2;

#[must_use]
pub fn note_name(key: u8) -> String {
    let octave = i32::from(key / 12) - OCTAVE_OFFSET;
    format!("{}{octave}", NOTE_NAMES[usize::from(key % 12)])
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PitchRange {
    pub low: u8,
    pub high: u8,
}

impl PitchRange {
    #[must_use]
    pub fn widen(self, other: Self) -> Self {
        Self {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.low <= other.low && self.high >= other.high
    }

    fn from_values(values: impl IntoIterator<Item = u8>) -> Option<Self> {
        values.into_iter().fold(None, |range, value| {
            let point = Self {
                low: value,
                high: value,
            };
            Some(range.map_or(point, |range: Self| range.widen(point)))
        })
    }
}

impl fmt::Display for PitchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", note_name(self.low), note_name(self.high))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VelocityRange {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipStats {
    pub note_count: usize,
    pub pitch_range: Option<PitchRange>,
    pub velocity_range: Option<VelocityRange>,
    pub avg_velocity: f64,
}

impl Default for ClipStats {
    fn default() -> Self {
        Self {
            note_count: 0,
            pitch_range: None,
            velocity_range: None,
            avg_velocity: 0.0,
        }
    }
}

#[must_use]
pub fn analyze_clip(clip: &Clip<'_>) -> ClipStats {
    let notes = clip.notes();
    if notes.is_empty() {
        return ClipStats::default();
    }

    let pitch_range = PitchRange::from_values(notes.iter().filter_map(|note| note.pitch()));
    let velocities: Vec<f64> = notes.iter().filter_map(|note| note.velocity()).collect();

    let (velocity_range, avg_velocity) = if velocities.is_empty() {
        (None, 0.0)
    } else {
        let low = velocities.iter().copied().fold(f64::INFINITY, f64::min);
        let high = velocities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let avg = velocities.iter().sum::<f64>() / velocities.len() as f64;
        (Some(VelocityRange { low, high }), avg)
    };

    ClipStats {
        note_count: notes.len(),
        pitch_range,
        velocity_range,
        avg_velocity,
    }
}

/// Per-track MIDI aggregate, built once per track and fed clip by clip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackStats {
    pub total_notes: usize,
    pub clips_with_notes: usize,
    pub pitch_range: Option<PitchRange>,
}

impl TrackStats {
    /// Folds one clip in. Ranges only ever widen.
    pub fn absorb(&mut self, clip: &ClipStats) {
        if clip.note_count == 0 {
            return;
        }
        self.total_notes += clip.note_count;
        self.clips_with_notes += 1;
        self.pitch_range = match (self.pitch_range, clip.pitch_range) {
            (Some(current), Some(next)) => Some(current.widen(next)),
            (current, next) => current.or(next),
        };
    }
}

#[must_use]
pub fn analyze_track(track: &Track<'_>) -> TrackStats {
    let mut stats = TrackStats::default();
    for clip in track.clips() {
        stats.absorb(&analyze_clip(&clip));
    }
    stats
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaneStats {
    pub parameter: String,
    pub point_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

/// One entry per envelope that names its target parameter.
#[must_use]
pub fn analyze_automation(track: &Track<'_>) -> Vec<LaneStats> {
    track
        .automation_envelopes()
        .into_iter()
        .filter_map(|envelope| {
            let parameter = envelope.parameter_id()?;
            let events = envelope.events();
            let values: Vec<f64> = events
                .iter()
                .filter_map(|event| event.value())
                .filter(|raw| !raw.is_empty())
                .filter_map(|raw| raw.trim().parse().ok())
                .collect();

            let (min_value, max_value) = if values.is_empty() {
                (None, None)
            } else {
                (
                    Some(values.iter().copied().fold(f64::INFINITY, f64::min)),
                    Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                )
            };

            Some(LaneStats {
                parameter: parameter.to_string(),
                point_count: events.len(),
                min_value,
                max_value,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipSummary {
    pub name: String,
    pub kind: ClipKind,
    pub stats: ClipStats,
}

/// Everything the inspection tooling shows for a single track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackAnalysis {
    pub name: String,
    pub kind: TrackKind,
    pub tag: String,
    pub color: Option<String>,
    pub muted: bool,
    pub devices: Vec<String>,
    pub clips: Vec<ClipSummary>,
    pub volume: Option<f64>,
    pub pan: Option<f64>,
    pub automation: Vec<LaneStats>,
    pub midi: TrackStats,
}

#[must_use]
pub fn inspect_track(track: &Track<'_>) -> TrackAnalysis {
    let mut midi = TrackStats::default();
    let clips: Vec<ClipSummary> = track
        .clips()
        .iter()
        .map(|clip| {
            let stats = analyze_clip(clip);
            midi.absorb(&stats);
            ClipSummary {
                name: clip.name().to_string(),
                kind: clip.kind(),
                stats,
            }
        })
        .collect();

    TrackAnalysis {
        name: track.name().to_string(),
        kind: track.kind(),
        tag: track.tag().to_string(),
        color: track.color().map(str::to_string),
        muted: track.is_muted(),
        devices: track.device_identifiers(),
        clips,
        volume: track.volume().and_then(|param| param.as_f64()),
        pan: track.pan().and_then(|param| param.as_f64()),
        automation: analyze_automation(track),
        midi,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub tempo: Option<f64>,
    pub time_signature: Option<String>,
    pub track_count: usize,
    pub scene_count: usize,
    pub locators: Vec<Locator>,
}

/// Session-level overview. The master track is not part of `track_count`.
#[instrument(skip(document))]
#[must_use]
pub fn analyze(document: &DocumentModel) -> SessionSummary {
    let track_count = [TrackKind::Audio, TrackKind::Midi, TrackKind::Return]
        .into_iter()
        .map(|kind| document.tracks_of_kind(kind).len())
        .sum();

    let summary = SessionSummary {
        tempo: document.tempo(),
        time_signature: document.time_signature(),
        track_count,
        scene_count: document.scene_count(),
        locators: document.locators(),
    };
    debug!(
        tempo = ?summary.tempo,
        track_count = summary.track_count,
        scene_count = summary.scene_count,
        "session analyzed"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_names_use_minus_two_octave_offset() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(0), "C-2");
        assert_eq!(note_name(127), "G8");
        assert_eq!(note_name(61), "C#4");
    }

    #[test]
    fn absorb_seeds_then_widens() {
        let mut stats = TrackStats::default();
        stats.absorb(&ClipStats {
            note_count: 2,
            pitch_range: Some(PitchRange { low: 48, high: 60 }),
            ..ClipStats::default()
        });
        stats.absorb(&ClipStats {
            note_count: 1,
            pitch_range: Some(PitchRange { low: 52, high: 55 }),
            ..ClipStats::default()
        });
        stats.absorb(&ClipStats::default());
        stats.absorb(&ClipStats {
            note_count: 3,
            pitch_range: Some(PitchRange { low: 36, high: 50 }),
            ..ClipStats::default()
        });

        assert_eq!(stats.total_notes, 6);
        assert_eq!(stats.clips_with_notes, 3);
        assert_eq!(stats.pitch_range, Some(PitchRange { low: 36, high: 60 }));
    }

    #[test]
    fn absorb_keeps_range_when_clip_has_no_parsable_pitch() {
        let mut stats = TrackStats::default();
        stats.absorb(&ClipStats {
            note_count: 4,
            pitch_range: None,
            ..ClipStats::default()
        });
        assert_eq!(stats.pitch_range, None);
        stats.absorb(&ClipStats {
            note_count: 1,
            pitch_range: Some(PitchRange { low: 70, high: 70 }),
            ..ClipStats::default()
        });
        assert_eq!(stats.pitch_range, Some(PitchRange { low: 70, high: 70 }));
        assert_eq!(stats.clips_with_notes, 2);
    }

    #[test]
    fn pitch_range_display_uses_note_names() {
        let range = PitchRange { low: 36, high: 69 };
        assert_eq!(range.to_string(), "C1 to A4");
    }
}
