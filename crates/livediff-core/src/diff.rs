//! Comparison of two session documents.
//!
//! Two identity strategies are offered side by side:
//!
//! - [`diff_tracks`] keys tracks by `(index, name)` and reports structural
//!   facets (device count, clip count, scalar parameters).
//! - [`diff_tracks_by_fingerprint`] keys tracks by name and device chain and
//!   reports musical facets. A renamed track shows up here as removed plus
//!   added, while the positional diff may still match it by index.
//!
//! Every function is a pure function of its inputs; output order is fully
//! determined by the documents.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    analysis::{SessionSummary, TrackStats, analyze, analyze_automation, analyze_track},
    document::{DocumentModel, ScalarParam, Track},
    fingerprint::TrackFingerprint,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
        })
    }
}

/// Open set of change categories; unknown labels round-trip as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeCategory {
    Track,
    Device,
    Parameter,
    Clip,
    Automation,
    Session,
    Other(String),
}

impl ChangeCategory {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Track => "track",
            Self::Device => "device",
            Self::Parameter => "parameter",
            Self::Clip => "clip",
            Self::Automation => "automation",
            Self::Session => "session",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for ChangeCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "track" => Self::Track,
            "device" => Self::Device,
            "parameter" => Self::Parameter,
            "clip" => Self::Clip,
            "automation" => Self::Automation,
            "session" => Self::Session,
            _ => Self::Other(value),
        }
    }
}

impl From<ChangeCategory> for String {
    fn from(value: ChangeCategory) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Count(i64),
    Number(f64),
    Text(String),
}

impl fmt::Display for DetailValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for DetailValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<usize> for DetailValue {
    fn from(value: usize) -> Self {
        Self::Count(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for DetailValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub change_type: ChangeType,
    pub category: ChangeCategory,
    /// Human-readable locator such as `Track[2]:Lead/volume`.
    pub path: String,
    #[serde(default)]
    pub details: BTreeMap<String, DetailValue>,
}

impl Change {
    #[must_use]
    pub fn new(change_type: ChangeType, category: ChangeCategory, path: impl Into<String>) -> Self {
        Self {
            change_type,
            category,
            path: path.into(),
            details: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn added(category: ChangeCategory, path: impl Into<String>) -> Self {
        Self::new(ChangeType::Added, category, path)
    }

    #[must_use]
    pub fn removed(category: ChangeCategory, path: impl Into<String>) -> Self {
        Self::new(ChangeType::Removed, category, path)
    }

    #[must_use]
    pub fn modified(category: ChangeCategory, path: impl Into<String>) -> Self {
        Self::new(ChangeType::Modified, category, path)
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&DetailValue> {
        self.details.get(key)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.change_type {
            ChangeType::Added => "+ Added",
            ChangeType::Removed => "- Removed",
            ChangeType::Modified => "* Modified",
        };
        write!(f, "{verb} {}: {}", self.category, self.path)?;
        if !self.details.is_empty() {
            let details = self
                .details
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

/// Positional identity: ordinal in [`DocumentModel::tracks`] plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackKey {
    pub index: usize,
    pub name: String,
}

impl TrackKey {
    #[must_use]
    pub fn path(&self) -> String {
        format!("Track[{}]", self.index)
    }
}

#[must_use]
pub fn positional_keys<'a>(document: &'a DocumentModel) -> BTreeMap<TrackKey, Track<'a>> {
    document
        .tracks()
        .into_iter()
        .enumerate()
        .map(|(index, track)| {
            (
                TrackKey {
                    index,
                    name: track.name().to_string(),
                },
                track,
            )
        })
        .collect()
}

/// Positional comparison of two documents; the default diff.
#[must_use]
pub fn compare(old: &DocumentModel, new: &DocumentModel) -> Vec<Change> {
    diff_tracks(old, new)
}

#[must_use]
pub fn diff_tracks(old: &DocumentModel, new: &DocumentModel) -> Vec<Change> {
    let old_tracks = positional_keys(old);
    let new_tracks = positional_keys(new);
    let mut changes = Vec::new();

    for (key, track) in new_tracks.iter().filter(|(key, _)| !old_tracks.contains_key(*key)) {
        changes.push(
            Change::added(ChangeCategory::Track, key.path())
                .with_detail("name", key.name.as_str())
                .with_detail("type", track.tag()),
        );
    }

    for (key, track) in old_tracks.iter().filter(|(key, _)| !new_tracks.contains_key(*key)) {
        changes.push(
            Change::removed(ChangeCategory::Track, key.path())
                .with_detail("name", key.name.as_str())
                .with_detail("type", track.tag()),
        );
    }

    for (key, old_track) in &old_tracks {
        if let Some(new_track) = new_tracks.get(key) {
            let path = format!("{}:{}", key.path(), key.name);
            changes.extend(diff_track_contents(old_track, new_track, &path));
        }
    }

    debug!(
        old_tracks = old_tracks.len(),
        new_tracks = new_tracks.len(),
        changes = changes.len(),
        "positional track diff complete"
    );
    changes
}

/// Structural facets of two tracks already matched by identity. Each
/// differing facet yields its own change.
#[must_use]
pub fn diff_track_contents(old: &Track<'_>, new: &Track<'_>, path: &str) -> Vec<Change> {
    let mut changes = Vec::new();

    let (old_devices, new_devices) = (old.devices().len(), new.devices().len());
    if old_devices != new_devices {
        changes.push(
            Change::modified(ChangeCategory::Track, path)
                .with_detail("device_count", transition(old_devices, new_devices)),
        );
    }

    let (old_clips, new_clips) = (old.clips().len(), new.clips().len());
    if old_clips != new_clips {
        changes.push(
            Change::modified(ChangeCategory::Track, path)
                .with_detail("clip_count", transition(old_clips, new_clips)),
        );
    }

    for (label, before, after) in [
        ("volume", old.volume(), new.volume()),
        ("pan", old.pan(), new.pan()),
        ("tempo", old.tempo(), new.tempo()),
    ] {
        let (Some(before), Some(after)) = (before, after) else {
            continue;
        };
        if !before.same_value(&after) {
            changes.push(
                Change::modified(ChangeCategory::Parameter, format!("{path}/{label}"))
                    .with_detail("value", transition(before.raw, after.raw)),
            );
        }
    }

    changes
}

/// Track changes between two sessions matched by fingerprint, kept apart
/// per kind so readers never have to regroup them from rendered paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerprintDiff {
    pub added: Vec<Change>,
    pub removed: Vec<Change>,
    /// Only tracks with at least one changed facet, in fingerprint order.
    pub modified: Vec<TrackModification>,
    /// Number of fingerprints present in both sessions.
    pub shared: usize,
}

impl FingerprintDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Whether either session has any fingerprinted track at all.
    #[must_use]
    pub fn has_tracks(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || self.shared > 0
    }

    /// Flat change list: added, then removed, then modified facets.
    #[must_use]
    pub fn into_changes(self) -> Vec<Change> {
        let mut changes = self.added;
        changes.extend(self.removed);
        changes.extend(self.modified.into_iter().flat_map(|track| track.changes));
        changes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackModification {
    pub fingerprint: TrackFingerprint,
    pub changes: Vec<Change>,
}

/// Fingerprint comparison: tracks that kept their name and device chain
/// match regardless of where they moved to.
#[must_use]
pub fn diff_tracks_by_fingerprint(old: &DocumentModel, new: &DocumentModel) -> Vec<Change> {
    fingerprint_diff(old, new).into_changes()
}

/// Grouped form of [`diff_tracks_by_fingerprint`].
#[must_use]
pub fn fingerprint_diff(old: &DocumentModel, new: &DocumentModel) -> FingerprintDiff {
    let old_tracks = old.tracks_by_fingerprint();
    let new_tracks = new.tracks_by_fingerprint();
    let mut diff = FingerprintDiff::default();

    for (fingerprint, track) in &new_tracks {
        if !old_tracks.contains_key(fingerprint) {
            diff.added.push(fingerprint_change(ChangeType::Added, fingerprint, track));
        }
    }
    for (fingerprint, track) in &old_tracks {
        if !new_tracks.contains_key(fingerprint) {
            diff.removed.push(fingerprint_change(ChangeType::Removed, fingerprint, track));
        }
    }

    for (fingerprint, old_track) in &old_tracks {
        let Some(new_track) = new_tracks.get(fingerprint) else {
            continue;
        };
        diff.shared += 1;
        let changes = diff_musical_content(old_track, new_track, &fingerprint_path(fingerprint));
        if !changes.is_empty() {
            diff.modified.push(TrackModification {
                fingerprint: fingerprint.clone(),
                changes,
            });
        }
    }

    debug!(
        old_tracks = old_tracks.len(),
        new_tracks = new_tracks.len(),
        shared = diff.shared,
        added = diff.added.len(),
        removed = diff.removed.len(),
        modified = diff.modified.len(),
        "fingerprint track diff complete"
    );
    diff
}

fn fingerprint_path(fingerprint: &TrackFingerprint) -> String {
    format!("Track{{{fingerprint}}}")
}

fn fingerprint_change(
    change_type: ChangeType,
    fingerprint: &TrackFingerprint,
    track: &Track<'_>,
) -> Change {
    Change::new(change_type, ChangeCategory::Track, fingerprint_path(fingerprint))
        .with_detail("name", fingerprint.name.as_str())
        .with_detail("type", track.tag())
        .with_detail("devices", fingerprint.devices.join(","))
}

/// Musical facets of two tracks matched by fingerprint.
#[must_use]
pub fn diff_musical_content(old: &Track<'_>, new: &Track<'_>, path: &str) -> Vec<Change> {
    let name = new.name();
    let mut changes = Vec::new();
    let mut push = |category: ChangeCategory, facet: &str, value: String| {
        changes.push(
            Change::modified(category, format!("{path}/{facet}"))
                .with_detail("track", name)
                .with_detail(facet, value),
        );
    };

    for (facet, before, after) in [
        ("volume", old.volume(), new.volume()),
        ("pan", old.pan(), new.pan()),
    ] {
        let same = match (before, after) {
            (Some(before), Some(after)) => before.same_value(&after),
            (None, None) => true,
            _ => false,
        };
        if !same {
            push(
                ChangeCategory::Parameter,
                facet,
                transition(mixer_value(before), mixer_value(after)),
            );
        }
    }

    let (old_clips, new_clips) = (old.clips().len(), new.clips().len());
    if old_clips != new_clips {
        push(ChangeCategory::Clip, "clip_count", transition(old_clips, new_clips));
    }

    let (old_lanes, new_lanes) = (analyze_automation(old).len(), analyze_automation(new).len());
    if old_lanes != new_lanes {
        push(
            ChangeCategory::Automation,
            "automation_lanes",
            transition(old_lanes, new_lanes),
        );
    }

    let old_stats: TrackStats = analyze_track(old);
    let new_stats: TrackStats = analyze_track(new);
    if old_stats.total_notes != new_stats.total_notes {
        push(
            ChangeCategory::Clip,
            "midi_notes",
            transition(old_stats.total_notes, new_stats.total_notes),
        );
    }
    if old_stats.pitch_range != new_stats.pitch_range {
        if let Some(range) = new_stats.pitch_range {
            push(ChangeCategory::Clip, "pitch_range", range.to_string());
        }
    }

    changes
}

/// Session-level facets: tempo, time signature, track and scene counts.
#[must_use]
pub fn diff_sessions(old: &SessionSummary, new: &SessionSummary) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut push = |facet: &str, value: String| {
        changes.push(
            Change::modified(ChangeCategory::Session, format!("Session/{facet}"))
                .with_detail("value", value),
        );
    };

    if old.tempo != new.tempo {
        push(
            "tempo",
            transition(tempo_value(old.tempo), tempo_value(new.tempo)),
        );
    }
    if old.time_signature != new.time_signature {
        push(
            "time_signature",
            transition(
                display_or_none(old.time_signature.as_deref()),
                display_or_none(new.time_signature.as_deref()),
            ),
        );
    }
    if old.track_count != new.track_count {
        push("track_count", transition(old.track_count, new.track_count));
    }
    if old.scene_count != new.scene_count {
        push("scene_count", transition(old.scene_count, new.scene_count));
    }

    changes
}

/// The musically oriented report: session facets plus fingerprint diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub old_summary: SessionSummary,
    pub new_summary: SessionSummary,
    pub session: Vec<Change>,
    pub tracks: FingerprintDiff,
}

impl ChangeReport {
    #[must_use]
    pub fn build(old: &DocumentModel, new: &DocumentModel) -> Self {
        let old_summary = analyze(old);
        let new_summary = analyze(new);
        let session = diff_sessions(&old_summary, &new_summary);
        Self {
            old_summary,
            new_summary,
            session,
            tracks: fingerprint_diff(old, new),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session.is_empty() && self.tracks.is_empty()
    }
}

fn transition(before: impl fmt::Display, after: impl fmt::Display) -> String {
    format!("{before} -> {after}")
}

/// Two decimals when numeric, the stored text otherwise.
fn mixer_value(param: Option<ScalarParam<'_>>) -> String {
    match param {
        Some(param) => param
            .as_f64()
            .map_or_else(|| param.raw.to_string(), |value| format!("{value:.2}")),
        None => "none".to_string(),
    }
}

/// Tempo always keeps a fractional part: `124.0`, `128.5`.
fn tempo_value(tempo: Option<f64>) -> String {
    tempo.map_or_else(|| "none".to_string(), |tempo| format!("{tempo:?}"))
}

fn display_or_none<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "none".to_string(), |value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_display_matches_report_lines() {
        let change = Change::added(ChangeCategory::Track, "Track[2]")
            .with_detail("name", "Lead")
            .with_detail("type", "MidiTrack");
        assert_eq!(
            change.to_string(),
            "+ Added track: Track[2] (name=Lead, type=MidiTrack)"
        );

        let change = Change::modified(ChangeCategory::Parameter, "Track[0]:Drums/volume")
            .with_detail("value", "0.8 -> 0.9");
        assert_eq!(
            change.to_string(),
            "* Modified parameter: Track[0]:Drums/volume (value=0.8 -> 0.9)"
        );

        let bare = Change::removed(ChangeCategory::Other("scene".to_string()), "Scene[1]");
        assert_eq!(bare.to_string(), "- Removed scene: Scene[1]");
    }

    #[test]
    fn category_serializes_as_plain_label() {
        let change = Change::modified(ChangeCategory::Parameter, "p").with_detail("count", 3_usize);
        let json = serde_json::to_value(&change).expect("change should serialize");
        assert_eq!(json["category"], "parameter");
        assert_eq!(json["change_type"], "modified");
        assert_eq!(json["details"]["count"], 3);

        let custom: ChangeCategory = serde_json::from_str("\"locator\"").expect("label should parse");
        assert_eq!(custom, ChangeCategory::Other("locator".to_string()));
        let known: ChangeCategory = serde_json::from_str("\"clip\"").expect("label should parse");
        assert_eq!(known, ChangeCategory::Clip);
    }
}
