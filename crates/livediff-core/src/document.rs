use std::{
    collections::BTreeMap,
    fmt,
    fs,
    io::Read,
    path::Path,
};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::FormatError,
    fingerprint::TrackFingerprint,
    node::{DocumentNode, parse_xml},
};

pub const DEFAULT_TRACK_NAME: &str = "Unnamed Track";
pub const UNKNOWN_PARAMETER_ID: &str = "Unknown";

const MASTER_TAGS: [&str; 2] = ["MasterTrack", "MainTrack"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Midi,
    Return,
    Master,
}

impl TrackKind {
    /// Emission order of [`DocumentModel::tracks`]. Positional identity
    /// depends on it, so it never follows source interleaving.
    pub const ORDERED: [Self; 4] = [Self::Audio, Self::Midi, Self::Return, Self::Master];

    #[must_use]
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            Self::Audio => &["AudioTrack"],
            Self::Midi => &["MidiTrack"],
            Self::Return => &["ReturnTrack"],
            Self::Master => &MASTER_TAGS,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Audio => "audio",
            Self::Midi => "midi",
            Self::Return => "return",
            Self::Master => "master",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentModel {
    root: DocumentNode,
}

impl DocumentModel {
    /// Decompresses a gzip session payload and parses the tree inside it.
    #[instrument(skip(bytes), fields(len = bytes.len()))]
    pub fn load(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut xml = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut xml)
            .map_err(FormatError::Decompress)?;
        let xml = String::from_utf8(xml)?;
        let model = Self::from_xml(&xml)?;
        debug!(root = %model.root.tag, "session document loaded");
        Ok(model)
    }

    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let bytes = fs::read(path).map_err(|source| FormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&bytes)
    }

    /// Parses an already decompressed document.
    pub fn from_xml(xml: &str) -> Result<Self, FormatError> {
        parse_xml(xml).map(Self::from_root)
    }

    #[must_use]
    pub fn from_root(root: DocumentNode) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &DocumentNode {
        &self.root
    }

    /// Every track, grouped by kind in [`TrackKind::ORDERED`] and in
    /// document order within each kind.
    #[must_use]
    pub fn tracks(&self) -> Vec<Track<'_>> {
        TrackKind::ORDERED
            .into_iter()
            .flat_map(|kind| self.tracks_of_kind(kind))
            .collect()
    }

    #[must_use]
    pub fn tracks_of_kind(&self, kind: TrackKind) -> Vec<Track<'_>> {
        kind.tags()
            .iter()
            .flat_map(|tag| self.root.find_all(&format!(".//{tag}")))
            .map(|node| Track { node, kind })
            .collect()
    }

    /// Audio, MIDI and return tracks keyed by fingerprint.
    ///
    /// Two tracks with the same name and device chain collapse into one
    /// entry; the later track in iteration order wins.
    #[must_use]
    pub fn tracks_by_fingerprint(&self) -> BTreeMap<TrackFingerprint, Track<'_>> {
        let mut tracks = BTreeMap::new();
        for track in self
            .tracks()
            .into_iter()
            .filter(|track| track.kind() != TrackKind::Master)
        {
            tracks.insert(track.fingerprint(), track);
        }
        tracks
    }

    fn master_node(&self) -> Option<&DocumentNode> {
        MASTER_TAGS
            .iter()
            .find_map(|tag| self.root.find(&format!(".//{tag}")))
    }

    #[must_use]
    pub fn tempo(&self) -> Option<f64> {
        self.master_node()?
            .find_value(".//Tempo/Manual")
            .and_then(|raw| raw.trim().parse().ok())
    }

    /// `"numerator/denominator"` from the master track's time signature.
    #[must_use]
    pub fn time_signature(&self) -> Option<String> {
        let signature = self.master_node()?.find(".//TimeSignature")?;
        let numerator = signature
            .find_value(".//TimeSignatures//RemoteableTimeSignature//Numerator")?;
        let denominator = signature
            .find_value(".//TimeSignatures//RemoteableTimeSignature//Denominator")?;
        Some(format!("{numerator}/{denominator}"))
    }

    #[must_use]
    pub fn scene_count(&self) -> usize {
        self.root.find_all(".//Scene").len()
    }

    #[must_use]
    pub fn locators(&self) -> Vec<Locator> {
        self.root
            .find_all(".//Locators/Locators/Locator")
            .into_iter()
            .filter_map(|locator| {
                let time = locator.find(".//Time")?;
                let name = locator.find(".//Name")?;
                let time = match time.value() {
                    Some(raw) => raw.trim().parse().ok()?,
                    None => 0.0,
                };
                Some(Locator {
                    time,
                    name: name.value().unwrap_or_default().to_string(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Locator {
    pub time: f64,
    pub name: String,
}

/// Read-only view over a track element.
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    node: &'a DocumentNode,
    kind: TrackKind,
}

impl<'a> Track<'a> {
    #[must_use]
    pub fn new(node: &'a DocumentNode, kind: TrackKind) -> Self {
        Self { node, kind }
    }

    #[must_use]
    pub fn node(&self) -> &'a DocumentNode {
        self.node
    }

    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Structural tag, e.g. `MidiTrack`.
    #[must_use]
    pub fn tag(&self) -> &'a str {
        &self.node.tag
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        self.node
            .find_value(".//Name/EffectiveName")
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_TRACK_NAME)
    }

    #[must_use]
    pub fn devices(&self) -> Vec<Device<'a>> {
        let Some(chain) = self.node.find(".//DeviceChain/DeviceChain") else {
            return Vec::new();
        };
        let holder = chain.find("Devices").unwrap_or(chain);
        holder.children.iter().map(|node| Device { node }).collect()
    }

    #[must_use]
    pub fn device_identifiers(&self) -> Vec<String> {
        self.devices()
            .iter()
            .map(|device| device.identifier().to_string())
            .collect()
    }

    #[must_use]
    pub fn fingerprint(&self) -> TrackFingerprint {
        TrackFingerprint::new(self.name(), self.device_identifiers())
    }

    /// One clip per occupied slot; empty slots are skipped.
    #[must_use]
    pub fn clips(&self) -> Vec<Clip<'a>> {
        self.node
            .outermost("ClipSlot")
            .into_iter()
            .filter_map(|slot| {
                slot.find(".//MidiClip")
                    .map(|node| Clip {
                        node,
                        kind: ClipKind::Midi,
                    })
                    .or_else(|| {
                        slot.find(".//AudioClip").map(|node| Clip {
                            node,
                            kind: ClipKind::Audio,
                        })
                    })
            })
            .collect()
    }

    #[must_use]
    pub fn volume(&self) -> Option<ScalarParam<'a>> {
        self.scalar(".//Volume/Manual")
    }

    #[must_use]
    pub fn pan(&self) -> Option<ScalarParam<'a>> {
        self.scalar(".//Pan/Manual")
    }

    #[must_use]
    pub fn tempo(&self) -> Option<ScalarParam<'a>> {
        self.scalar(".//Tempo/Manual")
    }

    fn scalar(&self, path: &str) -> Option<ScalarParam<'a>> {
        self.node.find_value(path).map(|raw| ScalarParam { raw })
    }

    #[must_use]
    pub fn color(&self) -> Option<&'a str> {
        self.node.find_value(".//Color")
    }

    /// A track is muted when its mixer's track activator is switched off.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.node.find_value(".//Mixer/Speaker/Manual") == Some("false")
    }

    #[must_use]
    pub fn automation_envelopes(&self) -> Vec<AutomationEnvelope<'a>> {
        self.node
            .find_all(".//AutomationEnvelopes/Envelopes/AutomationEnvelope")
            .into_iter()
            .map(|node| AutomationEnvelope { node })
            .collect()
    }
}

/// A scalar mixer/transport parameter as stored in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarParam<'a> {
    pub raw: &'a str,
}

impl ScalarParam<'_> {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.raw.trim().parse().ok()
    }

    /// Exact comparison of the resolved value: numerically when both
    /// sides parse, textually otherwise. No tolerance is applied.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same_value(&self, other: &ScalarParam<'_>) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(left), Some(right)) => left == right || (left.is_nan() && right.is_nan()),
            _ => self.raw == other.raw,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Device<'a> {
    node: &'a DocumentNode,
}

impl<'a> Device<'a> {
    #[must_use]
    pub fn tag(&self) -> &'a str {
        &self.node.tag
    }

    #[must_use]
    pub fn plugin_name(&self) -> Option<&'a str> {
        [
            ".//PluginDesc/VstPluginInfo/PlugName",
            ".//PluginDesc/Vst3PluginInfo/Name",
        ]
        .into_iter()
        .find_map(|path| self.node.find_value(path).filter(|name| !name.is_empty()))
    }

    /// Plugin display name when present, structural tag otherwise.
    #[must_use]
    pub fn identifier(&self) -> &'a str {
        self.plugin_name().unwrap_or_else(|| self.tag())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Midi,
    Audio,
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Midi => "midi",
            Self::Audio => "audio",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Clip<'a> {
    node: &'a DocumentNode,
    kind: ClipKind,
}

impl<'a> Clip<'a> {
    #[must_use]
    pub fn kind(&self) -> ClipKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        self.node
            .find("Name")
            .or_else(|| self.node.find(".//Name"))
            .and_then(DocumentNode::value)
            .unwrap_or_default()
    }

    /// Note events in document order. Audio clips have none.
    #[must_use]
    pub fn notes(&self) -> Vec<Note<'a>> {
        if self.kind == ClipKind::Audio {
            return Vec::new();
        }

        let mut notes = Vec::new();
        for key_track in self.node.find_all(".//Notes/KeyTracks/KeyTrack") {
            let track_key = key_track.find_value("MidiKey");
            notes.extend(
                key_track
                    .find_all("Notes/MidiNoteEvent")
                    .into_iter()
                    .map(|node| Note { node, track_key }),
            );
        }
        notes
    }
}

const MAX_MIDI_KEY: u8 = 127;

#[derive(Debug, Clone, Copy)]
pub struct Note<'a> {
    node: &'a DocumentNode,
    track_key: Option<&'a str>,
}

impl<'a> Note<'a> {
    /// The note's own `Key`, or the enclosing key track's `MidiKey`.
    #[must_use]
    pub fn raw_pitch(&self) -> Option<&'a str> {
        self.node.attr("Key").or(self.track_key)
    }

    #[must_use]
    pub fn raw_velocity(&self) -> Option<&'a str> {
        self.node.attr("Velocity")
    }

    /// MIDI key in `0..=127`; keys outside that range count as malformed.
    #[must_use]
    pub fn pitch(&self) -> Option<u8> {
        let key: i32 = self.raw_pitch()?.trim().parse().ok()?;
        u8::try_from(key).ok().filter(|key| *key <= MAX_MIDI_KEY)
    }

    /// Velocity exactly as stored; no renormalisation.
    #[must_use]
    pub fn velocity(&self) -> Option<f64> {
        self.raw_velocity()?.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AutomationEnvelope<'a> {
    node: &'a DocumentNode,
}

impl<'a> AutomationEnvelope<'a> {
    /// Identifier of the automated parameter, if the envelope names one.
    #[must_use]
    pub fn parameter_id(&self) -> Option<&'a str> {
        if let Some(pointee) = self.node.find(".//Envelope/Automation/Pointee") {
            return Some(pointee.attr("Id").unwrap_or(UNKNOWN_PARAMETER_ID));
        }
        self.node
            .find(".//EnvelopeTarget/PointeeId")
            .map(|pointee| pointee.value().unwrap_or(UNKNOWN_PARAMETER_ID))
    }

    #[must_use]
    pub fn events(&self) -> Vec<&'a DocumentNode> {
        self.node.find_all(".//Automation/Events/FloatEvent")
    }
}
