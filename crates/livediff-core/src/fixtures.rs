//! Builders for small but structurally faithful session documents.

use std::{fmt::Write as _, io::Write as _};

use anyhow::{Context, Result};
use flate2::{Compression, write::GzEncoder};
use quick_xml::escape::escape;

use crate::document::{ClipKind, TrackKind};

#[derive(Debug, Clone, PartialEq)]
enum DeviceSpec {
    Native(String),
    Plugin(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct KeyTrackSpec {
    midi_key: Option<String>,
    notes: Vec<NoteSpec>,
}

#[derive(Debug, Clone, PartialEq)]
struct NoteSpec {
    key: Option<String>,
    velocity: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipSpec {
    kind: ClipKind,
    name: String,
    key_tracks: Vec<KeyTrackSpec>,
}

impl ClipSpec {
    #[must_use]
    pub fn midi(name: impl Into<String>) -> Self {
        Self {
            kind: ClipKind::Midi,
            name: name.into(),
            key_tracks: Vec::new(),
        }
    }

    #[must_use]
    pub fn audio(name: impl Into<String>) -> Self {
        Self {
            kind: ClipKind::Audio,
            ..Self::midi(name)
        }
    }

    /// A note carrying its own `Key` attribute.
    #[must_use]
    pub fn note(self, key: u8, velocity: f64) -> Self {
        self.raw_note(Some(&key.to_string()), Some(&velocity.to_string()))
    }

    /// A note with arbitrary (possibly malformed or missing) attributes.
    #[must_use]
    pub fn raw_note(mut self, key: Option<&str>, velocity: Option<&str>) -> Self {
        if self.key_tracks.first().is_none_or(|track| track.midi_key.is_some()) {
            self.key_tracks.insert(0, KeyTrackSpec::default());
        }
        self.key_tracks[0].notes.push(NoteSpec {
            key: key.map(str::to_string),
            velocity: velocity.map(str::to_string),
        });
        self
    }

    /// A key track whose notes inherit the pitch from `MidiKey`.
    #[must_use]
    pub fn key_track(mut self, midi_key: &str, velocities: &[&str]) -> Self {
        self.key_tracks.push(KeyTrackSpec {
            midi_key: Some(midi_key.to_string()),
            notes: velocities
                .iter()
                .map(|velocity| NoteSpec {
                    key: None,
                    velocity: Some((*velocity).to_string()),
                })
                .collect(),
        });
        self
    }

    fn write_xml(&self, out: &mut String, id: usize) {
        let tag = match self.kind {
            ClipKind::Midi => "MidiClip",
            ClipKind::Audio => "AudioClip",
        };
        let _ = write!(out, r#"<{tag} Id="{id}"><Name Value="{}" />"#, escape(&self.name));
        if self.kind == ClipKind::Midi {
            out.push_str("<Notes><KeyTracks>");
            for (index, key_track) in self.key_tracks.iter().enumerate() {
                let _ = write!(out, r#"<KeyTrack Id="{index}"><Notes>"#);
                for (note_id, note) in key_track.notes.iter().enumerate() {
                    let _ = write!(
                        out,
                        r#"<MidiNoteEvent Time="{}" Duration="0.25" NoteId="{}""#,
                        note_id,
                        note_id + 1
                    );
                    if let Some(key) = &note.key {
                        let _ = write!(out, r#" Key="{}""#, escape(key));
                    }
                    if let Some(velocity) = &note.velocity {
                        let _ = write!(out, r#" Velocity="{}""#, escape(velocity));
                    }
                    out.push_str(" />");
                }
                out.push_str("</Notes>");
                if let Some(midi_key) = &key_track.midi_key {
                    let _ = write!(out, r#"<MidiKey Value="{}" />"#, escape(midi_key));
                }
                out.push_str("</KeyTrack>");
            }
            out.push_str("</KeyTracks></Notes>");
        }
        let _ = write!(out, "</{tag}>");
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AutomationSpec {
    pointee: String,
    values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackSpec {
    kind: TrackKind,
    name: Option<String>,
    color: Option<String>,
    volume: Option<String>,
    pan: Option<String>,
    tempo: Option<String>,
    muted: bool,
    devices: Vec<DeviceSpec>,
    slots: Vec<Option<ClipSpec>>,
    automation: Vec<AutomationSpec>,
}

impl TrackSpec {
    #[must_use]
    pub fn new(kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            color: None,
            volume: None,
            pan: None,
            tempo: None,
            muted: false,
            devices: Vec::new(),
            slots: Vec::new(),
            automation: Vec::new(),
        }
    }

    #[must_use]
    pub fn audio(name: impl Into<String>) -> Self {
        Self::new(TrackKind::Audio, name)
    }

    #[must_use]
    pub fn midi(name: impl Into<String>) -> Self {
        Self::new(TrackKind::Midi, name)
    }

    #[must_use]
    pub fn return_track(name: impl Into<String>) -> Self {
        Self::new(TrackKind::Return, name)
    }

    #[must_use]
    pub fn master() -> Self {
        Self::new(TrackKind::Master, "Master")
    }

    /// A track without an `EffectiveName` element.
    #[must_use]
    pub fn unnamed(kind: TrackKind) -> Self {
        Self {
            name: None,
            ..Self::new(kind, "")
        }
    }

    #[must_use]
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn volume(mut self, raw: impl Into<String>) -> Self {
        self.volume = Some(raw.into());
        self
    }

    #[must_use]
    pub fn pan(mut self, raw: impl Into<String>) -> Self {
        self.pan = Some(raw.into());
        self
    }

    #[must_use]
    pub fn tempo(mut self, raw: impl Into<String>) -> Self {
        self.tempo = Some(raw.into());
        self
    }

    #[must_use]
    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }

    /// A built-in device, identified by its tag.
    #[must_use]
    pub fn device(mut self, tag: impl Into<String>) -> Self {
        self.devices.push(DeviceSpec::Native(tag.into()));
        self
    }

    #[must_use]
    pub fn plugin(mut self, display_name: impl Into<String>) -> Self {
        self.devices.push(DeviceSpec::Plugin(display_name.into()));
        self
    }

    #[must_use]
    pub fn clip(mut self, clip: ClipSpec) -> Self {
        self.slots.push(Some(clip));
        self
    }

    #[must_use]
    pub fn empty_slot(mut self) -> Self {
        self.slots.push(None);
        self
    }

    #[must_use]
    pub fn automation(mut self, pointee: impl Into<String>, values: &[&str]) -> Self {
        self.automation.push(AutomationSpec {
            pointee: pointee.into(),
            values: values.iter().map(|value| (*value).to_string()).collect(),
        });
        self
    }

    fn tag(&self) -> &'static str {
        match self.kind {
            TrackKind::Audio => "AudioTrack",
            TrackKind::Midi => "MidiTrack",
            TrackKind::Return => "ReturnTrack",
            TrackKind::Master => "MasterTrack",
        }
    }

    fn write_xml(&self, out: &mut String, id: usize, time_signature: Option<(u32, u32)>) {
        let tag = self.tag();
        let _ = write!(out, r#"<{tag} Id="{id}">"#);

        out.push_str("<Name>");
        if let Some(name) = &self.name {
            let name = escape(name);
            let _ = write!(
                out,
                r#"<EffectiveName Value="{name}" /><UserName Value="{name}" />"#
            );
        }
        out.push_str("</Name>");
        if let Some(color) = &self.color {
            let _ = write!(out, r#"<Color Value="{}" />"#, escape(color));
        }

        out.push_str("<AutomationEnvelopes><Envelopes>");
        for (index, lane) in self.automation.iter().enumerate() {
            let _ = write!(
                out,
                r#"<AutomationEnvelope Id="{index}"><EnvelopeTarget><PointeeId Value="{}" /></EnvelopeTarget><Automation><Events>"#,
                escape(&lane.pointee)
            );
            for (event_id, value) in lane.values.iter().enumerate() {
                let _ = write!(
                    out,
                    r#"<FloatEvent Id="{event_id}" Time="{event_id}" Value="{}" />"#,
                    escape(value)
                );
            }
            out.push_str("</Events></Automation></AutomationEnvelope>");
        }
        out.push_str("</Envelopes></AutomationEnvelopes>");

        out.push_str("<DeviceChain><Mixer>");
        let _ = write!(
            out,
            r#"<Speaker><Manual Value="{}" /></Speaker>"#,
            !self.muted
        );
        if let Some(volume) = &self.volume {
            let _ = write!(out, r#"<Volume><Manual Value="{}" /></Volume>"#, escape(volume));
        }
        if let Some(pan) = &self.pan {
            let _ = write!(out, r#"<Pan><Manual Value="{}" /></Pan>"#, escape(pan));
        }
        if let Some(tempo) = &self.tempo {
            let _ = write!(out, r#"<Tempo><Manual Value="{}" /></Tempo>"#, escape(tempo));
        }
        if let Some((numerator, denominator)) = time_signature {
            let _ = write!(
                out,
                r#"<TimeSignature><TimeSignatures><RemoteableTimeSignature Id="0"><Numerator Value="{numerator}" /><Denominator Value="{denominator}" /><Time Value="0" /></RemoteableTimeSignature></TimeSignatures></TimeSignature>"#
            );
        }
        out.push_str("</Mixer>");

        out.push_str("<MainSequencer><ClipSlotList>");
        for (index, slot) in self.slots.iter().enumerate() {
            let _ = write!(out, r#"<ClipSlot Id="{index}"><ClipSlot><Value>"#);
            if let Some(clip) = slot {
                clip.write_xml(out, index);
            }
            out.push_str("</Value></ClipSlot></ClipSlot>");
        }
        out.push_str("</ClipSlotList></MainSequencer>");

        out.push_str("<DeviceChain><Devices>");
        for (index, device) in self.devices.iter().enumerate() {
            match device {
                DeviceSpec::Native(tag) => {
                    let _ = write!(out, r#"<{tag} Id="{index}" />"#);
                }
                DeviceSpec::Plugin(name) => {
                    let _ = write!(
                        out,
                        r#"<PluginDevice Id="{index}"><PluginDesc><VstPluginInfo Id="0"><PlugName Value="{}" /></VstPluginInfo></PluginDesc></PluginDevice>"#,
                        escape(name)
                    );
                }
            }
        }
        out.push_str("</Devices></DeviceChain></DeviceChain>");

        let _ = write!(out, "</{tag}>");
    }
}

/// Assembles a complete `<Ableton><LiveSet>…</LiveSet></Ableton>` document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionBuilder {
    tracks: Vec<TrackSpec>,
    master: Option<TrackSpec>,
    time_signature: Option<(u32, u32)>,
    scenes: usize,
    locators: Vec<(String, String)>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks are written in the order given; master tracks go after them.
    #[must_use]
    pub fn track(mut self, track: TrackSpec) -> Self {
        if track.kind == TrackKind::Master {
            self.master = Some(track);
        } else {
            self.tracks.push(track);
        }
        self
    }

    /// Adds (or replaces) a master track carrying `tempo`.
    #[must_use]
    pub fn tempo(mut self, tempo: impl Into<String>) -> Self {
        let master = self.master.take().unwrap_or_else(TrackSpec::master);
        self.master = Some(master.tempo(tempo));
        self
    }

    #[must_use]
    pub fn time_signature(mut self, numerator: u32, denominator: u32) -> Self {
        self.time_signature = Some((numerator, denominator));
        if self.master.is_none() {
            self.master = Some(TrackSpec::master());
        }
        self
    }

    #[must_use]
    pub fn scenes(mut self, count: usize) -> Self {
        self.scenes = count;
        self
    }

    #[must_use]
    pub fn locator(mut self, time: impl Into<String>, name: impl Into<String>) -> Self {
        self.locators.push((time.into(), name.into()));
        self
    }

    #[must_use]
    pub fn build(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        out.push_str(r#"<Ableton MajorVersion="5" MinorVersion="11.0_433" Creator="Ableton Live 11.3">"#);
        out.push_str("<LiveSet><Tracks>");
        for (index, track) in self.tracks.iter().enumerate() {
            track.write_xml(&mut out, index, None);
        }
        out.push_str("</Tracks>");
        if let Some(master) = &self.master {
            master.write_xml(&mut out, self.tracks.len(), self.time_signature);
        }

        out.push_str("<Scenes>");
        for index in 0..self.scenes {
            let _ = write!(out, r#"<Scene Id="{index}" />"#);
        }
        out.push_str("</Scenes>");

        out.push_str("<Locators><Locators>");
        for (index, (time, name)) in self.locators.iter().enumerate() {
            let _ = write!(
                out,
                r#"<Locator Id="{index}"><Time Value="{}" /><Name Value="{}" /></Locator>"#,
                escape(time),
                escape(name)
            );
        }
        out.push_str("</Locators></Locators>");

        out.push_str("</LiveSet></Ableton>");
        out
    }

    /// The document gzip-compressed, as it would sit on disk.
    pub fn build_compressed(&self) -> Result<Vec<u8>> {
        gzip_bytes(self.build().as_bytes())
    }
}

pub fn gzip_bytes(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .context("failed to compress session payload")?;
    encoder.finish().context("failed to finish gzip stream")
}

#[must_use]
pub fn demo_session() -> SessionBuilder {
    SessionBuilder::new()
        .tempo("124")
        .time_signature(4, 4)
        .scenes(8)
        .locator("0", "Intro")
        .locator("64", "Drop")
        .track(
            TrackSpec::audio("Drums")
                .volume("0.85")
                .pan("0")
                .device("Eq8")
                .device("Compressor2")
                .clip(ClipSpec::audio("Break 01"))
                .empty_slot()
                .clip(ClipSpec::audio("Break 02")),
        )
        .track(
            TrackSpec::midi("Bass")
                .volume("0.7")
                .pan("-0.1")
                .plugin("Serum")
                .device("Saturator")
                .clip(
                    ClipSpec::midi("Bassline")
                        .note(36, 0.9)
                        .note(43, 0.75)
                        .note(41, 0.8),
                )
                .automation("8842", &["0.2", "0.65", "0.4"]),
        )
        .track(
            TrackSpec::return_track("A-Reverb")
                .volume("0.5")
                .device("Reverb"),
        )
}
