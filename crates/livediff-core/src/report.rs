//! Plain-text rendering of change lists, change reports and track analyses.

use std::{collections::BTreeMap, fmt::Write as _, path::Path};

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::{
    analysis::{SessionSummary, TrackAnalysis, note_name},
    diff::{Change, ChangeReport, DetailValue, compare},
    document::DocumentModel,
    error::FormatError,
};

pub const NO_CHANGES: &str = "No changes detected.";

const WIDE_RULE: usize = 80;
const NARROW_RULE: usize = 50;

fn rule(width: usize) -> String {
    "=".repeat(width)
}

fn thin_rule(width: usize) -> String {
    "-".repeat(width)
}

/// Flat listing of a [`crate::diff::compare`] result, grouped by category.
#[must_use]
pub fn render_change_list(old_label: &str, new_label: &str, changes: &[Change]) -> String {
    if changes.is_empty() {
        return NO_CHANGES.to_string();
    }

    let mut lines = vec![
        "Ableton Session Comparison Report".to_string(),
        rule(NARROW_RULE),
        format!("Old: {old_label}"),
        format!("New: {new_label}"),
        format!("Total changes: {}", changes.len()),
        rule(NARROW_RULE),
        String::new(),
    ];

    let mut by_category: BTreeMap<&str, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        by_category
            .entry(change.category.as_str())
            .or_default()
            .push(change);
    }

    for (category, entries) in by_category {
        lines.push(format!("\n{} CHANGES:", category.to_uppercase()));
        lines.push(thin_rule(NARROW_RULE));
        lines.extend(entries.iter().map(ToString::to_string));
    }

    lines.join("\n")
}

/// Session change report: session facets, then tracks matched by fingerprint.
#[must_use]
pub fn render_change_report(
    old_label: &str,
    new_label: &str,
    generated_at: DateTime<Utc>,
    report: &ChangeReport,
) -> String {
    let mut lines = vec![
        rule(WIDE_RULE),
        "ABLETON SESSION CHANGE REPORT".to_string(),
        rule(WIDE_RULE),
        format!("Old: {old_label}"),
        format!("New: {new_label}"),
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        rule(WIDE_RULE),
        String::new(),
        "SESSION-LEVEL CHANGES:".to_string(),
        thin_rule(WIDE_RULE),
    ];

    for change in &report.session {
        lines.push(format!("  {}", session_line(change)));
    }

    let tracks = &report.tracks;
    if tracks.has_tracks() {
        lines.extend([String::new(), "TRACK CHANGES:".to_string(), thin_rule(WIDE_RULE)]);
    }

    for (changes, heading, marker) in [
        (&tracks.added, "Added Tracks", '+'),
        (&tracks.removed, "Removed Tracks", '-'),
    ] {
        if changes.is_empty() {
            continue;
        }
        lines.push(format!("\n  {heading} ({}):", changes.len()));
        lines.extend(
            changes
                .iter()
                .map(|change| format!("    {marker} {}", detail_text(change, "name"))),
        );
    }

    if !tracks.modified.is_empty() {
        lines.push(format!("\n  Modified Tracks ({}):", tracks.modified.len()));
        for track in &tracks.modified {
            lines.push(format!("    * {}", track.fingerprint.name));
            lines.extend(
                track
                    .changes
                    .iter()
                    .map(|change| format!("        - {}", facet_line(change))),
            );
        }
    }

    lines.extend([String::new(), rule(WIDE_RULE)]);
    lines.join("\n")
}

fn session_line(change: &Change) -> String {
    let facet = change.path.rsplit('/').next().unwrap_or(&change.path);
    let value = detail_text(change, "value");
    match facet {
        "tempo" => format!("Tempo: {value} BPM"),
        "time_signature" => format!("Time Signature: {value}"),
        "track_count" => format!("Track Count: {value}"),
        "scene_count" => format!("Scene Count: {value}"),
        other => format!("{other}: {value}"),
    }
}

fn facet_line(change: &Change) -> String {
    let Some((key, value)) = change.details.iter().find(|(key, _)| key.as_str() != "track") else {
        return change.path.clone();
    };
    let label = match key.as_str() {
        "clip_count" => "clips",
        "automation_lanes" => "automation lanes",
        "midi_notes" => "MIDI notes",
        "pitch_range" => "pitch range",
        other => other,
    };
    format!("{label}: {value}")
}

fn detail_text(change: &Change, key: &str) -> String {
    change
        .detail(key)
        .map_or_else(String::new, DetailValue::to_string)
}

/// Multi-line description of a single track, as shown by `analyze-track`.
#[must_use]
pub fn render_track_analysis(analysis: &TrackAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TRACK: {}", analysis.name);
    let _ = writeln!(out, "{}", thin_rule(WIDE_RULE));
    let _ = writeln!(out, "  Type: {}", analysis.tag);
    match analysis.volume {
        Some(volume) => {
            let _ = writeln!(out, "  Volume: {volume:.2}");
        }
        None => out.push_str("  Volume: N/A\n"),
    }
    match analysis.pan {
        Some(pan) => {
            let _ = writeln!(out, "  Pan: {pan:.2}");
        }
        None => out.push_str("  Pan: N/A\n"),
    }
    if let Some(color) = &analysis.color {
        let _ = writeln!(out, "  Color: {color}");
    }
    if analysis.muted {
        out.push_str("  Muted: yes\n");
    }

    if !analysis.devices.is_empty() {
        let _ = writeln!(out, "\n  Devices ({}):", analysis.devices.len());
        for device in &analysis.devices {
            let _ = writeln!(out, "    - {device}");
        }
    }

    if !analysis.clips.is_empty() {
        let _ = writeln!(out, "\n  Clips ({}):", analysis.clips.len());
        for (index, clip) in analysis.clips.iter().enumerate() {
            let name = if clip.name.is_empty() {
                "(unnamed)"
            } else {
                clip.name.as_str()
            };
            let _ = writeln!(out, "    {}. {name} ({})", index + 1, clip.kind);
            if clip.stats.note_count == 0 {
                continue;
            }
            let _ = writeln!(out, "       Notes: {}", clip.stats.note_count);
            if let Some(range) = clip.stats.pitch_range {
                let _ = writeln!(
                    out,
                    "       Range: {} ({}) to {} ({})",
                    note_name(range.low),
                    range.low,
                    note_name(range.high),
                    range.high
                );
            }
            if clip.stats.velocity_range.is_some() {
                let _ = writeln!(out, "       Avg Velocity: {:.2}", clip.stats.avg_velocity);
            }
        }
    }

    if analysis.midi.total_notes > 0 {
        out.push_str("\n  MIDI Summary:\n");
        let _ = writeln!(out, "    Total Notes: {}", analysis.midi.total_notes);
        let _ = writeln!(out, "    Clips with MIDI: {}", analysis.midi.clips_with_notes);
        if let Some(range) = analysis.midi.pitch_range {
            let _ = writeln!(out, "    Overall Range: {range}");
        }
    }

    if !analysis.automation.is_empty() {
        let _ = writeln!(out, "\n  Automation Lanes ({}):", analysis.automation.len());
        for lane in &analysis.automation {
            let _ = write!(out, "    - {}: {} points", lane.parameter, lane.point_count);
            if let (Some(min), Some(max)) = (lane.min_value, lane.max_value) {
                let _ = write!(out, " (range: {min:.3} to {max:.3})");
            }
            out.push('\n');
        }
    }

    out
}

/// Short session overview used by the `summary` command.
#[must_use]
pub fn render_session_summary(label: &str, summary: &SessionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session: {label}");
    let _ = writeln!(out, "{}", thin_rule(NARROW_RULE));
    match summary.tempo {
        Some(tempo) => {
            let _ = writeln!(out, "  Tempo: {tempo} BPM");
        }
        None => out.push_str("  Tempo: N/A\n"),
    }
    let _ = writeln!(
        out,
        "  Time Signature: {}",
        summary.time_signature.as_deref().unwrap_or("N/A")
    );
    let _ = writeln!(out, "  Tracks: {}", summary.track_count);
    let _ = writeln!(out, "  Scenes: {}", summary.scene_count);
    if !summary.locators.is_empty() {
        let _ = writeln!(out, "  Locators ({}):", summary.locators.len());
        for locator in &summary.locators {
            let _ = writeln!(out, "    - {} @ {}", locator.name, locator.time);
        }
    }
    out
}

/// Label shown for a session file in report headers.
#[must_use]
pub fn file_label(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Loads both files and renders the session change report, optionally
/// followed by the positional change list.
#[instrument(fields(old = %old_path.display(), new = %new_path.display()))]
pub fn report_for_files(
    old_path: &Path,
    new_path: &Path,
    generated_at: DateTime<Utc>,
    include_positional: bool,
) -> Result<String, FormatError> {
    let old = DocumentModel::open(old_path)?;
    let new = DocumentModel::open(new_path)?;
    let (old_label, new_label) = (file_label(old_path), file_label(new_path));

    let mut text = render_change_report(
        &old_label,
        &new_label,
        generated_at,
        &ChangeReport::build(&old, &new),
    );
    if include_positional {
        text.push_str("\n\n");
        text.push_str(&render_change_list(&old_label, &new_label, &compare(&old, &new)));
    }
    Ok(text)
}
