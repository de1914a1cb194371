use livediff_core::{
    Change, ChangeCategory, ChangeReport, ChangeType, DetailValue, DocumentModel, compare,
    diff_tracks_by_fingerprint, fingerprint_diff,
    fixtures::{ClipSpec, SessionBuilder, TrackSpec, demo_session},
};
use pretty_assertions::assert_eq;

fn load(builder: &SessionBuilder) -> DocumentModel {
    DocumentModel::from_xml(&builder.build()).expect("fixture session should parse")
}

fn text(value: &str) -> DetailValue {
    DetailValue::Text(value.to_string())
}

fn drums_and_bass() -> SessionBuilder {
    SessionBuilder::new()
        .track(TrackSpec::audio("Drums").volume("0.8").device("Eq8"))
        .track(TrackSpec::midi("Bass").volume("0.7").plugin("Serum"))
}

#[test]
fn adding_a_track_yields_exactly_one_added_change() {
    let old = load(&drums_and_bass());
    let new = load(&drums_and_bass().track(TrackSpec::midi("Lead")));

    let changes = compare(&old, &new);

    assert_eq!(changes.len(), 1, "unexpected changes: {changes:#?}");
    let change = &changes[0];
    assert_eq!(change.change_type, ChangeType::Added);
    assert_eq!(change.category, ChangeCategory::Track);
    assert_eq!(change.path, "Track[2]");
    assert_eq!(change.detail("name"), Some(&text("Lead")));
    assert_eq!(change.detail("type"), Some(&text("MidiTrack")));
}

#[test]
fn volume_change_yields_exactly_one_parameter_change() {
    let old = load(&SessionBuilder::new().track(TrackSpec::audio("Drums").volume("0.8")));
    let new = load(&SessionBuilder::new().track(TrackSpec::audio("Drums").volume("0.9")));

    let changes = compare(&old, &new);

    assert_eq!(
        changes,
        vec![
            Change::modified(ChangeCategory::Parameter, "Track[0]:Drums/volume")
                .with_detail("value", "0.8 -> 0.9")
        ]
    );
}

#[test]
fn parameter_equality_is_exact_and_numeric() {
    let old = load(&SessionBuilder::new().track(TrackSpec::audio("Pad").volume("0.5").pan("0")));
    let same_number = load(&SessionBuilder::new().track(TrackSpec::audio("Pad").volume("0.50").pan("0.0")));
    assert!(compare(&old, &same_number).is_empty(), "equal numbers are not changes");

    let last_digit = load(
        &SessionBuilder::new().track(TrackSpec::audio("Pad").volume("0.5000000000000001").pan("0")),
    );
    let changes = compare(&old, &last_digit);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, "Track[0]:Pad/volume");
}

#[test]
fn unparsable_parameters_compare_as_raw_text() {
    let old = load(&SessionBuilder::new().track(TrackSpec::audio("Pad").pan("left")));
    let new = load(&SessionBuilder::new().track(TrackSpec::audio("Pad").pan("right")));
    let changes = compare(&old, &new);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].detail("value"), Some(&text("left -> right")));
}

#[test]
fn several_differing_facets_yield_one_change_each_in_fixed_order() {
    let old = load(
        &SessionBuilder::new().track(
            TrackSpec::midi("Keys")
                .volume("0.5")
                .pan("0")
                .tempo("120")
                .device("Eq8"),
        ),
    );
    let new = load(
        &SessionBuilder::new().track(
            TrackSpec::midi("Keys")
                .volume("0.6")
                .pan("0.2")
                .tempo("128")
                .device("Eq8")
                .device("Reverb")
                .clip(ClipSpec::midi("Chords")),
        ),
    );

    let changes = compare(&old, &new);
    let summary: Vec<(ChangeCategory, &str, Option<&DetailValue>)> = changes
        .iter()
        .map(|change| {
            let detail = change.details.values().next();
            (change.category.clone(), change.path.as_str(), detail)
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            (ChangeCategory::Track, "Track[0]:Keys", Some(&text("1 -> 2"))),
            (ChangeCategory::Track, "Track[0]:Keys", Some(&text("0 -> 1"))),
            (ChangeCategory::Parameter, "Track[0]:Keys/volume", Some(&text("0.5 -> 0.6"))),
            (ChangeCategory::Parameter, "Track[0]:Keys/pan", Some(&text("0 -> 0.2"))),
            (ChangeCategory::Parameter, "Track[0]:Keys/tempo", Some(&text("120 -> 128"))),
        ]
    );
    assert!(changes[0].detail("device_count").is_some());
    assert!(changes[1].detail("clip_count").is_some());
}

#[test]
fn parameters_missing_on_one_side_are_not_compared_positionally() {
    let old = load(&SessionBuilder::new().track(TrackSpec::audio("Vox").volume("0.8")));
    let new = load(&SessionBuilder::new().track(TrackSpec::audio("Vox")));
    assert!(compare(&old, &new).is_empty());
}

#[test]
fn emission_order_is_added_then_removed_then_modified() {
    let old = load(
        &SessionBuilder::new()
            .track(TrackSpec::audio("Drums").volume("0.8"))
            .track(TrackSpec::audio("Perc")),
    );
    let new = load(
        &SessionBuilder::new()
            .track(TrackSpec::audio("Drums").volume("0.9"))
            .track(TrackSpec::audio("Shaker"))
            .track(TrackSpec::audio("Claps")),
    );

    let lines: Vec<String> = compare(&old, &new).iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "+ Added track: Track[1] (name=Shaker, type=AudioTrack)".to_string(),
            "+ Added track: Track[2] (name=Claps, type=AudioTrack)".to_string(),
            "- Removed track: Track[1] (name=Perc, type=AudioTrack)".to_string(),
            "* Modified parameter: Track[0]:Drums/volume (value=0.8 -> 0.9)".to_string(),
        ]
    );
}

#[test]
fn renamed_track_differs_between_positional_and_fingerprint_views() {
    let old = load(&SessionBuilder::new().track(TrackSpec::midi("Lead").plugin("Serum")));
    let new = load(&SessionBuilder::new().track(TrackSpec::midi("Lead 2").plugin("Serum")));

    let positional = compare(&old, &new);
    let kinds: Vec<ChangeType> = positional.iter().map(|change| change.change_type).collect();
    assert_eq!(kinds, vec![ChangeType::Added, ChangeType::Removed]);
    assert!(positional.iter().all(|change| change.path == "Track[0]"));

    let by_fingerprint = diff_tracks_by_fingerprint(&old, &new);
    let paths: Vec<(ChangeType, &str)> = by_fingerprint
        .iter()
        .map(|change| (change.change_type, change.path.as_str()))
        .collect();
    assert_eq!(
        paths,
        vec![
            (ChangeType::Added, "Track{Lead 2::Serum}"),
            (ChangeType::Removed, "Track{Lead::Serum}"),
        ]
    );
}

#[test]
fn reordered_tracks_match_by_fingerprint_but_not_by_position() {
    let old = load(
        &SessionBuilder::new()
            .track(TrackSpec::audio("Drums").device("Eq8"))
            .track(TrackSpec::audio("Vox").device("Compressor2")),
    );
    let new = load(
        &SessionBuilder::new()
            .track(TrackSpec::audio("Vox").device("Compressor2"))
            .track(TrackSpec::audio("Drums").device("Eq8")),
    );

    assert!(diff_tracks_by_fingerprint(&old, &new).is_empty());
    let positional = compare(&old, &new);
    assert_eq!(
        positional
            .iter()
            .filter(|change| change.change_type == ChangeType::Added)
            .count(),
        2
    );
}

#[test]
fn fingerprint_diff_reports_musical_facets() {
    let old = load(
        &SessionBuilder::new().track(
            TrackSpec::midi("Bass")
                .volume("0.7")
                .plugin("Serum")
                .clip(ClipSpec::midi("Line").note(36, 0.9).note(43, 0.8)),
        ),
    );
    let new = load(
        &SessionBuilder::new().track(
            TrackSpec::midi("Bass")
                .volume("0.75")
                .plugin("Serum")
                .clip(ClipSpec::midi("Line").note(36, 0.9).note(43, 0.8).note(48, 0.7))
                .clip(ClipSpec::midi("Fill").note(31, 1.0))
                .automation("9001", &["0.1", "0.2"]),
        ),
    );

    let changes = diff_tracks_by_fingerprint(&old, &new);
    let facets: Vec<(&str, String)> = changes
        .iter()
        .map(|change| {
            let (key, value) = change
                .details
                .iter()
                .find(|(key, _)| key.as_str() != "track")
                .expect("every facet change carries a value");
            (key.as_str(), value.to_string())
        })
        .collect();

    assert_eq!(
        facets,
        vec![
            ("volume", "0.70 -> 0.75".to_string()),
            ("clip_count", "1 -> 2".to_string()),
            ("automation_lanes", "0 -> 1".to_string()),
            ("midi_notes", "2 -> 4".to_string()),
            ("pitch_range", "G0 to C2".to_string()),
        ]
    );
    assert!(
        changes
            .iter()
            .all(|change| change.detail("track") == Some(&text("Bass")))
    );
    assert_eq!(changes[0].path, "Track{Bass::Serum}/volume");
}

#[test]
fn non_numeric_mixer_values_keep_their_text() {
    let old = load(&SessionBuilder::new().track(TrackSpec::audio("Vox").pan("left")));
    let new = load(&SessionBuilder::new().track(TrackSpec::audio("Vox").pan("0.25")));
    let changes = diff_tracks_by_fingerprint(&old, &new);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].detail("pan"), Some(&text("left -> 0.25")));
}

#[test]
fn modified_tracks_stay_apart_when_fingerprints_render_alike() {
    let session = |joined: &str, split: &str| {
        load(
            &SessionBuilder::new()
                .track(TrackSpec::audio("Synth").volume(joined).plugin("a,b"))
                .track(TrackSpec::audio("Synth").volume(split).plugin("a").plugin("b")),
        )
    };
    let diff = fingerprint_diff(&session("0.5", "0.5"), &session("0.6", "0.7"));

    assert_eq!(diff.shared, 2);
    assert_eq!(diff.modified.len(), 2);
    let devices: Vec<Vec<String>> = diff
        .modified
        .iter()
        .map(|track| track.fingerprint.devices.clone())
        .collect();
    assert_eq!(
        devices,
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["a,b".to_string()],
        ]
    );
    assert_eq!(diff.modified[0].changes[0].detail("volume"), Some(&text("0.50 -> 0.70")));
    assert_eq!(diff.modified[1].changes[0].detail("volume"), Some(&text("0.50 -> 0.60")));
}

#[test]
fn fingerprint_diff_reports_parameter_appearing_on_one_side() {
    let old = load(&SessionBuilder::new().track(TrackSpec::audio("Vox")));
    let new = load(&SessionBuilder::new().track(TrackSpec::audio("Vox").pan("0.3")));
    let changes = diff_tracks_by_fingerprint(&old, &new);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].detail("pan"), Some(&text("none -> 0.30")));
}

#[test]
fn pitch_range_change_is_omitted_when_new_range_is_absent() {
    let old = load(
        &SessionBuilder::new()
            .track(TrackSpec::midi("Keys").clip(ClipSpec::midi("A").note(60, 0.5))),
    );
    let new = load(&SessionBuilder::new().track(TrackSpec::midi("Keys").clip(ClipSpec::midi("A"))));

    let changes = diff_tracks_by_fingerprint(&old, &new);
    let keys: Vec<&str> = changes
        .iter()
        .flat_map(|change| change.details.keys())
        .map(String::as_str)
        .filter(|key| *key != "track")
        .collect();
    assert_eq!(keys, vec!["midi_notes"]);
}

#[test]
fn master_track_is_not_fingerprinted() {
    let old = load(&SessionBuilder::new().tempo("120"));
    let new = load(&SessionBuilder::new().tempo("128"));
    assert!(diff_tracks_by_fingerprint(&old, &new).is_empty());
    assert_eq!(compare(&old, &new).len(), 1, "positional diff still sees the master tempo");
}

#[test]
fn fingerprint_collisions_keep_the_last_track() {
    let document = load(
        &SessionBuilder::new()
            .track(TrackSpec::audio("Twin").volume("0.1"))
            .track(TrackSpec::audio("Twin").volume("0.9")),
    );
    let tracks = document.tracks_by_fingerprint();
    assert_eq!(tracks.len(), 1);
    let survivor = tracks.values().next().expect("one track should remain");
    assert_eq!(survivor.volume().map(|param| param.raw), Some("0.9"));
}

#[test]
fn change_report_combines_session_and_fingerprint_changes() {
    let old = load(&demo_session());
    let new = load(
        &demo_session()
            .tempo("128")
            .scenes(9)
            .track(TrackSpec::midi("Lead").plugin("Serum")),
    );

    let report = ChangeReport::build(&old, &new);
    let session: Vec<String> = report.session.iter().map(ToString::to_string).collect();
    assert_eq!(
        session,
        vec![
            "* Modified session: Session/tempo (value=124.0 -> 128.0)".to_string(),
            "* Modified session: Session/track_count (value=3 -> 4)".to_string(),
            "* Modified session: Session/scene_count (value=8 -> 9)".to_string(),
        ]
    );
    assert_eq!(report.tracks.added.len(), 1);
    assert_eq!(report.tracks.added[0].change_type, ChangeType::Added);
    assert_eq!(report.tracks.added[0].detail("name"), Some(&text("Lead")));
    assert!(report.tracks.removed.is_empty());
    assert!(report.tracks.modified.is_empty());
    assert_eq!(report.tracks.shared, 3);
    assert!(!report.is_empty());

    assert!(ChangeReport::build(&old, &old).is_empty());
}
