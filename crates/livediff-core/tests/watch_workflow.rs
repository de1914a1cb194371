use std::{
    fs::{self, File},
    path::Path,
    time::{Duration, SystemTime},
};

use livediff_core::{
    AppConfig, ProjectWatcher,
    fixtures::{SessionBuilder, TrackSpec, demo_session},
};

fn write_session(dir: &Path, file_name: &str, session: &SessionBuilder, minutes_ago: u64) {
    let path = dir.join(file_name);
    let payload = session
        .build_compressed()
        .expect("compressing the session should work");
    fs::write(&path, payload).expect("writing session file should work");
    let modified = SystemTime::now() - Duration::from_secs(minutes_ago * 60);
    File::options()
        .write(true)
        .open(&path)
        .and_then(|file| file.set_modified(modified))
        .expect("setting mtime should work");
}

#[test]
fn first_version_registers_without_a_report() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    write_session(temp.path(), "Song_1.0.0.als", &demo_session(), 10);

    let mut watcher =
        ProjectWatcher::new(temp.path(), &AppConfig::default()).expect("watcher should start");
    let outcome = watcher.check_once().expect("check should succeed");

    assert!(outcome.found_new());
    assert!(outcome.report.is_none());
    assert!(watcher.reports_dir().is_dir());
}

#[test]
fn new_version_produces_a_report_file() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    write_session(temp.path(), "Song_1.0.0.als", &demo_session(), 30);

    let mut watcher =
        ProjectWatcher::new(temp.path(), &AppConfig::default()).expect("watcher should start");
    watcher.check_once().expect("initial check should succeed");

    let idle = watcher.check_once().expect("idle check should succeed");
    assert!(!idle.found_new());

    write_session(
        temp.path(),
        "Song_1.1.0.als",
        &demo_session().tempo("130").track(TrackSpec::midi("Lead")),
        5,
    );
    let outcome = watcher.check_once().expect("check should succeed");

    let report = outcome.report.expect("two versions should produce a report");
    assert_eq!(report.old_version, "1.0.0");
    assert_eq!(report.new_version, "1.1.0");
    assert_eq!(
        report.path,
        watcher.reports_dir().join("changes_1.0.0_to_1.1.0.txt")
    );
    let written = fs::read_to_string(&report.path).expect("report file should exist");
    assert_eq!(written, report.text);
    assert!(written.contains("Tempo: 124.0 -> 130.0 BPM"));
    assert!(written.contains("    + Lead"));
}

#[test]
fn positional_list_is_appended_when_configured() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    write_session(temp.path(), "Song_1.0.0.als", &demo_session(), 30);
    write_session(
        temp.path(),
        "Song_1.0.1.als",
        &demo_session().track(TrackSpec::audio("Drums").volume("0.85")),
        5,
    );

    let mut config = AppConfig::default();
    config.report.include_positional = true;
    let mut watcher = ProjectWatcher::new(temp.path(), &config).expect("watcher should start");

    let mut seen = Vec::new();
    watcher.run(Some(1), |outcome| seen.push(outcome.clone()));

    assert_eq!(seen.len(), 1);
    let report = seen[0].report.as_ref().expect("report should be written");
    assert!(report.text.contains("Ableton Session Comparison Report"));
}

#[test]
fn report_is_retried_after_a_half_written_version() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    write_session(temp.path(), "Song_1.0.0.als", &demo_session(), 30);

    let mut watcher =
        ProjectWatcher::new(temp.path(), &AppConfig::default()).expect("watcher should start");
    watcher.check_once().expect("initial check should succeed");

    let complete = demo_session()
        .track(TrackSpec::midi("Lead"))
        .build_compressed()
        .expect("compressing the session should work");
    let partial_path = temp.path().join("Song_1.1.0.als");
    fs::write(&partial_path, &complete[..complete.len() / 2])
        .expect("writing partial session should work");
    assert!(
        watcher.check_once().is_err(),
        "a truncated session cannot be compared yet"
    );
    assert_eq!(
        fs::read_dir(watcher.reports_dir())
            .expect("reports dir should be readable")
            .count(),
        0
    );

    write_session(
        temp.path(),
        "Song_1.1.0.als",
        &demo_session().track(TrackSpec::midi("Lead")),
        1,
    );
    let outcome = watcher.check_once().expect("retry should succeed");

    assert!(!outcome.found_new(), "1.1.0 was registered by the failed poll");
    let report = outcome.report.expect("the missing report should be written");
    assert_eq!(report.new_version, "1.1.0");
    assert!(report.path.is_file());
    assert!(report.text.contains("    + Lead"));

    let idle = watcher.check_once().expect("idle check should succeed");
    assert!(idle.report.is_none(), "an existing report is not rewritten");
}

#[test]
fn watcher_rejects_missing_project_directory() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let missing = temp.path().join("nowhere");
    assert!(ProjectWatcher::new(&missing, &AppConfig::default()).is_err());
}
