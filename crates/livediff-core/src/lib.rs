pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod fixtures;
pub mod ledger;
pub mod node;
pub mod report;
pub mod watch;

pub use analysis::{
    ClipStats, ClipSummary, LaneStats, PitchRange, SessionSummary, TrackAnalysis, TrackStats,
    VelocityRange, analyze, analyze_automation, analyze_clip, analyze_track, inspect_track,
    note_name,
};
pub use config::AppConfig;
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options,
};
pub use diff::{
    Change, ChangeCategory, ChangeReport, ChangeType, DetailValue, FingerprintDiff, TrackKey,
    TrackModification, compare, diff_sessions, diff_tracks, diff_tracks_by_fingerprint,
    fingerprint_diff,
};
pub use document::{
    AutomationEnvelope, Clip, ClipKind, DEFAULT_TRACK_NAME, Device, DocumentModel, Locator, Note,
    ScalarParam, Track, TrackKind,
};
pub use error::{FormatError, LedgerError};
pub use fingerprint::{TrackFingerprint, fingerprint};
pub use ledger::{VersionEntry, VersionLedger};
pub use node::{DocumentNode, MAX_NESTING_DEPTH, NodePath, parse_xml};
pub use watch::{ProjectWatcher, WatchOutcome, WrittenReport};
