use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::AppConfig,
    ledger::{VersionEntry, VersionLedger},
    report::report_for_files,
};

/// Result of one poll of the project folder.
#[derive(Debug, Clone, Default)]
pub struct WatchOutcome {
    pub new_versions: Vec<VersionEntry>,
    pub report: Option<WrittenReport>,
}

impl WatchOutcome {
    #[must_use]
    pub fn found_new(&self) -> bool {
        !self.new_versions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WrittenReport {
    pub old_version: String,
    pub new_version: String,
    pub path: PathBuf,
    pub text: String,
}

pub struct ProjectWatcher {
    ledger: VersionLedger,
    reports_dir: PathBuf,
    interval: Duration,
    include_positional: bool,
}

impl ProjectWatcher {
    #[instrument(skip(config), fields(project = %project_dir.display()))]
    pub fn new(project_dir: &Path, config: &AppConfig) -> Result<Self> {
        if !project_dir.is_dir() {
            anyhow::bail!("project path is not a directory: {}", project_dir.display());
        }

        let ledger = VersionLedger::open(project_dir, &config.ledger)
            .with_context(|| format!("failed to open ledger for {}", project_dir.display()))?;
        let reports_dir = ledger.history_dir().join(&config.watch.reports_dir_name);
        fs::create_dir_all(&reports_dir).with_context(|| {
            format!("failed to create reports directory: {}", reports_dir.display())
        })?;

        Ok(Self {
            ledger,
            reports_dir,
            interval: Duration::from_secs(config.watch.interval_secs.max(1)),
            include_positional: config.report.include_positional,
        })
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    #[must_use]
    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Registers new versions and, once two or more exist, writes a report
    /// comparing the latest pair. A pair whose report is still missing, for
    /// example after a poll that caught a half-written file, is retried on
    /// later polls.
    #[instrument(skip(self), fields(project = %self.ledger.project_dir().display()))]
    pub fn check_once(&mut self) -> Result<WatchOutcome> {
        let new_versions = self
            .ledger
            .register_new_versions()
            .context("failed to register new versions")?;
        for version in &new_versions {
            info!(version = %version.version, timestamp = %version.timestamp, "new version detected");
        }

        let report = match self.ledger.latest_pair() {
            Some((old, new))
                if !new_versions.is_empty() || !self.report_path(old, new).exists() =>
            {
                Some(self.write_report(old, new)?)
            }
            _ => None,
        };
        if new_versions.is_empty() && report.is_none() {
            debug!("no new versions");
        }

        Ok(WatchOutcome {
            new_versions,
            report,
        })
    }

    fn report_path(&self, old: &VersionEntry, new: &VersionEntry) -> PathBuf {
        self.reports_dir
            .join(format!("changes_{}_to_{}.txt", old.version, new.version))
    }

    fn write_report(&self, old: &VersionEntry, new: &VersionEntry) -> Result<WrittenReport> {
        let text = report_for_files(
            &old.file_path,
            &new.file_path,
            Utc::now(),
            self.include_positional,
        )
        .with_context(|| format!("failed to compare {} -> {}", old.version, new.version))?;

        let path = self.report_path(old, new);
        fs::write(&path, &text)
            .with_context(|| format!("failed to write change report: {}", path.display()))?;
        info!(path = %path.display(), "change report saved");

        Ok(WrittenReport {
            old_version: old.version.clone(),
            new_version: new.version.clone(),
            path,
            text,
        })
    }

    /// Polls until `max_polls` checks have run, or forever with `None`.
    /// A failing poll is logged and the loop keeps going.
    pub fn run(&mut self, max_polls: Option<usize>, mut on_outcome: impl FnMut(&WatchOutcome)) {
        info!(
            interval_secs = self.interval.as_secs(),
            reports = %self.reports_dir.display(),
            "watching project"
        );

        let mut polls = 0_usize;
        loop {
            match self.check_once() {
                Ok(outcome) => on_outcome(&outcome),
                Err(error) => warn!(error = %format!("{error:#}"), "watch poll failed"),
            }
            polls += 1;
            if max_polls.is_some_and(|max| polls >= max) {
                break;
            }
            thread::sleep(self.interval);
        }
        debug!(polls, "watcher stopped");
    }
}
