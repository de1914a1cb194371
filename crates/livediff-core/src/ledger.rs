//! On-disk ledger of versioned session files inside a project folder.
//!
//! Versions are discovered by file name (`Song_1.2.0.als`) and recorded in
//! `<project>/_history/versions.json`. The ledger never looks inside a
//! session file beyond hashing its bytes.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::{config::LedgerConfig, error::LedgerError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionEntry {
    pub version: String,
    #[serde(rename = "filepath")]
    pub file_path: PathBuf,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    project: String,
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug)]
pub struct VersionLedger {
    project_dir: PathBuf,
    history_dir: PathBuf,
    ledger_path: PathBuf,
    pattern: Regex,
    versions: Vec<VersionEntry>,
}

impl VersionLedger {
    /// Opens the ledger of `project_dir`, creating its history directory.
    #[instrument(skip(config), fields(project = %project_dir.display()))]
    pub fn open(project_dir: &Path, config: &LedgerConfig) -> Result<Self, LedgerError> {
        let pattern = Regex::new(&config.version_pattern).map_err(|source| LedgerError::Pattern {
            pattern: config.version_pattern.clone(),
            source,
        })?;

        let history_dir = project_dir.join(&config.history_dir_name);
        fs::create_dir_all(&history_dir).map_err(|source| LedgerError::Io {
            path: history_dir.clone(),
            source,
        })?;

        let ledger_path = history_dir.join(&config.ledger_file_name);
        let mut versions = if ledger_path.is_file() {
            let content = fs::read(&ledger_path).map_err(|source| LedgerError::Io {
                path: ledger_path.clone(),
                source,
            })?;
            let file: LedgerFile =
                serde_json::from_slice(&content).map_err(|source| LedgerError::Json {
                    path: ledger_path.clone(),
                    source,
                })?;
            file.versions
        } else {
            Vec::new()
        };
        versions.sort_by_key(|entry| entry.timestamp);

        debug!(known = versions.len(), "ledger opened");
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            history_dir,
            ledger_path,
            pattern,
            versions,
        })
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    #[must_use]
    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    #[must_use]
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    #[must_use]
    pub fn versions(&self) -> &[VersionEntry] {
        &self.versions
    }

    #[must_use]
    pub fn is_known(&self, version: &str) -> bool {
        self.versions.iter().any(|entry| entry.version == version)
    }

    /// Versioned session files in the project folder that the ledger does
    /// not know about yet. Subdirectories are not searched.
    #[instrument(skip(self), fields(project = %self.project_dir.display()))]
    pub fn scan_for_versions(&self) -> Result<Vec<VersionEntry>, LedgerError> {
        let mut found: Vec<VersionEntry> = Vec::new();

        let walker = WalkDir::new(&self.project_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(?error, "ignoring unreadable entry while scanning project");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(version) = self
                .pattern
                .captures(file_name)
                .and_then(|captures| captures.get(1))
                .map(|group| group.as_str().to_string())
            else {
                continue;
            };
            if self.is_known(&version) || found.iter().any(|entry| entry.version == version) {
                continue;
            }

            found.push(self.describe(entry.path(), version)?);
        }

        debug!(count = found.len(), "version scan complete");
        Ok(found)
    }

    fn describe(&self, path: &Path, version: String) -> Result<VersionEntry, LedgerError> {
        let io_error = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };
        let modified = fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(io_error)?;
        let bytes = fs::read(path).map_err(io_error)?;
        let digest = Sha256::digest(&bytes);

        Ok(VersionEntry {
            version,
            file_path: path.to_path_buf(),
            timestamp: DateTime::<Utc>::from(modified),
            metadata: self.sidecar_metadata(path),
            content_hash: Some(format!("{digest:x}")),
        })
    }

    /// `Song_1.0.0.json` next to the session, or the ` Song_1.0.0.json`
    /// variant with a leading space. Unreadable sidecars yield no metadata.
    fn sidecar_metadata(&self, session_path: &Path) -> Map<String, Value> {
        let Some(stem) = session_path.file_stem().and_then(|stem| stem.to_str()) else {
            return Map::new();
        };
        let candidates = [
            session_path.with_extension("json"),
            self.project_dir.join(format!(" {stem}.json")),
        ];
        let Some(sidecar) = candidates.iter().find(|path| path.is_file()) else {
            return Map::new();
        };

        let parsed = fs::read(sidecar)
            .map_err(|error| error.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<Value>(&bytes).map_err(|error| error.to_string())
            });
        match parsed {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %sidecar.display(), "sidecar metadata is not a json object");
                Map::new()
            }
            Err(error) => {
                warn!(path = %sidecar.display(), %error, "ignoring unreadable sidecar metadata");
                Map::new()
            }
        }
    }

    /// Scans, records and persists any new versions; returns only the new ones.
    #[instrument(skip(self), fields(project = %self.project_dir.display()))]
    pub fn register_new_versions(&mut self) -> Result<Vec<VersionEntry>, LedgerError> {
        let new_versions = self.scan_for_versions()?;
        if new_versions.is_empty() {
            return Ok(new_versions);
        }

        self.versions.extend(new_versions.iter().cloned());
        self.versions.sort_by_key(|entry| entry.timestamp);
        self.save()?;

        info!(
            added = new_versions.len(),
            total = self.versions.len(),
            "registered new versions"
        );
        Ok(new_versions)
    }

    /// Writes the ledger through a temp file in the history directory.
    pub fn save(&self) -> Result<(), LedgerError> {
        let file = LedgerFile {
            project: self.project_dir.display().to_string(),
            versions: self.versions.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| LedgerError::Json {
            path: self.ledger_path.clone(),
            source,
        })?;

        let io_error = |source| LedgerError::Io {
            path: self.ledger_path.clone(),
            source,
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(&self.history_dir).map_err(io_error)?;
        temp_file.write_all(&json).map_err(io_error)?;
        temp_file
            .persist(&self.ledger_path)
            .map_err(|error| LedgerError::Persist {
                path: self.ledger_path.clone(),
                message: error.error.to_string(),
            })?;

        debug!(path = %self.ledger_path.display(), "ledger saved");
        Ok(())
    }

    #[must_use]
    pub fn sorted_versions(&self) -> Vec<&VersionEntry> {
        let mut sorted: Vec<&VersionEntry> = self.versions.iter().collect();
        sorted.sort_by_key(|entry| entry.timestamp);
        sorted
    }

    /// Consecutive `(older, newer)` pairs in timestamp order.
    #[must_use]
    pub fn version_pairs(&self) -> Vec<(&VersionEntry, &VersionEntry)> {
        let sorted = self.sorted_versions();
        sorted
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.sorted_versions().last().copied()
    }

    /// The two most recent versions, oldest first.
    #[must_use]
    pub fn latest_pair(&self) -> Option<(&VersionEntry, &VersionEntry)> {
        self.version_pairs().last().copied()
    }
}

/// RFC 3339 on write; also reads offset-less timestamps as UTC.
mod timestamp_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(D::Error::custom)
    }
}
