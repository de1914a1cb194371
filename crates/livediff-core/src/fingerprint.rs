//! Content-derived track identity.
//!
//! A fingerprint is the pair (track name, ordered device identifiers). It
//! deliberately ignores mixer state, clips and automation, so two tracks that
//! share a name and a device chain are the same entity as far as
//! fingerprint matching is concerned.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Track;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackFingerprint {
    pub name: String,
    pub devices: Vec<String>,
}

impl TrackFingerprint {
    #[must_use]
    pub fn new(name: impl Into<String>, devices: Vec<String>) -> Self {
        Self {
            name: name.into(),
            devices,
        }
    }
}

/// Renders `name::device,device`. Only used for display; identity is the
/// structured pair, so delimiters inside names cannot alias two tracks.
impl fmt::Display for TrackFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.name, self.devices.join(","))
    }
}

#[must_use]
pub fn fingerprint(track: &Track<'_>) -> TrackFingerprint {
    track.fingerprint()
}
