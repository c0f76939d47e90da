//! Snapshot writer: versioned artifacts, the manifest, and retention.
//!
//! Layout of the output directory:
//!   <country>-<unix_seconds>.json   immutable, one per run
//!   <country>.json                  overwritten every run
//!   manifest.json                   country → latest versioned file
//!
//! Every file is written to a temp file in the same directory and renamed
//! into place, so readers never see a partial document. The manifest only
//! ever names files that exist.

use crate::{
    error::{PulseError, PulseResult},
    snapshot::Snapshot,
    types::Country,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub timestamp: DateTime<Utc>,
    /// Lowercase country code → versioned file name.
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

pub struct SnapshotWriter {
    dir: PathBuf,
    retention: usize,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention: retention.max(1),
        }
    }

    /// Write the versioned artifact and refresh the stable one.
    /// Returns the versioned file name (the artifact id).
    pub fn write(
        &self,
        country: Country,
        snapshot: &Snapshot,
        at: DateTime<Utc>,
    ) -> PulseResult<String> {
        fs::create_dir_all(&self.dir).map_err(|e| artifact_error(&self.dir, e))?;
        let json = snapshot.to_json()?;

        let artifact_id = self.free_versioned_name(country, at.timestamp());
        write_atomic(&self.dir.join(&artifact_id), json.as_bytes())?;
        log::info!("country={country} wrote {}", artifact_id);

        let stable = format!("{}.json", country.file_stem());
        write_atomic(&self.dir.join(&stable), json.as_bytes())?;
        log::debug!("country={country} refreshed {stable}");

        Ok(artifact_id)
    }

    /// Versioned artifacts are immutable: a second write in the same
    /// second takes the next free timestamp instead of overwriting.
    fn free_versioned_name(&self, country: Country, mut seconds: i64) -> String {
        loop {
            let name = versioned_name(country, seconds);
            if !self.dir.join(&name).exists() {
                return name;
            }
            seconds += 1;
        }
    }

    pub fn read_manifest(&self) -> PulseResult<Option<Manifest>> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Read-modify-write the manifest: entries for `updated` countries move
    /// to their new artifact, all other entries keep their last-good file.
    /// Entries whose file has disappeared are dropped.
    pub fn write_manifest(
        &self,
        updated: &BTreeMap<Country, String>,
        at: DateTime<Utc>,
    ) -> PulseResult<Manifest> {
        fs::create_dir_all(&self.dir).map_err(|e| artifact_error(&self.dir, e))?;
        let previous = match self.read_manifest() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("previous manifest unreadable, rebuilding: {e}");
                None
            }
        };

        let mut files = previous.map(|m| m.files).unwrap_or_default();
        for (country, artifact_id) in updated {
            files.insert(country.file_stem(), artifact_id.clone());
        }
        files.retain(|country, file| {
            let exists = self.dir.join(file.as_str()).is_file();
            if !exists {
                log::warn!("manifest entry {country} -> {file} points at a missing file, dropped");
            }
            exists
        });

        let manifest = Manifest { timestamp: at, files };
        let json = serde_json::to_string_pretty(&manifest)?;
        write_atomic(&self.dir.join(MANIFEST_FILE), json.as_bytes())?;
        log::info!("manifest updated with {} entries", manifest.files.len());
        Ok(manifest)
    }

    /// Versioned artifacts for `country`, newest first.
    pub fn versions(&self, country: Country) -> PulseResult<Vec<(i64, String)>> {
        let mut found = Vec::new();
        if !self.dir.exists() {
            return Ok(found);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(ts) = parse_versioned_name(country, &name) {
                found.push((ts, name));
            }
        }
        found.sort_by(|a, b| b.cmp(a));
        Ok(found)
    }

    /// Delete all but the newest `retention` versions. Best effort: never
    /// fails, never deletes the file `protected` names.
    pub fn prune(&self, country: Country, protected: Option<&str>) -> PruneReport {
        let mut report = PruneReport::default();
        let versions = match self.versions(country) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("country={country} retention: cannot list artifacts: {e}");
                return report;
            }
        };
        for (idx, (_, name)) in versions.into_iter().enumerate() {
            if idx < self.retention || protected == Some(name.as_str()) {
                report.kept.push(name);
                continue;
            }
            match fs::remove_file(self.dir.join(&name)) {
                Ok(()) => {
                    log::debug!("country={country} retention: deleted {name}");
                    report.deleted.push(name);
                }
                Err(e) => {
                    log::warn!("country={country} retention: failed to delete {name}: {e}");
                    report.failed.push(name);
                }
            }
        }
        report
    }
}

pub fn versioned_name(country: Country, unix_seconds: i64) -> String {
    format!("{}-{unix_seconds}.json", country.file_stem())
}

fn parse_versioned_name(country: Country, name: &str) -> Option<i64> {
    let stem = name.strip_suffix(".json")?;
    let ts = stem.strip_prefix(&format!("{}-", country.file_stem()))?;
    if ts.is_empty() || !ts.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    ts.parse().ok()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> PulseResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.tmp-{}", std::process::id()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        artifact_error(path, e)
    })
}

fn artifact_error(path: &Path, e: std::io::Error) -> PulseError {
    PulseError::ArtifactWrite {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
