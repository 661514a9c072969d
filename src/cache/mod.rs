//! Local tempo cache.
//!
//! Remembers the tempo tapped for each track across runs so a playlist can be
//! re-sorted without tapping everything again. The store is a flat JSON object
//! keyed by Spotify track ID; each value is the track snapshot plus its `bpm`:
//!
//! ```json
//! {
//!   "4uLU6hMCjMI75M1A2tKUQC": {
//!     "id": "4uLU6hMCjMI75M1A2tKUQC",
//!     "uri": "spotify:track:4uLU6hMCjMI75M1A2tKUQC",
//!     "name": "Never Gonna Give You Up",
//!     "artists": ["Rick Astley"],
//!     "playlist_order": 0,
//!     "bpm": 113.0,
//!     "updated_at": "2026-10-19T12:00:00+00:00"
//!   }
//! }
//! ```
//!
//! The cache is loaded once per run and written once at the end, on every
//! exit path. [`PersistGuard`] makes the second half hold even when the run
//! is dropped half-way.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::Track;

/// Default cache file, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "bpm-checker.json";

/// What to do when a track already has a cached tempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep the cached tempo and don't tap the track again
    Skip,
    /// Overwrite the cached tempo with the new one
    Replace,
    /// Store the mean of the cached and the new tempo
    Average,
}

impl MergePolicy {
    /// Map the numeric menu answer (0 = skip, 1 = replace, 2 = average).
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Skip),
            1 => Some(Self::Replace),
            2 => Some(Self::Average),
            _ => None,
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Skip => "use the known bpm and skip the song",
            Self::Replace => "replace the previously noted bpm",
            Self::Average => "average with the previously noted bpm",
        };
        f.write_str(label)
    }
}

/// One cached tempo with the track snapshot it was tapped for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub playlist_order: usize,
    /// Always present; entries without it are dropped on load
    pub bpm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CacheEntry {
    fn from_track(track: &Track, bpm: f64) -> Self {
        Self {
            id: track.id.clone(),
            uri: track.uri.clone(),
            name: track.name.clone(),
            artists: track.artists.clone(),
            playlist_order: track.playlist_order,
            bpm,
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache file {0} is malformed: {1}")]
    Malformed(PathBuf, String),

    #[error("Failed to read cache file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to serialize cache: {0}")]
    Serialize(serde_json::Error),

    #[error("Failed to write cache to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

/// Track ID -> cached tempo, bound to the file it persists to.
#[derive(Debug, Clone)]
pub struct TempoCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl TempoCache {
    /// Empty cache that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache from `path`.
    ///
    /// A missing, empty or unreadable file yields an empty cache; the run can
    /// always proceed, it just has nothing to recall.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_entries(&path) {
            Ok(entries) => {
                tracing::info!("Loaded {} cached tempos from {:?}", entries.len(), path);
                Self { path, entries }
            }
            Err(e) => {
                tracing::warn!("{}; starting with an empty cache", e);
                Self::new(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached entries ordered by track ID.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// The stored tempo for a track, if any.
    pub fn lookup(&self, id: &str) -> Option<f64> {
        self.entries.get(id).map(|entry| entry.bpm)
    }

    /// Combine a freshly tapped tempo with whatever is cached for `track`.
    ///
    /// Returns the tempo the track should carry afterwards.
    pub fn merge(&mut self, track: &Track, new_tempo: f64, policy: MergePolicy) -> f64 {
        let prior = self.lookup(&track.id);
        let tempo = match (policy, prior) {
            (MergePolicy::Skip, Some(prior)) => return prior,
            (MergePolicy::Average, Some(prior)) => (prior + new_tempo) / 2.0,
            _ => new_tempo,
        };

        tracing::debug!(
            track = %track.id,
            ?policy,
            ?prior,
            stored = tempo,
            "Merged tempo"
        );
        self.entries
            .insert(track.id.clone(), CacheEntry::from_track(track, tempo));
        tempo
    }

    /// Write the full mapping to disk, replacing the previous file.
    pub fn persist(&self) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CacheError::Write(dir.to_path_buf(), e))?;
        }

        let contents = self.to_json()?;

        // Write atomically (write to temp, then rename)
        let temp_path = temp_path_for(&self.path);
        fs::write(&temp_path, contents).map_err(|e| CacheError::Write(temp_path.clone(), e))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| CacheError::Rename(temp_path, self.path.clone(), e))?;

        tracing::info!("Saved {} cached tempos to {:?}", self.entries.len(), self.path);
        Ok(())
    }

    fn to_json(&self) -> Result<String, CacheError> {
        serde_json::to_string_pretty(&self.entries).map_err(CacheError::Serialize)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DEFAULT_CACHE_FILE.into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let contents = fs::read_to_string(path).map_err(|e| CacheError::Read(path.to_path_buf(), e))?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&contents)
        .map_err(|e| CacheError::Malformed(path.to_path_buf(), e.to_string()))?;

    let mut entries = BTreeMap::new();
    for (id, value) in raw {
        match serde_json::from_value::<CacheEntry>(value) {
            Ok(mut entry) => {
                if entry.id.is_empty() {
                    entry.id = id.clone();
                }
                entries.insert(id, entry);
            }
            Err(e) => tracing::debug!("Dropping cache entry {}: {}", id, e),
        }
    }
    Ok(entries)
}

/// Owns the cache for the duration of a run and persists it on the way out.
///
/// Call [`PersistGuard::finish`] on the normal path to see the write result.
/// If the guard is dropped without it (early return, interrupt, panic) the
/// cache is still written and any failure is logged.
pub struct PersistGuard {
    cache: TempoCache,
    persisted: bool,
}

impl PersistGuard {
    pub fn new(cache: TempoCache) -> Self {
        Self {
            cache,
            persisted: false,
        }
    }

    /// Persist now. The cache is never written twice.
    pub fn finish(mut self) -> Result<(), CacheError> {
        self.persisted = true;
        self.cache.persist()
    }
}

impl Deref for PersistGuard {
    type Target = TempoCache;

    fn deref(&self) -> &TempoCache {
        &self.cache
    }
}

impl DerefMut for PersistGuard {
    fn deref_mut(&mut self) -> &mut TempoCache {
        &mut self.cache
    }
}

impl Drop for PersistGuard {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        self.persisted = true;
        if let Err(e) = self.cache.persist() {
            tracing::error!("Failed to save tempo cache on exit: {}", e);
        }
    }
}
