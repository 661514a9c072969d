//! Reorder a playlist by tempo.
//!
//! Spotify has no "set order" call for large playlists, so the new order is
//! committed by removing every track and appending them again in sorted
//! order. Each item's "date added" is reset as a consequence.
//!
//! Between the first removal and the last add the playlist is missing
//! tracks. Failed adds are retried; tracks that still could not be put back
//! are reported in [`CommitError::Incomplete`] and can be written to a
//! [`PendingTracks`] file for [`restore_pending`].

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{PlaylistSelection, Track};
use crate::spotify::{PlaylistProvider, ProviderError};

/// Most items a single playlist modification call accepts.
pub const MAX_BATCH: usize = 100;

/// Tries per add batch before giving up on it
const ADD_ATTEMPTS: u32 = 4;
/// Wait before the second try; grows linearly with each retry
const ADD_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Stable ascending sort by tempo; tracks without a tempo go last.
pub fn sort_by_tempo(tracks: &mut [Track]) {
    tracks.sort_by(|a, b| compare_tempo(a.bpm, b.bpm));
}

fn compare_tempo(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Summary of a committed reorder.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub removed_batches: usize,
    pub added_batches: usize,
    pub tracks: usize,
    /// Snapshot after the last call
    pub snapshot_id: String,
}

/// Why a reorder did not go through.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommitError {
    /// Every track is still in the playlist; the order may be unchanged or
    /// partly moved to the end
    #[error("{0}")]
    Intact(ProviderError),

    /// Tracks were removed and could not all be put back
    #[error("{} tracks could not be put back into the playlist: {source}", missing.len())]
    Incomplete {
        /// URIs still missing, in the order they should be appended
        missing: Vec<String>,
        source: ProviderError,
    },
}

/// Write `tracks`' order to the playlist.
///
/// The first removal is scoped to the snapshot captured at selection time;
/// every later call chains on the snapshot the previous one returned. If a
/// later removal fails, the tracks already taken out are appended again.
pub async fn commit_order<P>(
    provider: &P,
    selection: &PlaylistSelection,
    tracks: &[Track],
) -> Result<CommitReport, CommitError>
where
    P: PlaylistProvider + ?Sized,
{
    let uris: Vec<String> = tracks.iter().map(|t| t.uri.clone()).collect();
    let unique = unique_in_order(&uris);

    let mut snapshot_id = selection.snapshot_id.clone();
    let mut removed = 0;
    let mut removed_batches = 0;
    for batch in unique.chunks(MAX_BATCH) {
        match provider
            .remove_tracks(&selection.playlist_id, batch, &snapshot_id)
            .await
        {
            Ok(next) => {
                snapshot_id = next;
                removed += batch.len();
                removed_batches += 1;
            }
            Err(e) if removed == 0 => return Err(CommitError::Intact(e)),
            Err(e) => {
                tracing::warn!(
                    "Removal failed after {} of {} tracks, putting them back: {}",
                    removed,
                    unique.len(),
                    e
                );
                let taken: HashSet<&str> = unique[..removed].iter().map(String::as_str).collect();
                let put_back: Vec<String> = uris
                    .iter()
                    .filter(|uri| taken.contains(uri.as_str()))
                    .cloned()
                    .collect();
                add_all(provider, &selection.playlist_id, &put_back).await?;
                return Err(CommitError::Intact(e));
            }
        }
    }

    let (added_batches, last_snapshot) = add_all(provider, &selection.playlist_id, &uris).await?;

    tracing::info!(
        "Reordered playlist {} ({} tracks, {} remove / {} add calls)",
        selection.playlist_id,
        uris.len(),
        removed_batches,
        added_batches
    );

    Ok(CommitReport {
        removed_batches,
        added_batches,
        tracks: uris.len(),
        snapshot_id: last_snapshot.unwrap_or(snapshot_id),
    })
}

/// Append `pending` to its playlist again.
pub async fn restore_pending<P>(provider: &P, pending: &PendingTracks) -> Result<usize, CommitError>
where
    P: PlaylistProvider + ?Sized,
{
    add_all(provider, &pending.playlist_id, &pending.uris).await?;
    tracing::info!(
        "Put {} tracks back into playlist {}",
        pending.uris.len(),
        pending.playlist_id
    );
    Ok(pending.uris.len())
}

/// Append `uris` in batches. Returns the batch count and the last snapshot.
async fn add_all<P>(
    provider: &P,
    playlist_id: &str,
    uris: &[String],
) -> Result<(usize, Option<String>), CommitError>
where
    P: PlaylistProvider + ?Sized,
{
    let mut snapshot_id = None;
    let mut batches = 0;
    for (index, batch) in uris.chunks(MAX_BATCH).enumerate() {
        match add_with_retry(provider, playlist_id, batch).await {
            Ok(next) => {
                snapshot_id = Some(next);
                batches += 1;
            }
            Err(source) => {
                let missing = uris[index * MAX_BATCH..].to_vec();
                tracing::error!(
                    "Could not put {} tracks back into playlist {}: {}",
                    missing.len(),
                    playlist_id,
                    source
                );
                return Err(CommitError::Incomplete { missing, source });
            }
        }
    }
    Ok((batches, snapshot_id))
}

async fn add_with_retry<P>(
    provider: &P,
    playlist_id: &str,
    batch: &[String],
) -> Result<String, ProviderError>
where
    P: PlaylistProvider + ?Sized,
{
    let mut attempt = 1;
    loop {
        match provider.add_tracks(playlist_id, batch).await {
            Ok(snapshot_id) => return Ok(snapshot_id),
            Err(e) if attempt < ADD_ATTEMPTS => {
                let wait = ADD_RETRY_DELAY * attempt;
                tracing::warn!("Adding tracks failed ({}), retrying in {:?}", e, wait);
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Removal by URI already drops every occurrence, so each URI is sent once.
fn unique_in_order(uris: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    uris.iter()
        .filter(|uri| seen.insert(uri.as_str()))
        .cloned()
        .collect()
}

/// Tracks taken out of a playlist that still have to be put back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTracks {
    pub playlist_id: String,
    pub playlist_name: String,
    pub uris: Vec<String>,
}

impl PendingTracks {
    pub fn new(selection: &PlaylistSelection, uris: Vec<String>) -> Self {
        Self {
            playlist_id: selection.playlist_id.clone(),
            playlist_name: selection.name.clone(),
            uris,
        }
    }

    /// Where pending tracks are kept for a given tempo cache file.
    pub fn path_for(cache_path: &Path) -> PathBuf {
        cache_path.with_extension("pending.json")
    }

    /// Read a pending file. `None` when there is none.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, contents)
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_utils::mock_track;
    use proptest::prelude::*;

    fn tempos() -> impl Strategy<Value = Vec<Option<u32>>> {
        prop::collection::vec(proptest::option::of(40u32..220), 0..60)
    }

    proptest! {
        /// Sorting keeps the same tracks, orders tempos, and puts unknowns last
        #[test]
        fn sort_is_ordered_permutation(tempos in tempos()) {
            let original: Vec<Track> = tempos
                .iter()
                .enumerate()
                .map(|(i, bpm)| Track {
                    bpm: bpm.map(f64::from),
                    ..mock_track(&format!("t{}", i), i)
                })
                .collect();
            let mut sorted = original.clone();
            sort_by_tempo(&mut sorted);

            let mut before: Vec<&str> = original.iter().map(|t| t.id.as_str()).collect();
            let mut after: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
            before.sort();
            after.sort();
            prop_assert_eq!(before, after);

            for pair in sorted.windows(2) {
                match (pair[0].bpm, pair[1].bpm) {
                    (Some(a), Some(b)) => {
                        prop_assert!(a <= b);
                        if a == b {
                            // Stable: original relative order kept
                            prop_assert!(pair[0].playlist_order < pair[1].playlist_order);
                        }
                    }
                    (None, Some(_)) => prop_assert!(false, "unknown tempo before known"),
                    (None, None) => {
                        prop_assert!(pair[0].playlist_order < pair[1].playlist_order);
                    }
                    (Some(_), None) => {}
                }
            }
        }
    }
}
