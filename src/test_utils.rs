//! Test utilities and fixtures for bpm-sorter tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{mock_track, temp_cache_path};
//!
//! #[test]
//! fn test_something() {
//!     let (path, _dir) = temp_cache_path();
//!     let track = mock_track("abc", 0);
//!     // ... test logic
//! }
//! ```

use std::path::PathBuf;

use tempfile::TempDir;

use crate::model::{PlaylistSelection, Track};

/// A cache file path inside a fresh temporary directory.
///
/// Keep the `TempDir` alive for the duration of your test; the directory is
/// deleted when it is dropped.
pub fn temp_cache_path() -> (PathBuf, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("bpm-checker.json");
    (path, dir)
}

/// Creates a mock Track with sensible defaults and no tempo.
///
/// Customize using struct update syntax:
///
/// ```ignore
/// let track = Track { bpm: Some(120.0), ..mock_track("a", 0) };
/// ```
pub fn mock_track(id: &str, playlist_order: usize) -> Track {
    Track {
        id: id.to_string(),
        uri: format!("spotify:track:{}", id),
        name: format!("Track {}", id),
        artists: vec!["Test Artist".to_string()],
        playlist_order,
        bpm: None,
    }
}

/// Tracks `ids[0]`, `ids[1]`, ... in playlist order.
pub fn mock_tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .enumerate()
        .map(|(order, id)| mock_track(id, order))
        .collect()
}

pub fn mock_selection() -> PlaylistSelection {
    PlaylistSelection {
        playlist_id: "playlist-1".to_string(),
        name: "Test Playlist".to_string(),
        snapshot_id: "snapshot-1".to_string(),
    }
}
