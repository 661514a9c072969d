//! Core data models for a sort session.
//!
//! Defines the primary entities: [`Track`], [`Playlist`], [`PlaylistSelection`],
//! [`Device`] and [`User`]. These are OUR types; Spotify responses are
//! converted into them by the adapter in [`crate::spotify`].

use serde::{Deserialize, Serialize};

/// A track in the playlist being sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Spotify track ID (stable per catalog)
    pub id: String,
    /// Playback URI (`spotify:track:<id>`)
    pub uri: String,
    /// Display name
    pub name: String,
    /// Artist names in credit order
    pub artists: Vec<String>,
    /// Absolute position in the source playlist
    pub playlist_order: usize,
    /// Tempo assigned during this run (tapped, averaged or recalled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

impl Track {
    /// "Name by Artist, Artist" for prompts.
    pub fn display_name(&self) -> String {
        if self.artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} by {}", self.name, self.artists.join(", "))
        }
    }
}

/// A playlist the current user may reorder.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    /// Spotify user ID of the owner
    pub owner_id: String,
    pub collaborative: bool,
    /// Version tag of the playlist contents
    pub snapshot_id: String,
    pub total_tracks: u32,
}

impl Playlist {
    /// Whether `user_id` can modify this playlist.
    pub fn is_editable_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.collaborative
    }
}

/// The playlist picked for sorting, pinned to the contents seen at selection time.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSelection {
    pub playlist_id: String,
    pub name: String,
    /// Snapshot captured when the user confirmed the selection
    pub snapshot_id: String,
}

impl From<&Playlist> for PlaylistSelection {
    fn from(playlist: &Playlist) -> Self {
        Self {
            playlist_id: playlist.id.clone(),
            name: playlist.name.clone(),
            snapshot_id: playlist.snapshot_id.clone(),
        }
    }
}

/// A Spotify Connect playback device.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// The authenticated Spotify user.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_joins_artists() {
        let track = Track {
            id: "t1".to_string(),
            uri: "spotify:track:t1".to_string(),
            name: "Song".to_string(),
            artists: vec!["A".to_string(), "B".to_string()],
            playlist_order: 0,
            bpm: None,
        };
        assert_eq!(track.display_name(), "Song by A, B");
    }

    #[test]
    fn test_playlist_editable_by_owner_or_collaborator() {
        let playlist = Playlist {
            id: "p1".to_string(),
            name: "Mine".to_string(),
            owner_id: "me".to_string(),
            collaborative: false,
            snapshot_id: "snap".to_string(),
            total_tracks: 3,
        };
        assert!(playlist.is_editable_by("me"));
        assert!(!playlist.is_editable_by("someone-else"));

        let shared = Playlist {
            collaborative: true,
            ..playlist
        };
        assert!(shared.is_editable_by("someone-else"));
    }

    #[test]
    fn test_selection_captures_snapshot() {
        let playlist = Playlist {
            id: "p1".to_string(),
            name: "Mine".to_string(),
            owner_id: "me".to_string(),
            collaborative: false,
            snapshot_id: "snap-42".to_string(),
            total_tracks: 0,
        };
        let selection = PlaylistSelection::from(&playlist);
        assert_eq!(selection.snapshot_id, "snap-42");
        assert_eq!(selection.playlist_id, "p1");
    }
}
