//! Adapter layer: Convert Spotify DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.

use super::dto;
use crate::model::{Device, Playlist, Track, User};

pub fn to_user(response: dto::UserResponse) -> User {
    User {
        id: response.id,
        display_name: response.display_name,
    }
}

pub fn to_playlist(playlist: dto::SimplifiedPlaylist) -> Playlist {
    Playlist {
        id: playlist.id,
        name: playlist.name,
        owner_id: playlist.owner.id,
        collaborative: playlist.collaborative,
        snapshot_id: playlist.snapshot_id,
        total_tracks: playlist.tracks.map(|t| t.total).unwrap_or(0),
    }
}

/// Convert one page of playlist items starting at absolute position `offset`.
///
/// Items without a track ID (local files, removed tracks) are skipped, but
/// still count towards the positions of the items after them.
pub fn to_tracks(items: Vec<dto::PlaylistTrackItem>, offset: usize) -> Vec<Track> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let position = offset + index;
            let Some(track) = item.track else {
                tracing::warn!("Skipping unavailable playlist item at position {}", position);
                return None;
            };
            let Some(id) = track.id else {
                tracing::warn!(
                    "Skipping '{}' at position {}: local files cannot be reordered",
                    track.name,
                    position
                );
                return None;
            };
            let uri = track
                .uri
                .unwrap_or_else(|| format!("spotify:track:{}", id));
            Some(Track {
                id,
                uri,
                name: track.name,
                artists: track.artists.into_iter().map(|a| a.name).collect(),
                playlist_order: position,
                bpm: None,
            })
        })
        .collect()
}

/// Devices that can be controlled (restricted devices come without an ID).
pub fn to_devices(response: dto::DevicesResponse) -> Vec<Device> {
    response
        .devices
        .into_iter()
        .filter_map(|device| {
            Some(Device {
                id: device.id?,
                name: device.name,
                is_active: device.is_active,
            })
        })
        .collect()
}
