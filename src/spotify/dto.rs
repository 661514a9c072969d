//! Spotify Web API Data Transfer Objects
//!
//! These types match what the Spotify Web API sends and expects.
//! DO NOT use these types outside the spotify module - convert to domain types.
//!
//! API Reference: https://developer.spotify.com/documentation/web-api

use serde::{Deserialize, Serialize};

/// Paging object wrapping every list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Total number of items across all pages
    #[serde(default)]
    pub total: u32,
}

/// GET /me
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub display_name: Option<String>,
}

/// Playlist as returned by GET /me/playlists
#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedPlaylist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub owner: PlaylistOwner,
    #[serde(default)]
    pub collaborative: bool,
    pub snapshot_id: String,
    #[serde(default)]
    pub tracks: Option<TracksRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistOwner {
    pub id: String,
    pub display_name: Option<String>,
}

/// Link to a playlist's tracks, carrying only the count
#[derive(Debug, Clone, Deserialize)]
pub struct TracksRef {
    #[serde(default)]
    pub total: u32,
}

/// Item of GET /playlists/{id}/tracks
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrackItem {
    /// Null for items that are no longer available
    pub track: Option<TrackObject>,
}

/// Track restricted to the requested fields `id,uri,name,artists(name)`
#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    /// Null for local files
    pub id: Option<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistObject {
    pub name: String,
}

/// GET /me/player/devices
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<DeviceObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceObject {
    /// Null for restricted devices that cannot be controlled
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

/// Response of playlist modification endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    pub snapshot_id: String,
}

/// Regular error body: `{"error": {"status": 401, "message": "..."}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorObject {
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

/// PUT /me/player/play body
#[derive(Debug, Clone, Serialize)]
pub struct PlayRequest<'a> {
    pub uris: Vec<&'a str>,
}

/// DELETE /playlists/{id}/tracks body
#[derive(Debug, Clone, Serialize)]
pub struct RemoveTracksRequest<'a> {
    pub tracks: Vec<UriObject<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UriObject<'a> {
    pub uri: &'a str,
}

/// POST /playlists/{id}/tracks body
#[derive(Debug, Clone, Serialize)]
pub struct AddTracksRequest<'a> {
    pub uris: &'a [String],
}

/// Token endpoint response (accounts service)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Absent on refresh responses that keep the old refresh token
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Token endpoint error body: `{"error": "invalid_grant", "error_description": "..."}`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}
