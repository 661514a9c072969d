//! Trait definition for the playlist store and playback control.
//!
//! The session and the reorder step only talk to [`PlaylistProvider`], so
//! tests can substitute the mock in [`mocks`] for the real Spotify client.

use std::time::Duration;

use async_trait::async_trait;

use super::{ProviderError, SpotifyClient};
use crate::model::{Device, Playlist, Track, User};

/// Everything the app needs from the music service.
#[async_trait]
pub trait PlaylistProvider: Send + Sync {
    /// The logged-in user.
    async fn current_user(&self) -> Result<User, ProviderError>;

    /// Playlists `user_id` owns or collaborates on.
    async fn user_playlists(&self, user_id: &str) -> Result<Vec<Playlist>, ProviderError>;

    /// Tracks of a playlist in playlist order.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ProviderError>;

    /// Devices available for playback.
    async fn devices(&self) -> Result<Vec<Device>, ProviderError>;

    async fn start_playback(&self, device_id: &str, uri: &str) -> Result<(), ProviderError>;

    async fn seek(&self, device_id: &str, position: Duration) -> Result<(), ProviderError>;

    async fn pause(&self, device_id: &str) -> Result<(), ProviderError>;

    /// Remove every occurrence of `uris`; returns the new snapshot ID.
    async fn remove_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
        snapshot_id: &str,
    ) -> Result<String, ProviderError>;

    /// Append `uris` to the playlist; returns the new snapshot ID.
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<String, ProviderError>;
}

#[async_trait]
impl PlaylistProvider for SpotifyClient {
    async fn current_user(&self) -> Result<User, ProviderError> {
        self.current_user().await
    }

    async fn user_playlists(&self, user_id: &str) -> Result<Vec<Playlist>, ProviderError> {
        self.user_playlists(user_id).await
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ProviderError> {
        self.playlist_tracks(playlist_id).await
    }

    async fn devices(&self) -> Result<Vec<Device>, ProviderError> {
        self.devices().await
    }

    async fn start_playback(&self, device_id: &str, uri: &str) -> Result<(), ProviderError> {
        self.start_playback(device_id, uri).await
    }

    async fn seek(&self, device_id: &str, position: Duration) -> Result<(), ProviderError> {
        self.seek(device_id, position).await
    }

    async fn pause(&self, device_id: &str) -> Result<(), ProviderError> {
        self.pause(device_id).await
    }

    async fn remove_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
        snapshot_id: &str,
    ) -> Result<String, ProviderError> {
        self.remove_tracks(playlist_id, uris, snapshot_id).await
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<String, ProviderError> {
        self.add_tracks(playlist_id, uris).await
    }
}
