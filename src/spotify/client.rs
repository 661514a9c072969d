//! Spotify Web API HTTP client
//!
//! Handles communication with the Spotify Web API on behalf of a logged-in
//! user. See: https://developer.spotify.com/documentation/web-api
//!
//! ## API Quirks
//!
//! - List endpoints page at most 50 items; we always walk every page.
//! - Player endpoints answer `204 No Content` (sometimes `200` with an empty
//!   body), so their responses are never parsed.
//! - `429 Too Many Requests` carries a `Retry-After` header in seconds. We
//!   honour it a few times before giving up.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};

use super::{ProviderError, SpotifyAuth, adapter, dto};
use crate::model::{Device, Playlist, Track, User};

/// Largest page the list endpoints accept
pub const PAGE_SIZE: usize = 50;

/// Fields requested per playlist item
const TRACK_FIELDS: &str = "total,items(track(id,uri,name,artists(name)))";

const MAX_ATTEMPTS: u32 = 3;
const MAX_RETRY_WAIT: Duration = Duration::from_secs(30);

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: RwLock<String>,
    refresher: Option<Refresher>,
}

/// What the client needs to renew an expired access token
struct Refresher {
    auth: SpotifyAuth,
    refresh_token: Mutex<String>,
}

impl SpotifyClient {
    /// Create a client authorised with `access_token`
    pub fn new(access_token: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(access_token, "https://api.spotify.com/v1")
    }

    /// Create a client against a custom base URL
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            access_token: RwLock::new(access_token.into()),
            refresher: None,
        })
    }

    /// Renew the access token through `auth` when Spotify rejects it.
    ///
    /// Renewed tokens are stored in `auth`'s token cache.
    pub fn with_refresh(mut self, auth: SpotifyAuth, refresh_token: impl Into<String>) -> Self {
        self.refresher = Some(Refresher {
            auth,
            refresh_token: Mutex::new(refresh_token.into()),
        });
        self
    }

    /// The logged-in user
    pub async fn current_user(&self) -> Result<User, ProviderError> {
        let response: dto::UserResponse = self.send_json(self.get("/me")).await?;
        Ok(adapter::to_user(response))
    }

    /// All playlists in the user's library that `user_id` may modify
    pub async fn user_playlists(&self, user_id: &str) -> Result<Vec<Playlist>, ProviderError> {
        let mut playlists = Vec::new();
        let mut offset = 0;

        loop {
            let request = self.get("/me/playlists").query(&[
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);
            let page: dto::Paging<dto::SimplifiedPlaylist> = self.send_json(request).await?;
            let fetched = page.items.len();

            playlists.extend(
                page.items
                    .into_iter()
                    .map(adapter::to_playlist)
                    .filter(|p| p.is_editable_by(user_id)),
            );

            if is_last_page(offset, fetched, page.total as usize) {
                break;
            }
            offset += PAGE_SIZE;
        }

        tracing::debug!("Found {} editable playlists", playlists.len());
        Ok(playlists)
    }

    /// Every track of a playlist, in playlist order
    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, ProviderError> {
        let path = format!("/playlists/{}/tracks", playlist_id);
        let mut tracks = Vec::new();
        let mut offset = 0;

        loop {
            let request = self.get(&path).query(&[
                ("fields", TRACK_FIELDS.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);
            let page: dto::Paging<dto::PlaylistTrackItem> = self.send_json(request).await?;
            let fetched = page.items.len();

            tracks.extend(adapter::to_tracks(page.items, offset));

            if is_last_page(offset, fetched, page.total as usize) {
                break;
            }
            offset += PAGE_SIZE;
        }

        tracing::debug!("Fetched {} tracks of playlist {}", tracks.len(), playlist_id);
        Ok(tracks)
    }

    /// Devices available for playback
    pub async fn devices(&self) -> Result<Vec<Device>, ProviderError> {
        let response: dto::DevicesResponse =
            self.send_json(self.get("/me/player/devices")).await?;
        Ok(adapter::to_devices(response))
    }

    /// Start playing a single track on `device_id`
    pub async fn start_playback(&self, device_id: &str, uri: &str) -> Result<(), ProviderError> {
        let request = self
            .request(reqwest::Method::PUT, "/me/player/play")
            .query(&[("device_id", device_id)])
            .json(&dto::PlayRequest { uris: vec![uri] });
        self.send_no_content(request).await
    }

    /// Seek the current track on `device_id`
    pub async fn seek(&self, device_id: &str, position: Duration) -> Result<(), ProviderError> {
        let request = self
            .request(reqwest::Method::PUT, "/me/player/seek")
            .query(&[
                ("position_ms", position.as_millis().to_string()),
                ("device_id", device_id.to_string()),
            ]);
        self.send_no_content(request).await
    }

    /// Pause playback on `device_id`
    pub async fn pause(&self, device_id: &str) -> Result<(), ProviderError> {
        let request = self
            .request(reqwest::Method::PUT, "/me/player/pause")
            .query(&[("device_id", device_id)]);
        self.send_no_content(request).await
    }

    /// Remove every occurrence of `uris` (at most 100) from a playlist.
    ///
    /// Returns the playlist's new snapshot ID.
    pub async fn remove_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
        snapshot_id: &str,
    ) -> Result<String, ProviderError> {
        let body = dto::RemoveTracksRequest {
            tracks: uris
                .iter()
                .map(|uri| dto::UriObject { uri: uri.as_str() })
                .collect(),
            snapshot_id: Some(snapshot_id).filter(|s| !s.is_empty()),
        };
        let request = self
            .request(
                reqwest::Method::DELETE,
                &format!("/playlists/{}/tracks", playlist_id),
            )
            .json(&body);
        let response: dto::SnapshotResponse = self.send_json(request).await?;
        Ok(response.snapshot_id)
    }

    /// Append `uris` (at most 100) to the end of a playlist.
    ///
    /// Returns the playlist's new snapshot ID.
    pub async fn add_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<String, ProviderError> {
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("/playlists/{}/tracks", playlist_id),
            )
            .json(&dto::AddTracksRequest { uris });
        let response: dto::SnapshotResponse = self.send_json(request).await?;
        Ok(response.snapshot_id)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn send_no_content(&self, request: RequestBuilder) -> Result<(), ProviderError> {
        self.send(request).await.map(|_| ())
    }

    /// Send the request with the current access token.
    ///
    /// Retries while Spotify asks us to slow down, and once after renewing
    /// a rejected token.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let request = request
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let mut attempt = 1;
        let mut refreshed = false;

        loop {
            let mut this_try = request
                .try_clone()
                .ok_or_else(|| ProviderError::Network("request cannot be retried".to_string()))?;
            let token = self.access_token.read().await.clone();
            this_try
                .headers_mut()
                .insert(AUTHORIZATION, bearer_header(&token)?);

            match check_status(self.execute(this_try).await?).await {
                Err(ProviderError::RateLimited { retry_after }) if attempt < MAX_ATTEMPTS => {
                    let wait = retry_after.unwrap_or(Duration::from_secs(1)).min(MAX_RETRY_WAIT);
                    tracing::warn!("Rate limited by Spotify, retrying in {:?}", wait);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(ProviderError::Unauthorized) if !refreshed && self.refresher.is_some() => {
                    self.refresh_access_token(&token).await?;
                    refreshed = true;
                }
                result => return result,
            }
        }
    }

    async fn execute(&self, request: Request) -> Result<Response, ProviderError> {
        self.http_client
            .execute(request)
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))
    }

    /// Swap `stale` for a fresh access token
    async fn refresh_access_token(&self, stale: &str) -> Result<(), ProviderError> {
        let Some(refresher) = &self.refresher else {
            return Err(ProviderError::Unauthorized);
        };
        let mut refresh_token = refresher.refresh_token.lock().await;

        // Another request renewed it while we waited for the lock
        if *self.access_token.read().await != stale {
            return Ok(());
        }

        let token = refresher.auth.refresh(&refresh_token).await?;
        refresher.auth.store_token(&token);
        if let Some(next) = &token.refresh_token {
            *refresh_token = next.clone();
        }
        *self.access_token.write().await = token.access_token;

        tracing::info!("Renewed the Spotify access token");
        Ok(())
    }
}

fn bearer_header(token: &str) -> Result<HeaderValue, ProviderError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| ProviderError::Authentication(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Map non-success statuses to errors
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    tracing::debug!("{} {}", status.as_u16(), response.url().path());

    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(ProviderError::Unauthorized);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    // Try to parse error response
    if let Ok(body) = response.json::<dto::ErrorResponse>().await {
        return Err(ProviderError::Api {
            status: body.error.status,
            message: body.error.message,
        });
    }
    Err(ProviderError::Api {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Unknown").to_string(),
    })
}

/// Whether the page at `offset` holding `fetched` items was the last one
fn is_last_page(offset: usize, fetched: usize, total: usize) -> bool {
    fetched == 0 || offset + PAGE_SIZE >= total
}
