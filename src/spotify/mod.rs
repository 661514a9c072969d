//! Spotify integration - the playlist store, playback and login.
//!
//! # Architecture
//!
//! Same layering as any external API we talk to:
//! - **DTOs** (`dto.rs`) - Exact API request/response shapes
//! - **Adapter** (`adapter.rs`) - Converts DTOs to [`crate::model`] types
//! - **Client** (`client.rs`) - HTTP client for the Web API
//! - **Auth** (`auth.rs`) - OAuth authorization-code login and token cache
//! - **Traits** (`traits.rs`) - [`PlaylistProvider`], the seam the session
//!   and the reorder step depend on; mocked in tests
//!
//! API docs: https://developer.spotify.com/documentation/web-api

pub mod auth;
pub mod dto;
mod adapter;
mod client;
pub mod traits;

use std::time::Duration;

pub use auth::{SpotifyAuth, Token};
pub use client::{PAGE_SIZE, SpotifyClient};
pub use traits::PlaylistProvider;

/// Errors that can occur talking to Spotify
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Access token rejected or expired")]
    Unauthorized,

    #[error("Rate limited - try again later")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Spotify API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}
