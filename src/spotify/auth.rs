//! Spotify login via the OAuth authorization-code flow.
//!
//! 1. The user opens [`SpotifyAuth::authorize_url`] in a browser and approves.
//! 2. Spotify redirects to the registered redirect URI; the user pastes that
//!    URL back and [`extract_code`] pulls the `code` out of it.
//! 3. [`SpotifyAuth::exchange_code`] trades the code for an access token.
//!
//! Tokens are cached on disk and refreshed with their refresh token, so the
//! browser step is only needed on first use or after the refresh token is
//! revoked.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ProviderError, dto};

/// Redirect URI registered for the app unless configured otherwise
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5710/callback/";

/// Permissions needed to read playlists, control playback and rewrite playlists
pub const SCOPES: &[&str] = &[
    "playlist-read-collaborative",
    "user-read-playback-state",
    "playlist-modify-public",
    "playlist-read-private",
    "playlist-modify-private",
    "streaming",
    "user-modify-playback-state",
];

/// Seconds shaved off the token lifetime so it never expires mid-request
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An access token with its expiry and refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) after which the token is treated as expired
    pub expires_at: i64,
}

impl Token {
    fn from_response(response: dto::TokenResponse, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: chrono::Utc::now().timestamp() + response.expires_in - EXPIRY_MARGIN_SECS,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Spotify accounts service client
pub struct SpotifyAuth {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    accounts_url: String,
    token_path: Option<PathBuf>,
}

impl SpotifyAuth {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Authentication(e.to_string()))?;

        Ok(Self {
            http_client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            accounts_url: "https://accounts.spotify.com".to_string(),
            token_path: None,
        })
    }

    #[cfg(test)]
    pub fn with_accounts_url(mut self, url: impl Into<String>) -> Self {
        self.accounts_url = url.into();
        self
    }

    /// Cache tokens in `path` between runs
    pub fn with_token_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// URL the user opens to grant access
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.accounts_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&SCOPES.join(" ")),
            urlencoding::encode(state),
        )
    }

    /// Trade an authorization code for a token
    pub async fn exchange_code(&self, code: &str) -> Result<Token, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let response = self.request_token(&params).await?;
        Ok(Token::from_response(response, None))
    }

    /// Get a fresh access token from a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, ProviderError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self.request_token(&params).await?;
        Ok(Token::from_response(response, Some(refresh_token.to_string())))
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<dto::TokenResponse, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::Authentication(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if let Ok(error) = response.json::<dto::AuthErrorResponse>().await {
                let detail = error.error_description.unwrap_or_default();
                return Err(ProviderError::Authentication(format!(
                    "{} {}",
                    error.error, detail
                )));
            }
            return Err(ProviderError::Authentication(format!("HTTP {}", status)));
        }

        response
            .json::<dto::TokenResponse>()
            .await
            .map_err(|e| ProviderError::Authentication(e.to_string()))
    }

    /// Token stored by a previous run, if any
    pub fn cached_token(&self) -> Option<Token> {
        let path = self.token_path.as_deref()?;
        read_token(path)
    }

    /// Store the token for the next run. Failures are logged, not fatal.
    pub fn store_token(&self, token: &Token) {
        let Some(path) = self.token_path.as_deref() else {
            return;
        };
        if let Err(e) = write_token(path, token) {
            tracing::warn!("Could not cache Spotify token at {:?}: {}", path, e);
        }
    }
}

/// Default token cache location (user cache directory)
pub fn default_token_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("bpm-sorter").join("token.json"))
}

fn read_token(path: &Path) -> Option<Token> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::warn!("Ignoring unreadable token cache {:?}: {}", path, e);
            None
        }
    }
}

fn write_token(path: &Path, token: &Token) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let contents = serde_json::to_string(token).map_err(std::io::Error::other)?;
    fs::write(path, contents)
}

/// Pull the authorization code out of the URL Spotify redirected to.
///
/// Fails if the user denied access or the `state` does not match.
pub fn extract_code(redirected_url: &str, expected_state: &str) -> Result<String, ProviderError> {
    let query = redirected_url
        .trim()
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or_default();
    let query = query.split('#').next().unwrap_or_default();

    let mut code = None;
    let mut state = None;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value)
            .map_err(|e| ProviderError::Authentication(e.to_string()))?
            .into_owned();
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => {
                return Err(ProviderError::Authentication(format!(
                    "authorization denied: {}",
                    value
                )));
            }
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(ProviderError::Authentication(
            "state mismatch in redirect URL".to_string(),
        ));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| ProviderError::Authentication("no code in redirect URL".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> SpotifyAuth {
        SpotifyAuth::new("client-id", "secret", DEFAULT_REDIRECT_URI).unwrap()
    }

    #[test]
    fn test_authorize_url_contains_encoded_params() {
        let url = auth().authorize_url("xyz");
        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5710%2Fcallback%2F"));
        assert!(url.contains("user-modify-playback-state"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_extract_code() {
        let url = "http://localhost:5710/callback/?code=AQB%2Fabc&state=xyz";
        assert_eq!(extract_code(url, "xyz").unwrap(), "AQB/abc");
    }

    #[test]
    fn test_extract_code_denied() {
        let url = "http://localhost:5710/callback/?error=access_denied&state=xyz";
        assert!(matches!(
            extract_code(url, "xyz"),
            Err(ProviderError::Authentication(msg)) if msg.contains("access_denied")
        ));
    }

    #[test]
    fn test_extract_code_state_mismatch() {
        let url = "http://localhost:5710/callback/?code=abc&state=other";
        assert!(extract_code(url, "xyz").is_err());
    }

    #[test]
    fn test_extract_code_missing() {
        assert!(extract_code("not a url", "xyz").is_err());
    }

    #[test]
    fn test_token_expiry() {
        let token = Token {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: 1_000,
        };
        assert!(!token.is_expired(999));
        assert!(token.is_expired(1_000));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let response = dto::TokenResponse {
            access_token: "new".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            refresh_token: None,
            scope: None,
        };
        let token = Token::from_response(response, Some("old-refresh".to_string()));
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert!(!token.is_expired(chrono::Utc::now().timestamp()));
    }

    #[test]
    fn test_token_cache_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let auth = auth().with_token_cache(dir.path().join("token.json"));
        assert!(auth.cached_token().is_none());

        let token = Token {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: 42,
        };
        auth.store_token(&token);
        assert_eq!(auth.cached_token(), Some(token));
    }
}
