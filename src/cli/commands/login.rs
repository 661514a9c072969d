//! Spotify login for the CLI.
//!
//! Reuses the cached token when it is still valid, refreshes it when it has
//! expired, and falls back to the browser flow otherwise.

use tokio::io::AsyncBufRead;

use crate::config::Config;
use crate::prompt::Console;
use crate::spotify::{ProviderError, SpotifyAuth, SpotifyClient, Token, auth};

/// Log in and return a client for the user's account.
///
/// Every failure is reported as [`ProviderError::Authentication`].
pub async fn login<R>(config: &Config, console: &mut Console<R>) -> Result<SpotifyClient, ProviderError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let (client_id, client_secret) = config.client_credentials().ok_or_else(|| {
        ProviderError::Authentication(
            "no Spotify app credentials; set CLIENT_ID and CLIENT_SECRET".to_string(),
        )
    })?;

    let mut spotify_auth =
        SpotifyAuth::new(client_id, client_secret, &config.credentials.redirect_uri)?;
    if let Some(path) = auth::default_token_path() {
        spotify_auth = spotify_auth.with_token_cache(path);
    }

    let now = chrono::Utc::now().timestamp();
    let token = match spotify_auth.cached_token() {
        Some(token) if !token.is_expired(now) => {
            tracing::debug!("Reusing cached Spotify token");
            token
        }
        Some(Token {
            refresh_token: Some(refresh_token),
            ..
        }) => match spotify_auth.refresh(&refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Token refresh failed, logging in again: {}", e);
                browser_login(&spotify_auth, console).await?
            }
        },
        _ => browser_login(&spotify_auth, console).await?,
    };
    spotify_auth.store_token(&token);

    let client = SpotifyClient::new(token.access_token)
        .map_err(|e| ProviderError::Authentication(e.to_string()))?;
    Ok(match token.refresh_token {
        Some(refresh_token) => client.with_refresh(spotify_auth, refresh_token),
        None => client,
    })
}

async fn browser_login<R>(
    spotify_auth: &SpotifyAuth,
    console: &mut Console<R>,
) -> Result<Token, ProviderError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let state = format!(
        "{:x}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );

    println!("\nOpen this URL in your browser and allow access:\n");
    println!("  {}\n", spotify_auth.authorize_url(&state));
    let redirected = console
        .read_line("Paste the URL you were redirected to: ")
        .await
        .map_err(|e| ProviderError::Authentication(e.to_string()))?;

    let code = auth::extract_code(&redirected, &state)?;
    spotify_auth.exchange_code(&code).await
}
