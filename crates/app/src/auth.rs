//! Credential owner for the token-based providers.
//!
//! Tokens come from config or env; nothing is persisted. A rejected Spotify
//! token is exchanged through the `refresh_token` grant, a rejected YouTube
//! token is simply dropped until a new one is configured.

use anyhow::{bail, Context, Result};
use nowify_core::{AppConfig, Credential, CredentialStore, SpotifyConfig};
use nowify_providers::ProviderCredentials;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct SpotifyRefresher {
    client: reqwest::Client,
    store: Arc<CredentialStore>,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: Mutex<String>,
    in_flight: AtomicBool,
}

impl SpotifyRefresher {
    fn refresh_token(&self) -> String {
        self.refresh_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_refresh_token(&self, token: String) {
        *self
            .refresh_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    /// Starts one token exchange unless another is already running.
    fn trigger(self: &Arc<Self>) {
        if self.refresh_token().trim().is_empty() {
            warn!("spotify token rejected and no refresh_token configured; clearing credential");
            self.store.clear();
            return;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("spotify token refresh already in flight");
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.exchange().await {
                Ok(token) => {
                    info!(expires_in = ?token.expires_in, "spotify access token refreshed");
                    if let Some(rotated) = token.refresh_token.filter(|t| !t.trim().is_empty()) {
                        this.set_refresh_token(rotated);
                    }
                    this.store.set_token(token.access_token);
                }
                Err(err) => {
                    warn!(error = %err, "spotify token refresh failed; clearing credential");
                    this.store.clear();
                }
            }
            this.in_flight.store(false, Ordering::SeqCst);
        });
    }

    async fn exchange(&self) -> Result<TokenResponse> {
        let refresh_token = self.refresh_token();
        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .context("token endpoint unreachable")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("token endpoint returned {status}");
        }
        let token: TokenResponse = resp.json().await.context("invalid token response")?;
        if token.access_token.trim().is_empty() {
            bail!("token endpoint returned an empty access_token");
        }
        Ok(token)
    }
}

/// Owns one [`CredentialStore`] per token-based provider.
pub struct Sessions {
    spotify: Arc<CredentialStore>,
    youtube: Arc<CredentialStore>,
    refresher: Arc<SpotifyRefresher>,
}

impl Sessions {
    pub fn new(cfg: &AppConfig, client: reqwest::Client) -> Self {
        let spotify = Arc::new(CredentialStore::new(Credential::new(
            cfg.spotify.access_token.clone(),
        )));
        let youtube = Arc::new(CredentialStore::new(Credential::new(
            cfg.youtube.access_token.clone(),
        )));
        let refresher = Arc::new(SpotifyRefresher {
            client,
            store: Arc::clone(&spotify),
            token_url: cfg.spotify.token_url.clone(),
            client_id: cfg.spotify.client_id.clone(),
            client_secret: cfg.spotify.client_secret.clone(),
            refresh_token: Mutex::new(cfg.spotify.refresh_token.clone()),
            in_flight: AtomicBool::new(false),
        });
        Self {
            spotify,
            youtube,
            refresher,
        }
    }

    pub fn credentials(&self) -> ProviderCredentials {
        let refresher = Arc::clone(&self.refresher);
        let youtube = Arc::clone(&self.youtube);
        ProviderCredentials {
            spotify: self
                .spotify
                .handle(Arc::new(move || refresher.trigger())),
            youtube: self.youtube.handle(Arc::new(move || {
                warn!("youtube token rejected; it cannot be refreshed, clearing credential");
                youtube.clear();
            })),
        }
    }

    /// Kicks off a refresh when only a refresh token is configured.
    pub fn bootstrap(&self, cfg: &SpotifyConfig) {
        if cfg.access_token.trim().is_empty() && !cfg.refresh_token.trim().is_empty() {
            info!("no spotify access token; exchanging refresh token");
            self.refresher.trigger();
        }
    }

    /// Publishes tokens that changed in a reloaded config.
    pub fn apply_config(&self, previous: &AppConfig, next: &AppConfig) {
        if previous.spotify.refresh_token != next.spotify.refresh_token {
            self.refresher
                .set_refresh_token(next.spotify.refresh_token.clone());
        }
        if previous.spotify.access_token != next.spotify.access_token {
            self.spotify.set_token(next.spotify.access_token.clone());
        }
        if previous.youtube.access_token != next.youtube.access_token {
            self.youtube.set_token(next.youtube.access_token.clone());
        }
    }

    pub fn spotify_ready(&self) -> bool {
        self.spotify.current().has_valid_token()
    }

    pub fn youtube_ready(&self) -> bool {
        self.youtube.current().has_valid_token()
    }
}

#[cfg(test)]
mod tests {
    use super::Sessions;
    use nowify_core::AppConfig;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(token_url: String, refresh_token: &str) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.spotify.client_id = "id".to_string();
        cfg.spotify.client_secret = "secret".to_string();
        cfg.spotify.access_token = "stale".to_string();
        cfg.spotify.refresh_token = refresh_token.to_string();
        cfg.spotify.token_url = token_url;
        cfg.youtube.access_token = "yt".to_string();
        cfg
    }

    #[tokio::test]
    async fn rejected_spotify_token_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("authorization", "Basic aWQ6c2VjcmV0"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sessions = Sessions::new(
            &config(format!("{}/api/token", server.uri()), "r1"),
            reqwest::Client::new(),
        );
        let credentials = sessions.credentials();
        let mut rx = credentials.spotify.subscribe();

        credentials.spotify.request_refresh();
        credentials.spotify.request_refresh();

        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|c| c.access_token == "fresh"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(credentials.spotify.access_token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn failed_refresh_clears_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let sessions = Sessions::new(
            &config(format!("{}/api/token", server.uri()), "r1"),
            reqwest::Client::new(),
        );
        let credentials = sessions.credentials();
        let mut rx = credentials.spotify.subscribe();

        credentials.spotify.request_refresh();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| !c.has_valid_token()))
            .await
            .unwrap()
            .unwrap();
        assert!(!sessions.spotify_ready());
    }

    #[tokio::test]
    async fn without_refresh_token_spotify_credential_is_cleared() {
        let sessions = Sessions::new(
            &config("http://127.0.0.1:9/api/token".to_string(), ""),
            reqwest::Client::new(),
        );
        let credentials = sessions.credentials();

        assert!(sessions.spotify_ready());
        credentials.spotify.request_refresh();
        assert!(!sessions.spotify_ready());
        assert_eq!(credentials.spotify.access_token(), None);
    }

    #[tokio::test]
    async fn youtube_refresh_drops_token() {
        let sessions = Sessions::new(
            &config("http://127.0.0.1:9/api/token".to_string(), ""),
            reqwest::Client::new(),
        );
        let credentials = sessions.credentials();

        assert!(sessions.youtube_ready());
        credentials.youtube.request_refresh();
        assert!(!sessions.youtube_ready());
    }

    #[tokio::test]
    async fn reload_publishes_changed_tokens() {
        let previous = config("http://127.0.0.1:9/api/token".to_string(), "");
        let sessions = Sessions::new(&previous, reqwest::Client::new());
        let credentials = sessions.credentials();

        let mut next = previous.clone();
        next.youtube.access_token = "yt2".to_string();
        sessions.apply_config(&previous, &next);

        assert_eq!(credentials.youtube.access_token().as_deref(), Some("yt2"));
        assert_eq!(credentials.spotify.access_token().as_deref(), Some("stale"));
    }
}
