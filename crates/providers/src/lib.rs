use anyhow::{Context, Result};
use async_trait::async_trait;
use nowify_core::{AppConfig, Credential, CredentialHandle, PlaybackRecord, ProviderKind, TopTrack};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

pub mod error;
pub mod http;
pub mod images;
pub mod lastfm;
pub mod spotify;
pub mod tags;
pub mod youtube;

pub use error::FetchError;
pub use http::ApiClient;
pub use lastfm::LastfmProvider;
pub use spotify::SpotifyProvider;
pub use tags::TagLookup;
pub use youtube::YouTubeProvider;

/// One now-playing backend behind a uniform capability set.
///
/// Implementations never fail across this boundary: every backend error is
/// logged and mapped to `None`. Calls may overlap, hence `&self`.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Credential gating this provider. `None` means polling never waits on
    /// a token.
    fn credential(&self) -> Option<watch::Receiver<Credential>> {
        None
    }

    async fn now_playing(&self) -> Option<PlaybackRecord>;

    fn supports_month_favorite(&self) -> bool {
        false
    }

    async fn month_favorite(&self) -> Option<TopTrack> {
        None
    }

    /// Invoked when a session switches away from this provider or shuts down.
    fn disconnect(&self) {}
}

/// Holds every configured adapter and which one is active.
pub struct ProviderSelector {
    providers: Vec<Arc<dyn MusicProvider>>,
    active: ProviderKind,
}

impl ProviderSelector {
    pub fn new(providers: Vec<Arc<dyn MusicProvider>>, active: ProviderKind) -> Self {
        Self { providers, active }
    }

    pub fn active_kind(&self) -> ProviderKind {
        self.active
    }

    pub fn active(&self) -> Option<Arc<dyn MusicProvider>> {
        self.get(self.active)
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn MusicProvider>> {
        self.providers.iter().find(|p| p.kind() == kind).cloned()
    }

    /// Makes `kind` the active provider and returns its adapter. Leaves the
    /// selection untouched when no adapter of that kind is registered.
    pub fn switch(&mut self, kind: ProviderKind) -> Option<Arc<dyn MusicProvider>> {
        let provider = self.get(kind)?;
        if self.active != kind {
            info!(from = %self.active, to = %kind, "switching provider");
        }
        self.active = kind;
        Some(provider)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }
}

/// Credential handles for the token-based adapters.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub spotify: CredentialHandle,
    pub youtube: CredentialHandle,
}

pub fn build_provider_selector(
    cfg: &AppConfig,
    credentials: ProviderCredentials,
) -> Result<ProviderSelector> {
    let client = http::build_client(Duration::from_millis(cfg.intervals.request_timeout_ms))
        .context("failed to build HTTP client")?;

    let tags = TagLookup::new(client.clone(), &cfg.lastfm).context("invalid lastfm.api_base")?;

    let spotify_api =
        ApiClient::new(client.clone(), &cfg.spotify.api_base).context("invalid spotify.api_base")?;
    let youtube_api =
        ApiClient::new(client.clone(), &cfg.youtube.api_base).context("invalid youtube.api_base")?;
    let lastfm_api =
        ApiClient::new(client, &cfg.lastfm.api_base).context("invalid lastfm.api_base")?;

    let providers: Vec<Arc<dyn MusicProvider>> = vec![
        Arc::new(SpotifyProvider::new(
            spotify_api,
            credentials.spotify,
            tags.clone(),
        )),
        Arc::new(YouTubeProvider::new(youtube_api, credentials.youtube)),
        Arc::new(LastfmProvider::new(lastfm_api, &cfg.lastfm, tags)),
    ];

    Ok(ProviderSelector::new(providers, cfg.provider))
}
