use crate::model::ProviderKind;
use serde::{Deserialize, Serialize};
use url::Url;

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigIntervals {
    pub poll_ms: u64,
    pub progress_tick_ms: u64,
    pub request_timeout_ms: u64,
    pub file_watch_poll_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            poll_ms: 2_500,
            progress_tick_ms: 1_000,
            request_timeout_ms: 10_000,
            file_watch_poll_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub api_base: String,
    pub token_url: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            api_base: "https://api.spotify.com/v1".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub access_token: String,
    pub api_base: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LastfmConfig {
    pub api_key: String,
    pub username: String,
    pub api_base: String,
}

impl Default for LastfmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            username: String::new(),
            api_base: "https://ws.audioscrobbler.com/2.0/".to_string(),
        }
    }
}

impl LastfmConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.has_api_key() && !self.username.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub provider: ProviderKind,
    pub log_level: String,
    pub intervals: ConfigIntervals,
    pub spotify: SpotifyConfig,
    pub youtube: YouTubeConfig,
    pub lastfm: LastfmConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            provider: ProviderKind::Subscription,
            log_level: "info".to_string(),
            intervals: ConfigIntervals::default(),
            spotify: SpotifyConfig::default(),
            youtube: YouTubeConfig::default(),
            lastfm: LastfmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Human-readable list of problems; empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, base) in [
            ("spotify.api_base", &self.spotify.api_base),
            ("spotify.token_url", &self.spotify.token_url),
            ("youtube.api_base", &self.youtube.api_base),
            ("lastfm.api_base", &self.lastfm.api_base),
        ] {
            if let Err(err) = Url::parse(base) {
                problems.push(format!("{name} is not a valid URL ({err}): {base}"));
            }
        }

        if self.intervals.poll_ms == 0 {
            problems.push("intervals.poll_ms must be greater than zero".to_string());
        }
        if self.intervals.progress_tick_ms == 0 {
            problems.push("intervals.progress_tick_ms must be greater than zero".to_string());
        }

        match self.provider {
            ProviderKind::Subscription if self.spotify.access_token.trim().is_empty() => {
                if self.spotify.refresh_token.trim().is_empty() {
                    problems.push(
                        "spotify has neither access_token nor refresh_token".to_string(),
                    );
                }
            }
            ProviderKind::Video if self.youtube.access_token.trim().is_empty() => {
                problems.push("youtube.access_token is empty".to_string());
            }
            ProviderKind::Scrobble if !self.lastfm.is_complete() => {
                problems.push("lastfm.api_key and lastfm.username are required".to_string());
            }
            _ => {}
        }

        problems
    }
}
