use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(alias = "spotify")]
    Subscription,
    #[serde(alias = "youtube")]
    Video,
    #[serde(alias = "lastfm")]
    Scrobble,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Subscription => "subscription",
            ProviderKind::Video => "video",
            ProviderKind::Scrobble => "scrobble",
        }
    }

    /// Accepts both the role name and the backing service name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "subscription" | "spotify" => Some(ProviderKind::Subscription),
            "video" | "youtube" => Some(ProviderKind::Video),
            "scrobble" | "lastfm" | "last.fm" => Some(ProviderKind::Scrobble),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AlbumInfo {
    pub title: Option<String>,
    pub image_url: Option<String>,
}

/// Short description of a neighbouring track (queue head or last played).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackSummary {
    pub title: String,
    pub artist: String,
    pub image_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopTrack {
    pub title: String,
    pub artist: String,
    pub image_url: Option<String>,
    pub play_count: Option<u64>,
}

/// The single "now playing" snapshot shared between the polling engine and
/// whatever renders it.
///
/// A record is replaced wholesale when the track identity changes and only
/// patched (neighbour tracks) while the same track keeps playing, so that the
/// locally interpolated `progress_ms` survives poll jitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PlaybackRecord {
    pub playing: bool,
    pub track_id: Option<String>,
    pub track_title: String,
    pub track_artists: Vec<String>,
    pub track_url: Option<String>,
    pub album: AlbumInfo,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub release_date: Option<String>,
    pub popularity: Option<u32>,
    pub tags: Vec<String>,
    pub next_track: Option<TrackSummary>,
    pub previous_track: Option<TrackSummary>,
    pub top_track: Option<TopTrack>,
    pub provider: Option<ProviderKind>,
}

impl PlaybackRecord {
    /// Empty record shown before the first poll of a session lands.
    pub fn idle(provider: Option<ProviderKind>) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.playing && self.track_id.is_none() && self.track_title.is_empty()
    }

    pub fn artist_line(&self) -> String {
        self.track_artists.join(", ")
    }

    /// Local interpolation only makes sense when the provider reports a length.
    pub fn can_interpolate(&self) -> bool {
        self.playing && self.duration_ms > 0
    }
}
