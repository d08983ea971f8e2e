use crate::error::FetchError;
use crate::http::ApiClient;
use crate::images::{select_image, SizedImage};
use crate::tags::{lastfm_get, OneOrMany, TagLookup};
use crate::MusicProvider;
use async_trait::async_trait;
use nowify_core::{
    urls, AlbumInfo, LastfmConfig, PlaybackRecord, ProviderKind, TopTrack, TrackSummary,
};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: Option<RecentTracks>,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: OneOrMany<ScrobbledTrack>,
}

#[derive(Debug, Deserialize)]
struct ScrobbledTrack {
    name: String,
    artist: ArtistRef,
    #[serde(default)]
    album: Option<TextRef>,
    #[serde(default)]
    image: Vec<SizedImage>,
    url: Option<String>,
    #[serde(rename = "@attr")]
    attr: Option<TrackAttr>,
}

/// With `extended=1` the artist is an object with `name`; the plain feed
/// uses `#text`.
#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: Option<String>,
    #[serde(rename = "#text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextRef {
    #[serde(rename = "#text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct TrackAttr {
    nowplaying: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    toptracks: Option<TopTracks>,
}

#[derive(Debug, Deserialize)]
struct TopTracks {
    #[serde(default)]
    track: OneOrMany<RankedTrack>,
}

#[derive(Debug, Deserialize)]
struct RankedTrack {
    name: String,
    artist: ArtistRef,
    #[serde(default)]
    image: Vec<SizedImage>,
    playcount: Option<String>,
}

impl ArtistRef {
    fn display(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.text.clone())
            .unwrap_or_default()
    }
}

impl ScrobbledTrack {
    fn is_now_playing(&self) -> bool {
        self.attr
            .as_ref()
            .and_then(|a| a.nowplaying.as_deref())
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    fn link(&self, artist: &str) -> String {
        self.url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| urls::lastfm_track_url(artist, &self.name))
    }
}

/// Scrobble-service adapter for Last.fm. Authenticates with an API key and
/// a public username, so there is no access token to gate on; a missing key
/// or username short-circuits every call.
pub struct LastfmProvider {
    api: ApiClient,
    api_key: String,
    username: String,
    tags: TagLookup,
}

impl LastfmProvider {
    pub fn new(api: ApiClient, cfg: &LastfmConfig, tags: TagLookup) -> Self {
        Self {
            api,
            api_key: cfg.api_key.trim().to_string(),
            username: cfg.username.trim().to_string(),
            tags,
        }
    }

    fn configured(&self) -> bool {
        if self.api_key.is_empty() || self.username.is_empty() {
            warn!("last.fm api_key or username missing; skipping request");
            return false;
        }
        true
    }

    async fn recent_tracks(&self) -> Result<Vec<ScrobbledTrack>, FetchError> {
        let response: RecentTracksResponse = lastfm_get(
            &self.api,
            &self.api_key,
            "user.getrecenttracks",
            &[("user", self.username.as_str()), ("limit", "2"), ("extended", "1")],
        )
        .await?;
        Ok(response
            .recenttracks
            .map(|r| r.track.into_vec())
            .unwrap_or_default())
    }
}

#[async_trait]
impl MusicProvider for LastfmProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Scrobble
    }

    async fn now_playing(&self) -> Option<PlaybackRecord> {
        if !self.configured() {
            return None;
        }

        let tracks = match self.recent_tracks().await {
            Ok(tracks) => tracks,
            Err(err) => {
                warn!(error = %err, "last.fm recent tracks fetch failed");
                return None;
            }
        };

        let mut tracks = tracks.into_iter();
        let Some(current) = tracks.next() else {
            debug!("last.fm: no recent tracks");
            return None;
        };

        let playing = current.is_now_playing();
        let artist = current.artist.display();
        let tags = if playing {
            self.tags.lookup(&artist, &current.name).await
        } else {
            Vec::new()
        };

        let previous_track = tracks.next().map(|prev| {
            let prev_artist = prev.artist.display();
            TrackSummary {
                url: Some(prev.link(&prev_artist)),
                image_url: select_image(&prev.image),
                title: prev.name,
                artist: prev_artist,
            }
        });

        Some(PlaybackRecord {
            playing,
            track_id: None,
            track_url: Some(current.link(&artist)),
            album: AlbumInfo {
                title: current
                    .album
                    .as_ref()
                    .map(|a| a.text.clone())
                    .filter(|t| !t.is_empty()),
                image_url: select_image(&current.image),
            },
            track_title: current.name,
            track_artists: vec![artist],
            progress_ms: 0,
            duration_ms: 0,
            tags,
            previous_track,
            next_track: None,
            provider: Some(ProviderKind::Scrobble),
            ..PlaybackRecord::default()
        })
    }

    fn supports_month_favorite(&self) -> bool {
        true
    }

    async fn month_favorite(&self) -> Option<TopTrack> {
        if !self.configured() {
            return None;
        }

        let result: Result<TopTracksResponse, FetchError> = lastfm_get(
            &self.api,
            &self.api_key,
            "user.gettoptracks",
            &[("user", self.username.as_str()), ("period", "1month"), ("limit", "1")],
        )
        .await;

        let top = match result {
            Ok(top) => top,
            Err(err) => {
                warn!(error = %err, "last.fm top track fetch failed");
                return None;
            }
        };

        let track = top.toptracks?.track.into_vec().into_iter().next()?;
        Some(TopTrack {
            artist: track.artist.display(),
            image_url: select_image(&track.image),
            play_count: track.playcount.and_then(|p| p.trim().parse().ok()),
            title: track.name,
        })
    }
}
