use crate::error::FetchError;
use crate::http::ApiClient;
use crate::tags::TagLookup;
use crate::MusicProvider;
use async_trait::async_trait;
use nowify_core::{
    AlbumInfo, Credential, CredentialHandle, PlaybackRecord, ProviderKind, TopTrack,
    TrackSummary,
};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

const NOW_PLAYING_PATH: &str = "me/player/currently-playing";
const QUEUE_PATH: &str = "me/player/queue";
const RECENTLY_PLAYED_PATH: &str = "me/player/recently-played";
const TOP_TRACKS_PATH: &str = "me/top/tracks";

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    #[serde(default)]
    is_playing: bool,
    progress_ms: Option<u64>,
    item: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
    #[serde(default)]
    duration_ms: u64,
    popularity: Option<u32>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: Option<String>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    #[serde(default)]
    queue: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayedResponse {
    #[serde(default)]
    items: Vec<PlayHistory>,
}

#[derive(Debug, Deserialize)]
struct PlayHistory {
    track: SpotifyTrack,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

impl SpotifyTrack {
    fn artist_names(&self) -> Vec<String> {
        self.artists.iter().map(|a| a.name.clone()).collect()
    }

    /// Spotify lists album art widest first.
    fn image_url(&self) -> Option<String> {
        self.album
            .as_ref()
            .and_then(|a| a.images.first())
            .map(|i| i.url.clone())
    }

    fn summary(&self) -> TrackSummary {
        TrackSummary {
            title: self.name.clone(),
            artist: self.artist_names().join(", "),
            image_url: self.image_url(),
            url: self.external_urls.spotify.clone(),
        }
    }
}

/// Subscription-service adapter backed by the Spotify Web API.
pub struct SpotifyProvider {
    api: ApiClient,
    credential: CredentialHandle,
    tags: TagLookup,
}

impl SpotifyProvider {
    pub fn new(api: ApiClient, credential: CredentialHandle, tags: TagLookup) -> Self {
        Self {
            api,
            credential,
            tags,
        }
    }

    async fn fetch_current(&self, token: &str) -> Result<CurrentlyPlaying, FetchError> {
        self.api
            .get_json(NOW_PLAYING_PATH, &[], Some(token))
            .await
    }

    async fn next_track(&self, token: &str) -> Option<TrackSummary> {
        let result: Result<QueueResponse, FetchError> =
            self.api.get_json(QUEUE_PATH, &[], Some(token)).await;
        match result {
            Ok(queue) => queue.queue.first().map(SpotifyTrack::summary),
            Err(err) => {
                warn!(error = %err, "queue fetch failed");
                None
            }
        }
    }

    async fn previous_track(&self, token: &str) -> Option<TrackSummary> {
        let result: Result<RecentlyPlayedResponse, FetchError> = self
            .api
            .get_json(RECENTLY_PLAYED_PATH, &[("limit", "1")], Some(token))
            .await;
        match result {
            Ok(recent) => recent.items.first().map(|h| h.track.summary()),
            Err(err) => {
                warn!(error = %err, "recently-played fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl MusicProvider for SpotifyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Subscription
    }

    fn credential(&self) -> Option<watch::Receiver<Credential>> {
        Some(self.credential.subscribe())
    }

    async fn now_playing(&self) -> Option<PlaybackRecord> {
        let Some(token) = self.credential.access_token() else {
            debug!("spotify: no access token; skipping poll");
            return None;
        };

        let current = match self.fetch_current(&token).await {
            Ok(current) => current,
            Err(FetchError::NoContent) => return None,
            Err(err) if err.is_unauthorized() => {
                warn!("spotify rejected the access token; requesting refresh");
                self.credential.request_refresh();
                return None;
            }
            Err(err) => {
                warn!(error = %err, "spotify now-playing fetch failed");
                return None;
            }
        };

        let item = current.item?;

        let (next_track, previous_track, tags) = if current.is_playing {
            let lead_artist = item.artists.first().map(|a| a.name.as_str()).unwrap_or("");
            tokio::join!(
                self.next_track(&token),
                self.previous_track(&token),
                self.tags.lookup(lead_artist, &item.name),
            )
        } else {
            (None, None, Vec::new())
        };

        let duration_ms = item.duration_ms;
        let mut progress_ms = current.progress_ms.unwrap_or(0);
        if duration_ms > 0 {
            progress_ms = progress_ms.min(duration_ms);
        }

        let track_artists = item.artist_names();
        let image_url = item.image_url();
        let album = item.album.unwrap_or(SpotifyAlbum {
            name: None,
            images: Vec::new(),
            release_date: None,
        });

        Some(PlaybackRecord {
            playing: current.is_playing,
            track_id: item.id,
            track_title: item.name,
            track_artists,
            track_url: item.external_urls.spotify,
            album: AlbumInfo {
                title: album.name,
                image_url,
            },
            progress_ms,
            duration_ms,
            release_date: album.release_date,
            popularity: item.popularity,
            tags,
            next_track,
            previous_track,
            top_track: None,
            provider: Some(ProviderKind::Subscription),
        })
    }

    fn supports_month_favorite(&self) -> bool {
        true
    }

    async fn month_favorite(&self) -> Option<TopTrack> {
        let token = self.credential.access_token()?;
        let result: Result<TopTracksResponse, FetchError> = self
            .api
            .get_json(
                TOP_TRACKS_PATH,
                &[("time_range", "short_term"), ("limit", "1")],
                Some(&token),
            )
            .await;

        match result {
            Ok(top) => top.items.first().map(|track| TopTrack {
                title: track.name.clone(),
                artist: track.artist_names().join(", "),
                image_url: track.image_url(),
                play_count: None,
            }),
            Err(err) => {
                warn!(error = %err, "spotify top track fetch failed");
                None
            }
        }
    }
}
