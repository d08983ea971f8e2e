use crate::error::FetchError;
use crate::http::ApiClient;
use crate::MusicProvider;
use async_trait::async_trait;
use nowify_core::{
    urls, AlbumInfo, Credential, CredentialHandle, PlaybackRecord, ProviderKind, TrackSummary,
};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

const ACTIVITIES_PATH: &str = "activities";
const ALBUM_LABEL: &str = "YouTube History";

#[derive(Debug, Deserialize)]
struct ActivityList {
    #[serde(default)]
    items: Vec<Activity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Activity {
    snippet: Snippet,
    #[serde(default)]
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    upload: Option<Upload>,
    like: Option<ResourceRef>,
    playlist_item: Option<ResourceRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Upload {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRef {
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

impl Activity {
    fn video_id(&self) -> Option<String> {
        let details = &self.content_details;
        details
            .upload
            .as_ref()
            .map(|u| u.video_id.clone())
            .or_else(|| details.like.as_ref().and_then(|l| l.resource_id.video_id.clone()))
            .or_else(|| {
                details
                    .playlist_item
                    .as_ref()
                    .and_then(|p| p.resource_id.video_id.clone())
            })
    }
}

/// Video-service adapter reading the signed-in user's YouTube activity feed.
///
/// The feed has no notion of playback position, so progress and duration are
/// always zero and local interpolation stays off.
pub struct YouTubeProvider {
    api: ApiClient,
    credential: CredentialHandle,
}

impl YouTubeProvider {
    pub fn new(api: ApiClient, credential: CredentialHandle) -> Self {
        Self { api, credential }
    }

    async fn fetch_activities(&self, token: &str) -> Result<ActivityList, FetchError> {
        self.api
            .get_json(
                ACTIVITIES_PATH,
                &[
                    ("part", "snippet,contentDetails"),
                    ("mine", "true"),
                    ("maxResults", "2"),
                ],
                Some(token),
            )
            .await
    }
}

#[async_trait]
impl MusicProvider for YouTubeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Video
    }

    fn credential(&self) -> Option<watch::Receiver<Credential>> {
        Some(self.credential.subscribe())
    }

    async fn now_playing(&self) -> Option<PlaybackRecord> {
        let Some(token) = self.credential.access_token() else {
            debug!("youtube: no access token; skipping poll");
            return None;
        };

        let activities = match self.fetch_activities(&token).await {
            Ok(list) => list,
            Err(err) if err.is_unauthorized() => {
                warn!("youtube rejected the access token; requesting refresh");
                self.credential.request_refresh();
                return None;
            }
            Err(err) => {
                warn!(error = %err, "youtube activity fetch failed");
                return None;
            }
        };

        let mut items = activities.items.into_iter();
        let current = items.next()?;
        let previous_track = items.next().map(|prev| {
            let url = prev.video_id().map(|id| urls::youtube_watch_url(&id));
            TrackSummary {
                title: prev.snippet.title,
                artist: prev.snippet.channel_title,
                image_url: prev.snippet.thumbnails.default.map(|t| t.url),
                url,
            }
        });

        let video_id = current.video_id();
        let thumbnails = current.snippet.thumbnails;
        let image_url = thumbnails.high.or(thumbnails.default).map(|t| t.url);

        Some(PlaybackRecord {
            playing: true,
            track_url: video_id.as_deref().map(urls::youtube_watch_url),
            track_id: video_id,
            track_title: current.snippet.title,
            track_artists: vec![current.snippet.channel_title],
            album: AlbumInfo {
                title: Some(ALBUM_LABEL.to_string()),
                image_url,
            },
            progress_ms: 0,
            duration_ms: 0,
            previous_track,
            provider: Some(ProviderKind::Video),
            ..PlaybackRecord::default()
        })
    }
}
