//! Last.fm access shared by the scrobble adapter and the tag enrichment of
//! the subscription adapter.

use crate::error::FetchError;
use crate::http::ApiClient;
use nowify_core::LastfmConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const MAX_TAGS: usize = 3;

/// Last.fm collapses single-element lists into a bare object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Calls one Last.fm `method` and decodes the payload, surfacing the
/// `{"error": n, "message": ".."}` envelope as [`FetchError::Api`].
pub(crate) async fn lastfm_get<T: DeserializeOwned>(
    api: &ApiClient,
    api_key: &str,
    method: &str,
    params: &[(&str, &str)],
) -> Result<T, FetchError> {
    let mut query: Vec<(&str, &str)> = vec![("method", method), ("api_key", api_key), ("format", "json")];
    query.extend_from_slice(params);

    let raw: Value = api.get_json("", &query, None).await?;
    if let Some(code) = raw.get("error").and_then(Value::as_i64) {
        let message = raw
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(FetchError::Api { code, message });
    }
    Ok(serde_json::from_value(raw)?)
}

#[derive(Debug, Deserialize)]
struct TopTagsResponse {
    toptags: Option<TopTags>,
}

#[derive(Debug, Deserialize)]
struct TopTags {
    #[serde(default)]
    tag: OneOrMany<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Ranked tag lookup (`track.gettoptags`).
#[derive(Debug, Clone)]
pub struct TagLookup {
    api: Option<ApiClient>,
    api_key: String,
}

impl TagLookup {
    pub fn new(client: reqwest::Client, cfg: &LastfmConfig) -> Result<Self, FetchError> {
        if !cfg.has_api_key() {
            return Ok(Self::disabled());
        }
        Ok(Self {
            api: Some(ApiClient::new(client, &cfg.api_base)?),
            api_key: cfg.api_key.clone(),
        })
    }

    pub fn disabled() -> Self {
        Self {
            api: None,
            api_key: String::new(),
        }
    }

    /// First [`MAX_TAGS`] tags in ranking order; empty on any failure.
    pub async fn lookup(&self, artist: &str, track: &str) -> Vec<String> {
        match self.fetch(artist, track).await {
            Ok(tags) => tags,
            Err(err) => {
                warn!(error = %err, artist, track, "tag lookup failed");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, artist: &str, track: &str) -> Result<Vec<String>, FetchError> {
        let Some(api) = &self.api else {
            debug!("tag lookup disabled: no Last.fm api key");
            return Ok(Vec::new());
        };
        if artist.is_empty() || track.is_empty() {
            return Ok(Vec::new());
        }

        let response: TopTagsResponse = lastfm_get(
            api,
            &self.api_key,
            "track.gettoptags",
            &[("artist", artist), ("track", track), ("autocorrect", "1")],
        )
        .await?;

        Ok(response
            .toptags
            .map(|t| t.tag.into_vec())
            .unwrap_or_default()
            .into_iter()
            .take(MAX_TAGS)
            .map(|t| t.name)
            .collect())
    }
}
