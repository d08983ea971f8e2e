use crate::error::FetchError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("nowify/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// JSON GET helper rooted at one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(client: Client, base: &str) -> Result<Self, FetchError> {
        let mut base = Url::parse(base)?;
        // `Url::join` drops the last path segment unless it ends with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<T, FetchError> {
        let url = self.base.join(path)?;
        debug!(url = %url, params = query.len(), "GET");

        let mut request = self.client.get(url).query(query);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::NO_CONTENT {
            return Err(FetchError::from_status(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::NoContent);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{build_client, ApiClient};
    use std::time::Duration;

    #[test]
    fn base_without_trailing_slash_keeps_last_segment() {
        let client = build_client(Duration::from_secs(1)).unwrap();
        let api = ApiClient::new(client, "https://api.example.com/v1").unwrap();

        let joined = api.base().join("me/player").unwrap();
        assert_eq!(joined.as_str(), "https://api.example.com/v1/me/player");
    }

    #[test]
    fn rejects_invalid_base() {
        let client = build_client(Duration::from_secs(1)).unwrap();
        assert!(ApiClient::new(client, "::nope").is_err());
    }
}
