use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::models::Profile;

#[derive(Error, Debug)]
pub enum ProfileError {
    /// The upstream API answered 404: no user with that ID exists. Kept
    /// distinct from other failures so handlers can tell "bad ID" from
    /// "API trouble".
    #[error("unknown user id")]
    NotFound,

    #[error("profile API returned status {0}")]
    Status(StatusCode),

    #[error("profile request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Upstream user document; the API calls the username `name`.
#[derive(Deserialize)]
struct UpstreamUser {
    id: u64,
    name: String,
}

/// HTTP client for the third-party profile API.
#[derive(Clone)]
pub struct ProfileClient {
    base_url: String,
    client: reqwest::Client,
}

impl ProfileClient {
    /// `client` should carry an explicit timeout; profile lookups have no
    /// retry, so a hung upstream must not hang the request.
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Fetch one profile. A single call, no retry.
    pub async fn fetch(&self, id: &str) -> Result<Profile, ProfileError> {
        let url = format!("{}/v1/users/{}", self.base_url, id);
        let resp = self.client.get(&url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(ProfileError::NotFound),
            status if !status.is_success() => Err(ProfileError::Status(status)),
            _ => {
                let user: UpstreamUser = resp.json().await?;
                Ok(Profile {
                    id: user.id,
                    username: user.name,
                })
            }
        }
    }

    /// Fetch every profile concurrently; the first failure wins.
    pub async fn fetch_all(&self, ids: &[String]) -> Result<Vec<Profile>, ProfileError> {
        futures_util::future::try_join_all(ids.iter().map(|id| self.fetch(id))).await
    }
}
