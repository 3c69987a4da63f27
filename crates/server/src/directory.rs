//! Member directory client
//!
//! The platform's member CRUD lives outside this engine; the only thing the
//! chat core asks of it is an avatar for a display name. The lookup is
//! best-effort with a short timeout; on any failure we fall back to a
//! deterministic generated avatar so presence snapshots always render.

use serde::Deserialize;
use std::time::Duration;

use koinonia_shared::avatar::fallback_avatar;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

pub struct DirectoryClient {
    base_url: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(rename = "avatarRef")]
    avatar_ref: Option<String>,
}

impl DirectoryClient {
    pub fn new(base_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { base_url, http }
    }

    /// Resolve an avatar for a participant name
    pub async fn avatar_for(&self, name: &str) -> String {
        if let Some(base) = &self.base_url {
            match self.lookup(base, name).await {
                Ok(Some(avatar_ref)) if !avatar_ref.is_empty() => return avatar_ref,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(name = %name, error = %e, "Directory lookup failed; using fallback avatar");
                }
            }
        }
        fallback_avatar(name)
    }

    async fn lookup(&self, base: &str, name: &str) -> Result<Option<String>, reqwest::Error> {
        let url = format!("{}/users/{}", base.trim_end_matches('/'), name);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let profile: ProfileResponse = response.json().await?;
        Ok(profile.avatar_ref)
    }
}
