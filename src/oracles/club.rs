//! Club membership lookups.
//!
//! Club members are trusted unconditionally. The directory answers
//! `GET {base}/user/by_telegram_id/{id}.json?service_token=...`.

#[cfg(test)]
use std::collections::HashSet;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use teloxide::types::UserId;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheConfig, TypedCache};
use crate::config::ClubApi;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    user: Option<serde_json::Value>,
}

enum Backend {
    Disabled,
    #[cfg(test)]
    Fixed(HashSet<u64>),
    Api {
        client: reqwest::Client,
        base: Url,
        token: String,
    },
}

/// Membership oracle with a short-lived answer cache.
pub struct ClubDirectory {
    backend: Backend,
    answers: TypedCache<u64, bool>,
}

impl ClubDirectory {
    /// Directory backed by the club API, or disabled when none is configured.
    pub fn new(api: Option<&ClubApi>) -> Self {
        let backend = match api {
            None => Backend::Disabled,
            Some(api) => match Self::client(api) {
                Ok(backend) => backend,
                Err(e) => {
                    warn!("Club lookups disabled: {}", e);
                    Backend::Disabled
                }
            },
        };

        Self::with_backend(backend)
    }

    /// Directory with a fixed member list.
    #[cfg(test)]
    pub fn with_members<I: IntoIterator<Item = u64>>(ids: I) -> Self {
        Self::with_backend(Backend::Fixed(ids.into_iter().collect()))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            answers: TypedCache::new("club_membership", CacheConfig::membership()),
        }
    }

    fn client(api: &ClubApi) -> anyhow::Result<Backend> {
        let mut base = Url::parse(&api.url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("{} cannot be used as a base url", api.url);
        }
        // Path segments are appended per lookup.
        if base.path().ends_with('/') {
            base.path_segments_mut()
                .map_err(|_| anyhow::anyhow!("bad base url"))?
                .pop_if_empty();
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Backend::Api {
            client,
            base,
            token: api.token.clone(),
        })
    }

    /// True when the user is a club member. Lookup failures answer `false`.
    pub async fn is_member(&self, user: UserId) -> bool {
        match &self.backend {
            Backend::Disabled => false,
            #[cfg(test)]
            Backend::Fixed(ids) => ids.contains(&user.0),
            Backend::Api {
                client,
                base,
                token,
            } => {
                if let Some(answer) = self.answers.get(&user.0) {
                    return answer;
                }
                match lookup(client, base, token, user).await {
                    Ok(answer) => {
                        self.answers.insert(user.0, answer);
                        answer
                    }
                    Err(e) => {
                        warn!("Club lookup for {} failed: {}", user, e);
                        false
                    }
                }
            }
        }
    }
}

fn lookup_url(base: &Url, token: &str, user: UserId) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .push("user")
            .push("by_telegram_id")
            .push(&format!("{}.json", user.0));
    }
    url.query_pairs_mut().append_pair("service_token", token);
    url
}

async fn lookup(
    client: &reqwest::Client,
    base: &Url,
    token: &str,
    user: UserId,
) -> anyhow::Result<bool> {
    let response = client.get(lookup_url(base, token, user)).send().await?;

    match response.status() {
        StatusCode::NOT_FOUND => Ok(false),
        status if status.is_success() => {
            let body: LookupResponse = response.json().await?;
            let member = body.user.is_some_and(|u| !u.is_null());
            debug!("Club lookup for {}: member={}", user, member);
            Ok(member)
        }
        status => anyhow::bail!("club api answered {}", status),
    }
}
