//! Discord REST implementation of the group directory.
//!
//! Guilds are groups, guild members are members. The REST surface carries no
//! presence data, so every member is reported `offline`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::directory::{Group, GroupDirectoryClient, Member, MemberPage, Presence, UserDetail};
use crate::error::TransportError;
use crate::rate_limit::RateLimiter;

/// Largest page the members endpoint accepts.
const MAX_PAGE_SIZE: u32 = 1000;

/// Milliseconds between the Unix epoch and the first snowflake.
const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Image size requested for avatar and banner references.
const IMAGE_SIZE: u32 = 1024;

/// Longest server-requested backoff honoured before giving up on a call.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Directory client backed by the Discord REST API.
///
/// Every request, including each page of a bulk fetch, waits on the shared
/// request limiter first.
pub struct DiscordDirectory {
    token: SecretString,
    api_base: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl DiscordDirectory {
    pub fn new(
        token: SecretString,
        api_base: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            token,
            api_base: api_base.into(),
            client: reqwest::Client::new(),
            limiter,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    /// GET and decode `path`. A 429 with a usable `Retry-After` is waited out
    /// once; a second 429 is returned to the caller.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let mut retried = false;
        loop {
            match self.get_once(path, query).await {
                Err(TransportError::RateLimited {
                    retry_after: Some(wait),
                    ..
                }) if !retried && wait <= MAX_RETRY_AFTER => {
                    warn!(
                        endpoint = path,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    retried = true;
                }
                other => return other,
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        self.limiter.acquire().await;
        let resp = self
            .client
            .get(self.api_url(path))
            .header(reqwest::header::AUTHORIZATION, self.token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(TransportError::RateLimited {
                endpoint: path.to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        resp.json::<T>().await.map_err(|e| TransportError::Decode {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// `Retry-After` in (possibly fractional) seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

#[async_trait]
impl GroupDirectoryClient for DiscordDirectory {
    async fn list_groups(&self) -> Result<Vec<Group>, TransportError> {
        let guilds: Vec<GuildPayload> = self
            .get_json("/users/@me/guilds", &[("with_counts", "true".to_string())])
            .await?;
        Ok(guilds.into_iter().map(Group::from).collect())
    }

    async fn fetch_members_page(
        &self,
        group_id: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<MemberPage, TransportError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = after {
            query.push(("after", cursor.to_string()));
        }

        let payload: Vec<MemberPayload> = self
            .get_json(&format!("/guilds/{group_id}/members"), &query)
            .await?;
        let has_more = payload.len() == limit as usize;
        let members = payload.into_iter().filter_map(Member::from_payload).collect();

        Ok(MemberPage { members, has_more })
    }

    async fn fetch_all_members(
        &self,
        group_id: &str,
        limit: u64,
    ) -> Result<Vec<Member>, TransportError> {
        let mut members: Vec<Member> = Vec::new();
        let mut cursor: Option<String> = None;
        // An unknown declared size reads until a short page.
        let target = if limit == 0 { u64::MAX } else { limit };

        while (members.len() as u64) < target {
            let remaining = target - members.len() as u64;
            let page_limit = remaining.min(MAX_PAGE_SIZE as u64) as u32;
            let page = self
                .fetch_members_page(group_id, cursor.as_deref(), page_limit)
                .await?;

            let Some(last) = page.members.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            members.extend(page.members);

            if !page.has_more {
                break;
            }
        }

        tracing::debug!(group_id, count = members.len(), "Bulk member fetch complete");
        Ok(members)
    }

    async fn fetch_user_detail(&self, user_id: &str) -> Result<UserDetail, TransportError> {
        let user: UserPayload = self.get_json(&format!("/users/{user_id}"), &[]).await?;
        let banner_url = user
            .banner
            .as_deref()
            .map(|hash| cdn_url("banners", &user.id, hash));
        Ok(UserDetail {
            id: user.id,
            banner_url,
        })
    }
}

// ── Wire payloads ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GuildPayload {
    id: String,
    name: String,
    #[serde(default)]
    approximate_member_count: Option<u64>,
}

impl From<GuildPayload> for Group {
    fn from(g: GuildPayload) -> Self {
        Self {
            id: g.id,
            name: g.name,
            member_count: g.approximate_member_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    user: Option<UserPayload>,
    #[serde(default)]
    nick: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    banner: Option<String>,
    #[serde(default)]
    bot: bool,
}

impl Member {
    fn from_payload(payload: MemberPayload) -> Option<Self> {
        let user = payload.user?;
        let created_at = snowflake_timestamp(&user.id).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let avatar_url = user
            .avatar
            .as_deref()
            .map(|hash| cdn_url("avatars", &user.id, hash));

        Some(Self {
            display_name: payload.nick.or(user.global_name),
            id: user.id,
            username: user.username,
            bot: user.bot,
            presence: Presence::Offline,
            created_at,
            avatar_url,
        })
    }
}

/// Creation time encoded in a snowflake identifier.
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.parse().ok()?;
    let millis = (raw >> 22) as i64 + SNOWFLAKE_EPOCH_MS;
    DateTime::from_timestamp_millis(millis)
}

fn cdn_url(kind: &str, user_id: &str, hash: &str) -> String {
    let ext = if hash.starts_with("a_") { "gif" } else { "png" };
    format!("{CDN_BASE}/{kind}/{user_id}/{hash}.{ext}?size={IMAGE_SIZE}")
}
