//! Group directory: the roster source the scanner enumerates.
//!
//! The scanner only talks to [`GroupDirectoryClient`]; connection,
//! authentication and wire pagination live in the implementation.

pub mod discord;
pub mod types;

pub use discord::DiscordDirectory;
pub use types::*;

use async_trait::async_trait;

use crate::error::TransportError;

/// Capability surface of a group directory.
#[async_trait]
pub trait GroupDirectoryClient: Send + Sync {
    /// Groups visible to the authenticated account.
    async fn list_groups(&self) -> Result<Vec<Group>, TransportError>;

    /// One page of members after `after` (exclusive), at most `limit` entries.
    async fn fetch_members_page(
        &self,
        group_id: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<MemberPage, TransportError>;

    /// Best-effort bulk fetch of up to `limit` members.
    async fn fetch_all_members(
        &self,
        group_id: &str,
        limit: u64,
    ) -> Result<Vec<Member>, TransportError>;

    /// Per-user profile lookup.
    async fn fetch_user_detail(&self, user_id: &str) -> Result<UserDetail, TransportError>;
}
