//! Membership enumerator: tiered retrieval of a group's full roster.
//!
//! The directory's bulk fetch is unreliable on large groups, so retrieval
//! walks a small state machine:
//!
//! ```text
//!   Bulk ──sufficient──────────────────────────────▶ done
//!    │ insufficient                ▲
//!    ▼                             │ ok
//!   Supplemental ──────────────────┘
//!    │ transport error
//!    ▼
//!   CursorFallback ──ok──▶ done
//!    ▲        └──error──▶ empty result
//!    └── Bulk transport error
//! ```
//!
//! Every tier accumulates into one id-keyed set, so overlap between tiers is
//! never double counted. Bot accounts are dropped from the final output.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::EnumeratorConfig;
use crate::directory::{Group, GroupDirectoryClient, Member};
use crate::error::TransportError;

/// One retrieval strategy in the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// One bulk call sized to the declared member count.
    Bulk,
    /// Bulk refetch plus a bounded number of cursor pages.
    Supplemental,
    /// Strict cursor pagination after a transport error.
    CursorFallback,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Supplemental => "supplemental",
            Self::CursorFallback => "cursor_fallback",
        }
    }
}

/// Outcome of enumerating one group.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Non-bot members, in the order first received.
    pub members: Vec<Member>,
    /// Tiers attempted, in order.
    pub tiers: Vec<Tier>,
    /// Distinct entries retrieved, bots included.
    pub retrieved: usize,
    pub bots_skipped: usize,
    /// Every tier failed; `members` is empty.
    pub failed: bool,
}

/// Insertion-ordered member set keyed by id.
#[derive(Debug, Default)]
struct MemberSet {
    members: Vec<Member>,
    ids: HashSet<String>,
}

impl MemberSet {
    /// Add members not yet present. Returns how many were new.
    fn extend(&mut self, incoming: impl IntoIterator<Item = Member>) -> usize {
        let before = self.members.len();
        for member in incoming {
            if self.ids.insert(member.id.clone()) {
                self.members.push(member);
            }
        }
        self.members.len() - before
    }

    fn last_id(&self) -> Option<&str> {
        self.members.last().map(|m| m.id.as_str())
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

/// Retrieves the best-effort complete roster of a group.
pub struct MembershipEnumerator {
    directory: Arc<dyn GroupDirectoryClient>,
    config: EnumeratorConfig,
}

impl MembershipEnumerator {
    pub fn new(directory: Arc<dyn GroupDirectoryClient>, config: EnumeratorConfig) -> Self {
        Self { directory, config }
    }

    /// Enumerate a group's members. Never fails; an irrecoverable transport
    /// failure yields an empty, `failed` enumeration.
    pub async fn enumerate(&self, group: &Group) -> Enumeration {
        let mut collected = MemberSet::default();
        let mut tiers = Vec::new();
        let mut tier = Tier::Bulk;

        loop {
            tiers.push(tier);
            debug!(group = %group.name, tier = tier.label(), "Enumerating");
            let next = match tier {
                Tier::Bulk => match self.bulk(group, &mut collected).await {
                    Ok(()) if self.is_sufficient(group, collected.len()) => None,
                    Ok(()) => {
                        info!(
                            group = %group.name,
                            retrieved = collected.len(),
                            declared = group.member_count,
                            "Bulk fetch incomplete, supplementing"
                        );
                        Some(Tier::Supplemental)
                    }
                    Err(e) => {
                        warn!(group = %group.name, error = %e, "Bulk fetch failed, paginating");
                        Some(Tier::CursorFallback)
                    }
                },
                Tier::Supplemental => match self.supplemental(group, &mut collected).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(
                            group = %group.name,
                            error = %e,
                            "Supplemental fetch failed, paginating"
                        );
                        Some(Tier::CursorFallback)
                    }
                },
                Tier::CursorFallback => match self.cursor_fallback(group).await {
                    Ok(pages) => {
                        collected.extend(pages.members);
                        None
                    }
                    Err(e) => {
                        error!(group = %group.name, error = %e, "Cursor fallback failed");
                        return Enumeration {
                            tiers,
                            failed: true,
                            ..Enumeration::default()
                        };
                    }
                },
            };

            match next {
                Some(t) => tier = t,
                None => break,
            }
        }

        let retrieved = collected.len();
        let (bots, members): (Vec<Member>, Vec<Member>) =
            collected.members.into_iter().partition(|m| m.bot);

        debug!(
            group = %group.name,
            retrieved,
            bots = bots.len(),
            tiers = ?tiers,
            "Enumeration complete"
        );

        Enumeration {
            members,
            tiers,
            retrieved,
            bots_skipped: bots.len(),
            failed: false,
        }
    }

    fn is_sufficient(&self, group: &Group, retrieved: usize) -> bool {
        retrieved as f64 >= self.config.sufficiency_ratio * group.member_count as f64
    }

    async fn bulk(&self, group: &Group, collected: &mut MemberSet) -> Result<(), TransportError> {
        let members = self
            .directory
            .fetch_all_members(&group.id, group.member_count)
            .await?;
        let added = collected.extend(members);
        debug!(group = %group.name, added, "Bulk fetch returned");
        Ok(())
    }

    async fn supplemental(
        &self,
        group: &Group,
        collected: &mut MemberSet,
    ) -> Result<(), TransportError> {
        self.bulk(group, collected).await?;

        for round in 1..=self.config.supplemental_rounds {
            let cursor = collected.last_id().map(str::to_owned);
            let page = self
                .directory
                .fetch_members_page(&group.id, cursor.as_deref(), self.config.page_size)
                .await?;
            let added = collected.extend(page.members);
            debug!(group = %group.name, round, added, "Supplemental round");

            tokio::time::sleep(self.config.supplemental_delay).await;
            if added == 0 {
                break;
            }
        }

        Ok(())
    }

    async fn cursor_fallback(&self, group: &Group) -> Result<MemberSet, TransportError> {
        let mut pages = MemberSet::default();
        let mut cursor: Option<String> = None;
        let page_size = self.config.page_size as usize;

        for page_no in 1..=self.config.max_pages {
            let page = self
                .directory
                .fetch_members_page(&group.id, cursor.as_deref(), self.config.page_size)
                .await?;

            let received = page.members.len();
            if let Some(last) = page.members.last() {
                cursor = Some(last.id.clone());
            }
            pages.extend(page.members);
            debug!(group = %group.name, page = page_no, received, "Fallback page");

            tokio::time::sleep(self.config.page_delay).await;
            if received < page_size {
                break;
            }
        }

        Ok(pages)
    }
}
