//! Shared types for the group directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Group ───────────────────────────────────────────────────────────

/// A remote group whose roster can be enumerated.
///
/// Snapshot taken when the pass starts; `member_count` is the directory's
/// own approximation and may be stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub member_count: u64,
}

// ── Member ──────────────────────────────────────────────────────────

/// Presence status as reported by the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Online,
    Idle,
    Dnd,
    #[default]
    Offline,
}

impl Presence {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Offline => "offline",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Online => "🟢",
            Self::Idle => "🟡",
            Self::Dnd => "🔴",
            Self::Offline => "⚫",
        }
    }
}

/// One entry in a group's roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Stable unique identifier.
    pub id: String,
    /// Primary display identifier (account username).
    pub username: String,
    /// Secondary display identifier (group nickname or global alias).
    pub display_name: Option<String>,
    /// Automated account flag. Bots never leave the enumerator.
    pub bot: bool,
    pub presence: Presence,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
    pub avatar_url: Option<String>,
}

impl Member {
    /// Identifiers to classify, primary first. The alias is included only
    /// when it differs from the primary.
    pub fn candidate_identifiers(&self) -> Vec<&str> {
        let mut names = vec![self.username.as_str()];
        if let Some(alias) = self.display_name.as_deref()
            && !alias.is_empty()
            && alias != self.username
        {
            names.push(alias);
        }
        names
    }

    /// Whole years since account creation, relative to `now`.
    pub fn account_age_years(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created_at).num_days().max(0) / 365
    }
}

/// One page of a cursor-paginated member listing.
#[derive(Debug, Clone, Default)]
pub struct MemberPage {
    pub members: Vec<Member>,
    pub has_more: bool,
}

/// Extra profile data available only through a per-user lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDetail {
    pub id: String,
    pub banner_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(username: &str, display_name: Option<&str>) -> Member {
        Member {
            id: "1".into(),
            username: username.into(),
            display_name: display_name.map(String::from),
            bot: false,
            presence: Presence::Offline,
            created_at: Utc::now(),
            avatar_url: None,
        }
    }

    #[test]
    fn candidates_include_distinct_alias() {
        let m = member("alice", Some("Alice [XBL]"));
        assert_eq!(m.candidate_identifiers(), vec!["alice", "Alice [XBL]"]);
    }

    #[test]
    fn candidates_skip_identical_alias() {
        let m = member("alice", Some("alice"));
        assert_eq!(m.candidate_identifiers(), vec!["alice"]);
    }

    #[test]
    fn candidates_skip_missing_or_empty_alias() {
        assert_eq!(member("bob", None).candidate_identifiers(), vec!["bob"]);
        assert_eq!(member("bob", Some("")).candidate_identifiers(), vec!["bob"]);
    }

    #[test]
    fn account_age_in_whole_years() {
        let now = Utc::now();
        let mut m = member("carol", None);
        m.created_at = now - chrono::Duration::days(365 * 3 + 100);
        assert_eq!(m.account_age_years(now), 3);

        m.created_at = now + chrono::Duration::days(10);
        assert_eq!(m.account_age_years(now), 0);
    }

    #[test]
    fn presence_labels() {
        assert_eq!(Presence::default(), Presence::Offline);
        assert_eq!(Presence::Dnd.label(), "dnd");
        assert_eq!(Presence::Online.emoji(), "🟢");
        assert_eq!(
            serde_json::to_value(Presence::Idle).unwrap(),
            serde_json::json!("idle")
        );
    }
}
