//! Notification sink: where matched members are reported.

pub mod webhook;

pub use webhook::WebhookSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::{Group, Member, UserDetail};
use crate::error::DeliveryError;
use crate::scan::classifier::MatchResult;

/// Embed colour used for match notifications.
pub const MATCH_COLOR: u32 = 0x107C10;

/// One labelled value in a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventField {
    pub label: String,
    pub value: String,
    pub inline: bool,
}

impl EventField {
    pub fn inline(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            inline: true,
        }
    }
}

/// Running totals at the moment of emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub scanned: u64,
    pub found: u64,
}

/// Structured record handed to the sink for each newly matched member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Plain-text headline sent alongside the structured body.
    pub headline: String,
    pub title: String,
    pub color: u32,
    pub fields: Vec<EventField>,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    /// Build the event for a member's first match.
    pub fn for_match(
        member: &Member,
        group: &Group,
        hit: &MatchResult,
        detail: Option<&UserDetail>,
        totals: Totals,
        now: DateTime<Utc>,
    ) -> Self {
        let created = member.created_at.format("%d/%m/%Y");
        let age_years = member.account_age_years(now);
        let presence = member.presence;

        let mut fields = vec![
            EventField::inline("👤 Name", format!("`{}`", member.username)),
            EventField::inline("🎮 Gamertag", format!("`{}`", hit.matched_text)),
            EventField::inline("🌐 Group", format!("`{}`", group.name)),
            EventField::inline(
                format!("{} Status", presence.emoji()),
                format!("`{}`", presence.label()),
            ),
            EventField::inline(
                "📅 Account created",
                format!("`{created}` ({age_years} years)"),
            ),
            EventField::inline("🆔 ID", format!("`{}`", member.id)),
            EventField::inline("🔍 Match type", format!("`{}`", hit.category.label())),
        ];
        if let Some(keyword) = &hit.keyword {
            fields.push(EventField::inline("🔑 Keyword", format!("`{keyword}`")));
        }
        fields.push(EventField::inline(
            "📊 Scan",
            format!("Found: {} | Total: {}", totals.found, totals.scanned),
        ));

        Self {
            headline: format!("🎮 **NEW GAMERTAG: `{}`** 🎮", hit.matched_text),
            title: "🎮 GAMERTAG DETECTED 🎮".to_string(),
            color: MATCH_COLOR,
            fields,
            thumbnail_url: member.avatar_url.clone(),
            image_url: detail.and_then(|d| d.banner_url.clone()),
            footer: format!("ID: {} | roster-scan", member.id),
            timestamp: now,
        }
    }

    /// Look up a field value by label.
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
    }
}

/// Downstream receiver of notification events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name for logging.
    fn name(&self) -> &str;

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::directory::Presence;
    use crate::scan::classifier::MatchCategory;

    fn fixture() -> (Member, Group, MatchResult) {
        let member = Member {
            id: "900".into(),
            username: "sniper".into(),
            display_name: Some("Sniper99 (XBL)".into()),
            bot: false,
            presence: Presence::Dnd,
            created_at: Utc.with_ymd_and_hms(2019, 3, 14, 12, 0, 0).unwrap(),
            avatar_url: Some("https://cdn.example/a.png".into()),
        };
        let group = Group {
            id: "g1".into(),
            name: "Halo Night".into(),
            member_count: 10,
        };
        let hit = MatchResult {
            member_id: "900".into(),
            matched_text: "Sniper99".into(),
            category: MatchCategory::SuffixFormat,
            keyword: None,
            source: "Sniper99 (XBL)".into(),
        };
        (member, group, hit)
    }

    #[test]
    fn event_carries_member_and_match_fields() {
        let (member, group, hit) = fixture();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let totals = Totals {
            scanned: 120,
            found: 3,
        };

        let event = NotificationEvent::for_match(&member, &group, &hit, None, totals, now);

        assert_eq!(event.color, MATCH_COLOR);
        assert!(event.headline.contains("Sniper99"));
        assert_eq!(event.field("👤 Name"), Some("`sniper`"));
        assert_eq!(event.field("🎮 Gamertag"), Some("`Sniper99`"));
        assert_eq!(event.field("🌐 Group"), Some("`Halo Night`"));
        assert_eq!(event.field("🔴 Status"), Some("`dnd`"));
        assert_eq!(event.field("📅 Account created"), Some("`14/03/2019` (5 years)"));
        assert_eq!(event.field("🔍 Match type"), Some("`suffix_format`"));
        assert_eq!(event.field("📊 Scan"), Some("Found: 3 | Total: 120"));
        assert!(event.field("🔑 Keyword").is_none());
        assert!(event.fields.iter().all(|f| f.inline));
        assert_eq!(event.thumbnail_url.as_deref(), Some("https://cdn.example/a.png"));
        assert!(event.image_url.is_none());
        assert_eq!(event.timestamp, now);
    }

    #[test]
    fn keyword_and_banner_included_when_present() {
        let (member, group, mut hit) = fixture();
        hit.category = MatchCategory::XboxKeyword;
        hit.keyword = Some("XBL".into());
        let detail = UserDetail {
            id: "900".into(),
            banner_url: Some("https://cdn.example/b.png".into()),
        };

        let event = NotificationEvent::for_match(
            &member,
            &group,
            &hit,
            Some(&detail),
            Totals::default(),
            Utc::now(),
        );

        assert_eq!(event.field("🔑 Keyword"), Some("`XBL`"));
        assert_eq!(event.image_url.as_deref(), Some("https://cdn.example/b.png"));
    }
}
