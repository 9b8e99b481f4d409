//! At-most-once notification of matched members.
//!
//! The [`SeenSet`] lives for the whole process and is shared (cloned handle)
//! between the coordinator and the notifier. Its test-and-insert is the only
//! synchronization point for the at-most-once guarantee.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::directory::{Group, Member, UserDetail};
use crate::notify::{NotificationEvent, NotificationSink};
use crate::scan::classifier::MatchResult;
use crate::scan::coordinator::ScanCounters;
use crate::rate_limit::RateLimiter;

/// Process-lifetime set of member identifiers already notified.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `member_id`. Returns `true` only for the first insert.
    pub fn insert(&self, member_id: &str) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.contains(member_id) {
            return false;
        }
        guard.insert(member_id.to_string())
    }

    pub fn contains(&self, member_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(member_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Emits one notification per newly matched member.
pub struct DedupNotifier {
    seen: SeenSet,
    sink: Arc<dyn NotificationSink>,
    limiter: Arc<RateLimiter>,
    counters: Arc<ScanCounters>,
}

impl DedupNotifier {
    pub fn new(
        seen: SeenSet,
        sink: Arc<dyn NotificationSink>,
        limiter: Arc<RateLimiter>,
        counters: Arc<ScanCounters>,
    ) -> Self {
        Self {
            seen,
            sink,
            limiter,
            counters,
        }
    }

    /// Consider a match for emission. Returns whether an event was emitted.
    ///
    /// The member is marked seen before delivery and stays seen when the sink
    /// fails: a lost notification is preferred over a duplicate one.
    pub async fn consider_match(
        &self,
        member: &Member,
        group: &Group,
        hit: &MatchResult,
        detail: Option<&UserDetail>,
    ) -> bool {
        if !self.seen.insert(&member.id) {
            return false;
        }

        let totals = self.counters.record_found();
        let event = NotificationEvent::for_match(member, group, hit, detail, totals, Utc::now());

        info!(
            member_id = %member.id,
            gamertag = %hit.matched_text,
            category = hit.category.label(),
            group = %group.name,
            "Match found"
        );

        self.limiter.acquire().await;
        if let Err(e) = self.sink.deliver(&event).await {
            warn!(
                sink = self.sink.name(),
                member_id = %member.id,
                error = %e,
                "Notification delivery failed"
            );
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::directory::Presence;
    use crate::error::DeliveryError;
    use crate::scan::classifier::MatchCategory;

    /// Sink that records events and optionally fails.
    #[derive(Default)]
    struct RecordingSink {
        events: AsyncMutex<Vec<NotificationEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
            self.events.lock().await.push(event.clone());
            if self.fail {
                return Err(DeliveryError::Rejected {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn member(id: &str) -> Member {
        Member {
            id: id.into(),
            username: format!("user{id}"),
            display_name: None,
            bot: false,
            presence: Presence::Online,
            created_at: Utc::now(),
            avatar_url: None,
        }
    }

    fn group(name: &str) -> Group {
        Group {
            id: name.into(),
            name: name.into(),
            member_count: 1,
        }
    }

    fn hit(member_id: &str) -> MatchResult {
        MatchResult {
            member_id: member_id.into(),
            matched_text: "Player99".into(),
            category: MatchCategory::GtFormat,
            keyword: None,
            source: "GT: Player99".into(),
        }
    }

    fn notifier(sink: Arc<RecordingSink>) -> (DedupNotifier, SeenSet, Arc<ScanCounters>) {
        let seen = SeenSet::new();
        let counters = Arc::new(ScanCounters::default());
        let notifier = DedupNotifier::new(
            seen.clone(),
            sink,
            Arc::new(RateLimiter::unlimited()),
            Arc::clone(&counters),
        );
        (notifier, seen, counters)
    }

    #[test]
    fn seen_set_insert_is_first_wins() {
        let seen = SeenSet::new();
        assert!(seen.is_empty());
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.contains("a"));
        assert!(!seen.contains("b"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn seen_set_clones_share_state() {
        let seen = SeenSet::new();
        let other = seen.clone();
        assert!(seen.insert("x"));
        assert!(other.contains("x"));
        assert!(!other.insert("x"));
    }

    #[tokio::test]
    async fn emits_once_per_member() {
        let sink = Arc::new(RecordingSink::default());
        let (notifier, seen, counters) = notifier(Arc::clone(&sink));
        let m = member("1");

        assert!(notifier.consider_match(&m, &group("a"), &hit("1"), None).await);
        assert!(!notifier.consider_match(&m, &group("b"), &hit("1"), None).await);
        assert!(!notifier.consider_match(&m, &group("a"), &hit("1"), None).await);

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        // First group wins.
        assert_eq!(events[0].field("🌐 Group"), Some("`a`"));
        assert!(seen.contains("1"));
        assert_eq!(counters.found(), 1);
    }

    #[tokio::test]
    async fn event_carries_running_totals() {
        let sink = Arc::new(RecordingSink::default());
        let (notifier, _seen, counters) = notifier(Arc::clone(&sink));
        counters.record_scanned();
        counters.record_scanned();

        notifier.consider_match(&member("1"), &group("a"), &hit("1"), None).await;
        notifier.consider_match(&member("2"), &group("a"), &hit("2"), None).await;

        let events = sink.events.lock().await;
        assert_eq!(events[0].field("📊 Scan"), Some("Found: 1 | Total: 2"));
        assert_eq!(events[1].field("📊 Scan"), Some("Found: 2 | Total: 2"));
    }

    #[tokio::test]
    async fn delivery_failure_keeps_member_seen() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let (notifier, seen, counters) = notifier(Arc::clone(&sink));
        let m = member("7");

        assert!(notifier.consider_match(&m, &group("a"), &hit("7"), None).await);
        assert!(seen.contains("7"));
        assert!(!notifier.consider_match(&m, &group("a"), &hit("7"), None).await);
        assert_eq!(sink.events.lock().await.len(), 1);
        assert_eq!(counters.found(), 1);
    }

    #[tokio::test]
    async fn concurrent_considers_emit_once() {
        let sink = Arc::new(RecordingSink::default());
        let (notifier, _seen, counters) = notifier(Arc::clone(&sink));
        let notifier = Arc::new(notifier);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let notifier = Arc::clone(&notifier);
            handles.push(tokio::spawn(async move {
                notifier
                    .consider_match(&member("42"), &group("g"), &hit("42"), None)
                    .await
            }));
        }

        let mut emitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                emitted += 1;
            }
        }

        assert_eq!(emitted, 1);
        assert_eq!(sink.events.lock().await.len(), 1);
        assert_eq!(counters.found(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deliveries_are_spaced_by_limiter() {
        let sink = Arc::new(RecordingSink::default());
        let counters = Arc::new(ScanCounters::default());
        let spacing = Duration::from_millis(1500);
        let notifier = DedupNotifier::new(
            SeenSet::new(),
            sink.clone(),
            Arc::new(RateLimiter::new(spacing)),
            counters,
        );

        let start = tokio::time::Instant::now();
        for id in ["1", "2", "3"] {
            notifier.consider_match(&member(id), &group("g"), &hit(id), None).await;
        }

        assert_eq!(sink.events.lock().await.len(), 3);
        assert!(start.elapsed() >= spacing * 2);
    }
}
