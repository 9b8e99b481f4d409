//! Scan coordinator: drives groups through enumerate → classify → notify.
//!
//! Groups and members are processed sequentially. A shutdown flag is checked
//! before each group and each member; the unit in progress always finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{PacingConfig, ScanConfig};
use crate::directory::{Group, GroupDirectoryClient, Member};
use crate::error::{self, GroupScanError};
use crate::notify::{NotificationSink, Totals};
use crate::scan::classifier::IdentifierClassifier;
use crate::scan::dedup::{DedupNotifier, SeenSet};
use crate::scan::enumerator::{MembershipEnumerator, Tier};
use crate::rate_limit::RateLimiter;

/// Process-wide running totals.
#[derive(Debug, Default)]
pub struct ScanCounters {
    scanned: AtomicU64,
    found: AtomicU64,
}

impl ScanCounters {
    /// Count one scanned member. Returns the new total.
    pub fn record_scanned(&self) -> u64 {
        self.scanned.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count one emitted match. Returns the totals including it.
    pub fn record_found(&self) -> Totals {
        let found = self.found.fetch_add(1, Ordering::Relaxed) + 1;
        Totals {
            scanned: self.scanned(),
            found,
        }
    }

    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    pub fn found(&self) -> u64 {
        self.found.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Totals {
        Totals {
            scanned: self.scanned(),
            found: self.found(),
        }
    }
}

/// Per-group scan summary.
#[derive(Debug, Clone, Default)]
pub struct GroupReport {
    pub group_name: String,
    pub declared: u64,
    /// Non-bot members returned by the enumerator.
    pub enumerated: usize,
    pub scanned: u64,
    pub found: u64,
    pub tiers: Vec<Tier>,
    /// Enumeration failed on every tier.
    pub enumeration_failed: bool,
    /// The scan stopped early on shutdown.
    pub interrupted: bool,
}

/// Summary of one full pass over all groups.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Groups visible to the account when the pass started.
    pub groups_listed: usize,
    pub groups: Vec<GroupReport>,
    /// Groups whose scan aborted unexpectedly.
    pub aborted: Vec<String>,
    /// Process-wide totals after the pass.
    pub totals: Totals,
    pub interrupted: bool,
}

/// Collaborators and tuning for a [`ScanCoordinator`].
pub struct CoordinatorDeps {
    pub directory: Arc<dyn GroupDirectoryClient>,
    pub enumerator: MembershipEnumerator,
    pub classifier: IdentifierClassifier,
    pub notifier: DedupNotifier,
    pub seen: SeenSet,
    pub counters: Arc<ScanCounters>,
    pub pacing: PacingConfig,
}

/// Drives scan passes and owns the running totals.
pub struct ScanCoordinator {
    directory: Arc<dyn GroupDirectoryClient>,
    enumerator: MembershipEnumerator,
    classifier: IdentifierClassifier,
    notifier: DedupNotifier,
    seen: SeenSet,
    counters: Arc<ScanCounters>,
    emit_pacing: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ScanCoordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        Self {
            directory: deps.directory,
            enumerator: deps.enumerator,
            classifier: deps.classifier,
            notifier: deps.notifier,
            seen: deps.seen,
            counters: deps.counters,
            emit_pacing: deps.pacing.emit_pacing,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wire a coordinator and its pipeline from configuration.
    pub fn from_config(
        config: &ScanConfig,
        directory: Arc<dyn GroupDirectoryClient>,
        sink: Arc<dyn NotificationSink>,
    ) -> error::Result<Self> {
        let mut classifier = IdentifierClassifier::default_rules();
        for pattern in &config.extra_keywords {
            classifier.add_keyword_rule(pattern)?;
        }

        let notify_limiter = Arc::new(RateLimiter::new(config.pacing.notify_spacing));
        let seen = SeenSet::new();
        let counters = Arc::new(ScanCounters::default());

        Ok(Self::new(CoordinatorDeps {
            enumerator: MembershipEnumerator::new(
                Arc::clone(&directory),
                config.enumerator.clone(),
            ),
            notifier: DedupNotifier::new(seen.clone(), sink, notify_limiter, Arc::clone(&counters)),
            directory,
            classifier,
            seen,
            counters,
            pacing: config.pacing.clone(),
        }))
    }

    /// Flag that stops the scan before the next group or member.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn counters(&self) -> &ScanCounters {
        &self.counters
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Run one pass over every visible group.
    ///
    /// Only the group listing can fail the pass. Each group runs in its own
    /// task so a panic inside one group is contained to it.
    pub async fn run_pass(self: &Arc<Self>) -> error::Result<PassReport> {
        let groups = self.directory.list_groups().await?;
        info!(groups = groups.len(), "Starting scan pass");

        let mut report = PassReport {
            groups_listed: groups.len(),
            ..PassReport::default()
        };
        for group in groups {
            if self.is_shutting_down() {
                report.interrupted = true;
                break;
            }

            let this = Arc::clone(self);
            let name = group.name.clone();
            match tokio::spawn(async move { this.scan_group(&group).await }).await {
                Ok(group_report) => {
                    report.interrupted |= group_report.interrupted;
                    report.groups.push(group_report);
                }
                Err(e) => {
                    let err = GroupScanError::Aborted {
                        group: name.clone(),
                        reason: e.to_string(),
                    };
                    error!(error = %err, "Group scan aborted");
                    report.aborted.push(name);
                }
            }
        }

        report.totals = self.counters.snapshot();
        info!(
            scanned = report.totals.scanned,
            found = report.totals.found,
            groups = report.groups.len(),
            "Scan pass finished"
        );
        Ok(report)
    }

    /// Scan a single group.
    pub async fn scan_group(&self, group: &Group) -> GroupReport {
        info!(group = %group.name, declared = group.member_count, "Scanning group");

        let enumeration = self.enumerator.enumerate(group).await;
        let mut report = GroupReport {
            group_name: group.name.clone(),
            declared: group.member_count,
            enumerated: enumeration.members.len(),
            tiers: enumeration.tiers,
            enumeration_failed: enumeration.failed,
            ..GroupReport::default()
        };

        for (index, member) in enumeration.members.iter().enumerate() {
            if self.is_shutting_down() {
                report.interrupted = true;
                break;
            }

            report.scanned += 1;
            self.counters.record_scanned();
            if (index + 1) % 50 == 0 {
                debug!(
                    group = %group.name,
                    progress = index + 1,
                    total = report.enumerated,
                    "Scan progress"
                );
            }

            if self.process_member(member, group).await {
                report.found += 1;
                tokio::time::sleep(self.emit_pacing).await;
            }
        }

        info!(
            group = %group.name,
            scanned = report.scanned,
            found = report.found,
            "Group scanned"
        );
        report
    }

    /// Classify one member and hand a hit to the notifier. Returns whether a
    /// notification was emitted.
    async fn process_member(&self, member: &Member, group: &Group) -> bool {
        if self.seen.contains(&member.id) {
            return false;
        }

        let Some(hit) = self.classifier.classify(member) else {
            return false;
        };

        let detail = match self.directory.fetch_user_detail(&member.id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!(member_id = %member.id, error = %e, "User detail lookup failed");
                None
            }
        };

        self.notifier
            .consider_match(member, group, &hit, detail.as_ref())
            .await
    }
}
