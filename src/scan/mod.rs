//! Membership scan pipeline.
//!
//! Every group flows through:
//! 1. `MembershipEnumerator::enumerate()`: tiered roster retrieval
//! 2. `IdentifierClassifier::classify()`: pure pattern matching
//! 3. `DedupNotifier::consider_match()`: at-most-once emission to the sink
//!
//! `ScanCoordinator` drives the loop and keeps the running totals.

pub mod classifier;
pub mod coordinator;
pub mod dedup;
pub mod enumerator;

pub use classifier::{IdentifierClassifier, MatchCategory, MatchResult};
pub use coordinator::{CoordinatorDeps, GroupReport, PassReport, ScanCoordinator, ScanCounters};
pub use dedup::{DedupNotifier, SeenSet};
pub use enumerator::{Enumeration, MembershipEnumerator, Tier};
