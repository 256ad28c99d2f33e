//! Per-resource migration report

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Which half of a request produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Configuration text
    Config,
    /// State document
    State,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "config",
            Self::State => "state",
        })
    }
}

/// What happened to one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// At least one transform changed the resource
    Transformed,
    /// A migrator ran and nothing needed changing
    NoOp,
    /// Migrated as far as possible; an operator has to follow up
    ManualAction(String),
    /// No migrator is registered for the type
    Unhandled,
}

impl Outcome {
    /// Check whether an operator has to follow up
    #[inline]
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::ManualAction(_))
    }
}

/// Report entry for one resource address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    /// Resource or instance address
    pub address: String,
    /// Request half
    pub phase: Phase,
    /// Migrator that handled the resource
    pub migrator: Option<String>,
    /// Transforms that changed something, in order
    pub transforms: Vec<String>,
    /// Final outcome
    pub outcome: Outcome,
}

impl ResourceReport {
    /// Entry for a resource about to be migrated
    #[must_use]
    pub fn new(address: impl Into<String>, phase: Phase) -> Self {
        Self {
            address: address.into(),
            phase,
            migrator: None,
            transforms: Vec::new(),
            outcome: Outcome::NoOp,
        }
    }

    /// Entry for a resource without a migrator
    #[must_use]
    pub fn unhandled(address: impl Into<String>, phase: Phase) -> Self {
        Self {
            outcome: Outcome::Unhandled,
            ..Self::new(address, phase)
        }
    }

    /// Set the migrator name
    #[inline]
    #[must_use]
    pub fn with_migrator(mut self, name: impl Into<String>) -> Self {
        self.migrator = Some(name.into());
        self
    }

    /// Record a transform that changed something
    pub fn applied(&mut self, transform: impl Into<String>) {
        self.transforms.push(transform.into());
        if self.outcome == Outcome::NoOp {
            self.outcome = Outcome::Transformed;
        }
    }

    /// Record a follow-up; several reasons are joined
    pub fn manual_action(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.outcome = match std::mem::replace(&mut self.outcome, Outcome::NoOp) {
            Outcome::ManualAction(existing) => Outcome::ManualAction(format!("{existing}; {reason}")),
            _ => Outcome::ManualAction(reason),
        };
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Transformed resources
    pub transformed: usize,
    /// Untouched resources with a migrator
    pub no_op: usize,
    /// Resources needing follow-up
    pub manual_action: usize,
    /// Resources without a migrator
    pub unhandled: usize,
}

impl Display for ReportSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transformed, {} unchanged, {} need manual action, {} unhandled",
            self.transformed, self.no_op, self.manual_action, self.unhandled
        )
    }
}

/// Report of one migration request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    resources: Vec<ResourceReport>,
}

impl MigrationReport {
    /// Create an empty report
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: ResourceReport) {
        self.resources.push(entry);
    }

    /// Entries in processing order
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &[ResourceReport] {
        &self.resources
    }

    /// Entry for an address and phase
    #[must_use]
    pub fn get(&self, address: &str, phase: Phase) -> Option<&ResourceReport> {
        self.resources
            .iter()
            .find(|r| r.address == address && r.phase == phase)
    }

    /// Entries needing follow-up
    pub fn manual_actions(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter().filter(|r| r.outcome.needs_attention())
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if nothing was reported
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Counts per outcome
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for entry in &self.resources {
            match entry.outcome {
                Outcome::Transformed => summary.transformed += 1,
                Outcome::NoOp => summary.no_op += 1,
                Outcome::ManualAction(_) => summary.manual_action += 1,
                Outcome::Unhandled => summary.unhandled += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_follows_recorded_work() {
        let mut entry = ResourceReport::new("old_record.www", Phase::Config).with_migrator("old_record");
        assert_eq!(entry.outcome, Outcome::NoOp);

        entry.applied("rename old_ttl -> ttl");
        assert_eq!(entry.outcome, Outcome::Transformed);

        entry.manual_action("secondary target argo_tiered.main");
        entry.applied("moved marker");
        entry.manual_action("dropped ignore_changes rules[0]");
        assert_eq!(
            entry.outcome,
            Outcome::ManualAction(
                "secondary target argo_tiered.main; dropped ignore_changes rules[0]".into()
            )
        );
        assert_eq!(entry.transforms.len(), 2);
    }

    #[test]
    fn summary_counts_and_serializes() {
        let mut report = MigrationReport::new();
        report.push(ResourceReport::unhandled("x.a", Phase::Config));
        let mut done = ResourceReport::new("y.b", Phase::State);
        done.applied("collapse");
        report.push(done);

        let summary = report.summary();
        assert_eq!(summary.transformed, 1);
        assert_eq!(summary.unhandled, 1);
        assert_eq!(
            summary.to_string(),
            "1 transformed, 0 unchanged, 0 need manual action, 1 unhandled"
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["resources"][0]["outcome"]["kind"], "unhandled");
        assert_eq!(json["resources"][1]["phase"], "state");
        assert!(report.get("y.b", Phase::State).is_some());
        assert_eq!(report.manual_actions().count(), 0);
    }
}
