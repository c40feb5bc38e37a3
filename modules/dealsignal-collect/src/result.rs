use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorStatus {
    Success,
    /// Some records errored or the run was cancelled mid-batch; whatever
    /// was persisted before that stands.
    PartialSuccess,
    DryRun,
    /// The fetch itself failed; nothing was persisted.
    Error,
    /// The source answered but had no data for the window.
    NotFound,
}

impl std::fmt::Display for CollectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorStatus::Success => write!(f, "success"),
            CollectorStatus::PartialSuccess => write!(f, "partial_success"),
            CollectorStatus::DryRun => write!(f, "dry_run"),
            CollectorStatus::Error => write!(f, "error"),
            CollectorStatus::NotFound => write!(f, "not_found"),
        }
    }
}

/// Accounting for one collector run.
///
/// `signals_found` counts candidates that reached the save path: new
/// saves, suppressed skips, and per-signal errors. Candidates skipped as
/// already-known duplicates are tallied separately, so
/// `signals_found = signals_new + signals_suppressed + |errors|` holds on
/// every run.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorResult {
    pub collector: String,
    pub status: CollectorStatus,
    pub signals_found: u32,
    pub signals_new: u32,
    pub signals_suppressed: u32,
    pub signals_duplicate: u32,
    pub dry_run: bool,
    pub cancelled: bool,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl CollectorResult {
    pub fn new(collector: &str, dry_run: bool) -> Self {
        Self {
            collector: collector.to_string(),
            status: CollectorStatus::Success,
            signals_found: 0,
            signals_new: 0,
            signals_suppressed: 0,
            signals_duplicate: 0,
            dry_run,
            cancelled: false,
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn accounting_holds(&self) -> bool {
        self.signals_found == self.signals_new + self.signals_suppressed + self.errors.len() as u32
    }
}

impl std::fmt::Display for CollectorResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<18} {:<16} found={:<4} new={:<4} suppressed={:<4} duplicate={:<4} errors={}",
            self.collector,
            self.status.to_string(),
            self.signals_found,
            self.signals_new,
            self.signals_suppressed,
            self.signals_duplicate,
            self.errors.len(),
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Aggregate over one `collect` invocation.
#[derive(Debug, Default, Serialize)]
pub struct CollectRunSummary {
    pub results: Vec<CollectorResult>,
}

impl CollectRunSummary {
    pub fn push(&mut self, result: CollectorResult) {
        self.results.push(result);
    }

    pub fn total_new(&self) -> u32 {
        self.results.iter().map(|r| r.signals_new).sum()
    }

    pub fn total_suppressed(&self) -> u32 {
        self.results.iter().map(|r| r.signals_suppressed).sum()
    }

    /// Any collector errored or partially succeeded.
    pub fn had_failures(&self) -> bool {
        self.results.iter().any(|r| {
            matches!(
                r.status,
                CollectorStatus::Error | CollectorStatus::PartialSuccess
            )
        })
    }
}

impl std::fmt::Display for CollectRunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Collect Run ===")?;
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        writeln!(
            f,
            "\nTotal: {} new, {} suppressed across {} collectors",
            self.total_new(),
            self.total_suppressed(),
            self.results.len()
        )?;
        for result in &self.results {
            for error in &result.errors {
                writeln!(f, "  [{}] {error}", result.collector)?;
            }
        }
        Ok(())
    }
}
