use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{info, warn};

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::{CancelFlag, Prospect, Signal};
use dealsignal_gate::{evaluate, GateConfig, GateDecision, GateVerdict};
use dealsignal_store::SignalStore;
use notion_client::{ProspectPayload, UpsertAction};

use crate::traits::CrmConnector;

/// Prospects in flight at once. The CRM bucket still caps the actual
/// request rate; this only bounds memory and store contention.
const PUSHER_WORKERS: usize = 4;

/// Ceiling on gate + upsert + mark for a single prospect.
const PROSPECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Outcome of one `process` batch.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub prospects_evaluated: u32,
    pub auto_pushed: u32,
    pub needs_review: u32,
    pub rejected: u32,
    pub held: u32,
    pub skipped_terminal: u32,
    pub error_messages: Vec<String>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn had_failures(&self) -> bool {
        !self.error_messages.is_empty()
    }
}

impl std::fmt::Display for BatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Push Batch ===")?;
        writeln!(f, "Prospects evaluated: {}", self.prospects_evaluated)?;
        writeln!(f, "Auto-pushed:         {}", self.auto_pushed)?;
        writeln!(f, "Needs review:        {}", self.needs_review)?;
        writeln!(f, "Rejected:            {}", self.rejected)?;
        writeln!(f, "Held:                {}", self.held)?;
        writeln!(f, "Skipped (terminal):  {}", self.skipped_terminal)?;
        writeln!(f, "Errors:              {}", self.error_messages.len())?;
        writeln!(f, "Duration:            {}ms", self.duration_ms)?;
        if self.dry_run {
            writeln!(f, "(dry run, nothing written)")?;
        }
        if self.cancelled {
            writeln!(f, "(cancelled mid-batch)")?;
        }
        for error in &self.error_messages {
            writeln!(f, "  {error}")?;
        }
        Ok(())
    }
}

/// What happened to one prospect. Folded into the batch counters as the
/// worker pool drains.
enum ProspectOutcome {
    AutoPushed,
    NeedsReview,
    Rejected,
    Held,
    SkippedTerminal,
    /// CRM trouble scoped to this prospect; its signals stay Pending.
    Failed(String),
    /// Nothing downstream can succeed (schema invalid, store down).
    Fatal(PipelineError),
    Cancelled,
}

/// Batch processor: pending signals -> prospects -> gate -> CRM.
pub struct NotionPusher<C: CrmConnector> {
    store: SignalStore,
    crm: C,
    gate: GateConfig,
}

impl<C: CrmConnector> NotionPusher<C> {
    pub fn new(store: SignalStore, crm: C, gate: GateConfig) -> Self {
        Self { store, crm, gate }
    }

    pub fn crm(&self) -> &C {
        &self.crm
    }

    /// Process up to `limit` pending signals, grouped by canonical key.
    ///
    /// Prospects run through a small worker pool; ordering between them
    /// is not guaranteed. One prospect's failure never aborts the batch;
    /// schema invalidity and store failures do, since nothing after them
    /// can succeed.
    pub async fn process_pending(
        &self,
        limit: Option<i64>,
        dry_run: bool,
        cancel: &CancelFlag,
    ) -> Result<BatchResult> {
        let started = Instant::now();
        let mut result = BatchResult {
            dry_run,
            ..BatchResult::default()
        };

        let pending = self.store.get_pending_signals(limit, None).await?;
        let prospects = group_by_key(pending);
        info!(
            prospects = prospects.len(),
            dry_run, "Processing pending signals"
        );

        // Preflight once for the whole batch, before any worker starts.
        // Workers run concurrently, so a per-prospect check would let a
        // Reject prospect's mark_rejected land while another worker is
        // discovering the schema is invalid. Dry runs never touch the
        // CRM, so they skip this too.
        if !dry_run && !prospects.is_empty() {
            self.crm.require_valid_schema(cancel).await?;
        }

        let mut outcomes = stream::iter(prospects)
            .map(|(canonical_key, signals)| async move {
                let timed = tokio::time::timeout(
                    PROSPECT_TIMEOUT,
                    self.process_one(canonical_key.clone(), signals, dry_run, cancel),
                )
                .await;
                match timed {
                    Ok(outcome) => outcome,
                    Err(_) => ProspectOutcome::Failed(format!(
                        "{canonical_key}: timed out after {}s",
                        PROSPECT_TIMEOUT.as_secs()
                    )),
                }
            })
            .buffer_unordered(PUSHER_WORKERS);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                ProspectOutcome::AutoPushed => {
                    result.prospects_evaluated += 1;
                    result.auto_pushed += 1;
                }
                ProspectOutcome::NeedsReview => {
                    result.prospects_evaluated += 1;
                    result.needs_review += 1;
                }
                ProspectOutcome::Rejected => {
                    result.prospects_evaluated += 1;
                    result.rejected += 1;
                }
                ProspectOutcome::Held => {
                    result.prospects_evaluated += 1;
                    result.held += 1;
                }
                ProspectOutcome::SkippedTerminal => {
                    result.prospects_evaluated += 1;
                    result.skipped_terminal += 1;
                }
                ProspectOutcome::Failed(message) => {
                    result.prospects_evaluated += 1;
                    result.error_messages.push(message);
                }
                // Dropping the stream abandons in-flight prospects;
                // their signals simply stay Pending.
                ProspectOutcome::Fatal(e) => return Err(e),
                ProspectOutcome::Cancelled => {
                    result.cancelled = true;
                    break;
                }
            }
        }
        drop(outcomes);
        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn process_one(
        &self,
        canonical_key: String,
        signals: Vec<Signal>,
        dry_run: bool,
        cancel: &CancelFlag,
    ) -> ProspectOutcome {
        if cancel.is_cancelled() {
            return ProspectOutcome::Cancelled;
        }
        let Some(prospect) = Prospect::from_signals(canonical_key.clone(), signals) else {
            return ProspectOutcome::Held;
        };

        let verdict = evaluate(&canonical_key, &prospect.signals, Utc::now(), &self.gate);

        match verdict.decision {
            GateDecision::AutoPush | GateDecision::NeedsReview => {
                match self.push_prospect(&prospect, &verdict, dry_run, cancel).await {
                    Ok(PushOutcome::Pushed) => match verdict.decision {
                        GateDecision::AutoPush => ProspectOutcome::AutoPushed,
                        _ => ProspectOutcome::NeedsReview,
                    },
                    Ok(PushOutcome::SkippedTerminal) => ProspectOutcome::SkippedTerminal,
                    Err(e @ PipelineError::SchemaInvalid(_)) => ProspectOutcome::Fatal(e),
                    Err(e @ PipelineError::Database(_)) => ProspectOutcome::Fatal(e),
                    Err(PipelineError::Cancelled) => ProspectOutcome::Cancelled,
                    Err(e) => {
                        // Transient or permanent CRM failure: record it,
                        // leave the signals Pending for the next batch.
                        warn!(canonical_key = %canonical_key, error = %e, "Prospect push failed");
                        ProspectOutcome::Failed(format!("{canonical_key}: {e}"))
                    }
                }
            }
            GateDecision::Reject => {
                if !dry_run {
                    if let Err(e) = self.reject_prospect(&prospect, &verdict).await {
                        return ProspectOutcome::Fatal(e);
                    }
                }
                ProspectOutcome::Rejected
            }
            GateDecision::Hold => ProspectOutcome::Held,
        }
    }

    async fn push_prospect(
        &self,
        prospect: &Prospect,
        verdict: &GateVerdict,
        dry_run: bool,
        cancel: &CancelFlag,
    ) -> Result<PushOutcome> {
        let payload = build_payload(prospect, verdict);

        if dry_run {
            return Ok(PushOutcome::Pushed);
        }

        let outcome = self.crm.upsert_prospect(&payload, cancel).await?;
        if outcome.action == UpsertAction::Skipped {
            // The fund already decided against this company; close out the
            // signals so they stop resurfacing every batch.
            for signal in &prospect.signals {
                self.mark_rejected_logged(signal, "terminal status in CRM", verdict)
                    .await;
            }
            return Ok(PushOutcome::SkippedTerminal);
        }

        let metadata = json!({
            "confidence": verdict.confidence,
            "decision": decision_name(verdict.decision),
            "crm_action": format!("{:?}", outcome.action).to_lowercase(),
        });
        for signal in &prospect.signals {
            if let Err(e) = self
                .store
                .mark_pushed(signal.id, &outcome.crm_page_id, metadata.clone())
                .await
            {
                warn!(signal_id = signal.id, error = %e, "mark_pushed failed");
            }
        }
        Ok(PushOutcome::Pushed)
    }

    async fn reject_prospect(&self, prospect: &Prospect, verdict: &GateVerdict) -> Result<()> {
        for signal in &prospect.signals {
            self.mark_rejected_logged(signal, "hard-kill signal present", verdict)
                .await;
        }
        Ok(())
    }

    async fn mark_rejected_logged(&self, signal: &Signal, reason: &str, verdict: &GateVerdict) {
        let metadata = json!({
            "confidence": verdict.confidence,
            "decision": decision_name(verdict.decision),
        });
        if let Err(e) = self.store.mark_rejected(signal.id, reason, metadata).await {
            warn!(signal_id = signal.id, error = %e, "mark_rejected failed");
        }
    }
}

enum PushOutcome {
    Pushed,
    SkippedTerminal,
}

fn decision_name(decision: GateDecision) -> &'static str {
    match decision {
        GateDecision::AutoPush => "auto_push",
        GateDecision::NeedsReview => "needs_review",
        GateDecision::Hold => "hold",
        GateDecision::Reject => "reject",
    }
}

/// Group pending signals into per-company buckets, deterministic order.
fn group_by_key(signals: Vec<Signal>) -> BTreeMap<String, Vec<Signal>> {
    let mut grouped: BTreeMap<String, Vec<Signal>> = BTreeMap::new();
    for signal in signals {
        grouped
            .entry(signal.canonical_key.clone())
            .or_default()
            .push(signal);
    }
    grouped
}

/// Synthesize the CRM payload for one prospect.
pub fn build_payload(prospect: &Prospect, verdict: &GateVerdict) -> ProspectPayload {
    let sources: Vec<&str> = prospect.source_apis.iter().map(String::as_str).collect();
    let why_now = format!(
        "{} source{}: {}; confidence {:.2}; latest signal {}",
        sources.len(),
        if sources.len() == 1 { "" } else { "s" },
        sources.join(", "),
        verdict.confidence,
        prospect.latest_detected_at.format("%Y-%m-%d"),
    );

    let has_funding = prospect
        .signal_types
        .iter()
        .any(|t| matches!(t, dealsignal_common::SignalType::FundingEvent));
    let stage_estimate = if has_funding { "Seed" } else { "Pre-Seed" };

    let website = prospect
        .canonical_key
        .strip_prefix("domain:")
        .map(|domain| format!("https://{domain}"));

    ProspectPayload {
        discovery_id: discovery_id(&prospect.canonical_key),
        canonical_key: prospect.canonical_key.clone(),
        company_name: prospect
            .company_name()
            .unwrap_or(&prospect.canonical_key)
            .to_string(),
        status: verdict.suggested_status.clone().unwrap_or_default(),
        confidence: verdict.confidence,
        signal_types: prospect.signal_types.iter().map(|t| t.to_string()).collect(),
        why_now,
        stage_estimate: stage_estimate.to_string(),
        website,
    }
}

/// Stable, URL-safe id derived from the canonical key.
fn discovery_id(canonical_key: &str) -> String {
    let sanitized: String = canonical_key
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    format!("ds-{sanitized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_id_is_deterministic_and_url_safe() {
        assert_eq!(discovery_id("domain:acme.ai"), "ds-domain-acme-ai");
        assert_eq!(
            discovery_id("github_repo:acme/engine"),
            "ds-github-repo-acme-engine"
        );
        assert_eq!(discovery_id("domain:acme.ai"), discovery_id("domain:acme.ai"));
    }
}
