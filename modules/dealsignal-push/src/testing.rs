//! Scripted CRM double for pusher and sync tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::CancelFlag;
use notion_client::{
    CrmRecord, ProspectPayload, SuppressionListing, UpsertAction, UpsertOutcome,
};

use crate::traits::CrmConnector;

#[derive(Default)]
pub struct MockCrm {
    /// Every payload the pusher handed us, in order.
    pub upserts: Mutex<Vec<ProspectPayload>>,
    /// Canonical keys the mock treats as terminal in the CRM.
    pub terminal_keys: Vec<String>,
    /// Records returned by the suppression listing.
    pub records: Vec<CrmRecord>,
    /// When set, every preflight fails with this report text.
    pub schema_error: Option<String>,
    /// When set, every upsert fails permanently.
    pub upsert_error: Option<String>,
    pub preflight_calls: AtomicU32,
    next_page_id: AtomicU32,
}

impl MockCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema_error(mut self, report: &str) -> Self {
        self.schema_error = Some(report.to_string());
        self
    }

    pub fn with_upsert_error(mut self, message: &str) -> Self {
        self.upsert_error = Some(message.to_string());
        self
    }

    pub fn with_terminal_key(mut self, key: &str) -> Self {
        self.terminal_keys.push(key.to_string());
        self
    }

    pub fn with_records(mut self, records: Vec<CrmRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }
}

#[async_trait]
impl CrmConnector for MockCrm {
    async fn require_valid_schema(&self, _cancel: &CancelFlag) -> Result<()> {
        self.preflight_calls.fetch_add(1, Ordering::SeqCst);
        match &self.schema_error {
            Some(report) => Err(PipelineError::SchemaInvalid(report.clone())),
            None => Ok(()),
        }
    }

    async fn upsert_prospect(
        &self,
        payload: &ProspectPayload,
        cancel: &CancelFlag,
    ) -> Result<UpsertOutcome> {
        // Preflight precedes any write, exactly like the real client.
        self.require_valid_schema(cancel).await?;

        if let Some(message) = &self.upsert_error {
            return Err(PipelineError::Permanent(message.clone()));
        }
        if self.terminal_keys.contains(&payload.canonical_key) {
            return Ok(UpsertOutcome {
                crm_page_id: "terminal-page".to_string(),
                action: UpsertAction::Skipped,
            });
        }

        self.upserts.lock().unwrap().push(payload.clone());
        let n = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        Ok(UpsertOutcome {
            crm_page_id: format!("page-{n}"),
            action: UpsertAction::Created,
        })
    }

    async fn get_suppression_list(&self, _cancel: &CancelFlag) -> Result<SuppressionListing> {
        Ok(SuppressionListing {
            records: self.records.clone(),
            pages_fetched: 1,
        })
    }
}
