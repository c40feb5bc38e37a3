// CrmConnector abstracts the Notion client so the pusher and sync can be
// tested deterministically: no network, no Notion workspace.

use async_trait::async_trait;

use dealsignal_common::error::Result;
use dealsignal_common::CancelFlag;
use notion_client::{NotionClient, ProspectPayload, SuppressionListing, UpsertOutcome};

#[async_trait]
pub trait CrmConnector: Send + Sync {
    /// Fail with `SchemaInvalid` unless the live schema matches the contract.
    async fn require_valid_schema(&self, cancel: &CancelFlag) -> Result<()>;

    /// Create or update one prospect record. Preflights internally;
    /// terminal records come back as `Skipped`.
    async fn upsert_prospect(
        &self,
        payload: &ProspectPayload,
        cancel: &CancelFlag,
    ) -> Result<UpsertOutcome>;

    /// Every CRM record, paginated internally.
    async fn get_suppression_list(&self, cancel: &CancelFlag) -> Result<SuppressionListing>;
}

#[async_trait]
impl CrmConnector for NotionClient {
    async fn require_valid_schema(&self, cancel: &CancelFlag) -> Result<()> {
        NotionClient::require_valid_schema(self, cancel).await
    }

    async fn upsert_prospect(
        &self,
        payload: &ProspectPayload,
        cancel: &CancelFlag,
    ) -> Result<UpsertOutcome> {
        NotionClient::upsert_prospect(self, payload, cancel).await
    }

    async fn get_suppression_list(&self, cancel: &CancelFlag) -> Result<SuppressionListing> {
        NotionClient::get_suppression_list(self, cancel).await
    }
}
