//! Validated, rate-limited client for the Notion pipeline database.
//!
//! Three capabilities, matching what the pipeline needs from the CRM:
//! schema preflight (cached), full suppression-list pagination, and
//! prospect upsert that never overwrites terminal records.

pub mod schema;
pub mod types;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info};

use dealsignal_common::config::NotionConfig;
use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::CancelFlag;
use dealsignal_http::RateLimitedClient;

pub use schema::{validate, DatabaseMeta, SchemaContract, SchemaReport};
pub use types::{CrmRecord, Page, ProspectPayload, QueryResponse, UpsertAction, UpsertOutcome};

const BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// The Notion API allows an average of 3 requests per second.
pub const DEFAULT_NOTION_RPS: f64 = 3.0;

/// Rate-limit bucket every CRM request shares, across pusher and sync.
pub const SOURCE: &str = "notion";

struct CachedReport {
    fetched_at: Instant,
    report: SchemaReport,
}

/// A full pull of the CRM database plus how many query round-trips it took.
#[derive(Debug, Clone)]
pub struct SuppressionListing {
    pub records: Vec<CrmRecord>,
    pub pages_fetched: u32,
}

pub struct NotionClient {
    config: NotionConfig,
    contract: SchemaContract,
    http: RateLimitedClient,
    schema_cache: Arc<Mutex<Option<CachedReport>>>,
}

impl NotionClient {
    pub fn new(config: NotionConfig, http: RateLimitedClient) -> Self {
        let contract = SchemaContract::for_config(&config);
        Self {
            config,
            contract,
            http,
            schema_cache: Arc::new(Mutex::new(None)),
        }
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.config.api_key)
            .header("Notion-Version", NOTION_VERSION)
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs((self.config.schema_cache_ttl_hours.max(0) as u64) * 3600)
    }

    /// Whether a CRM status means "the fund has decided against this one".
    pub fn is_terminal_status(&self, status: &str) -> bool {
        self.config
            .terminal_statuses
            .iter()
            .any(|t| t.eq_ignore_ascii_case(status))
    }

    // --- Schema preflight ---

    /// Compare the live database schema to the contract. Cached; pass
    /// `force_refresh` to bypass the cache.
    pub async fn validate_schema(
        &self,
        force_refresh: bool,
        cancel: &CancelFlag,
    ) -> Result<SchemaReport> {
        if !force_refresh {
            let cache = self.schema_cache.lock().expect("schema cache poisoned");
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl() {
                    return Ok(cached.report.clone());
                }
            }
        }

        let url = format!("{BASE_URL}/databases/{}", self.config.database_id);
        let response = self
            .http
            .execute(SOURCE, "api", cancel, self.auth(self.http.http().get(&url)))
            .await?;
        let meta: DatabaseMeta = response
            .json()
            .await
            .map_err(|e| PipelineError::Permanent(format!("malformed database schema: {e}")))?;

        let report = validate(&meta, &self.contract);
        debug!(valid = report.is_valid(), "Schema preflight");

        let mut cache = self.schema_cache.lock().expect("schema cache poisoned");
        *cache = Some(CachedReport {
            fetched_at: Instant::now(),
            report: report.clone(),
        });
        Ok(report)
    }

    /// Preflight that fails the calling phase when the schema is off.
    pub async fn require_valid_schema(&self, cancel: &CancelFlag) -> Result<()> {
        let report = self.validate_schema(false, cancel).await?;
        if report.is_valid() {
            Ok(())
        } else {
            Err(PipelineError::SchemaInvalid(report.to_string()))
        }
    }

    // --- Suppression list ---

    /// Every record in the pipeline database, all statuses included.
    /// Paginates internally; order is whatever Notion returns.
    pub async fn get_suppression_list(&self, cancel: &CancelFlag) -> Result<SuppressionListing> {
        let url = format!("{BASE_URL}/databases/{}/query", self.config.database_id);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages_fetched = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let response = self
                .http
                .execute(
                    SOURCE,
                    "api",
                    cancel,
                    self.auth(self.http.http().post(&url)).json(&body),
                )
                .await?;
            let page: QueryResponse = response
                .json()
                .await
                .map_err(|e| PipelineError::Permanent(format!("malformed query response: {e}")))?;

            pages_fetched += 1;
            records.extend(page.results.iter().map(CrmRecord::from_page));

            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        info!(pages = pages_fetched, records = records.len(), "Fetched suppression list");
        Ok(SuppressionListing {
            records,
            pages_fetched,
        })
    }

    // --- Upsert ---

    /// Create or update one prospect record.
    ///
    /// Runs the schema preflight first and refuses to write through an
    /// invalid schema. Existing records in a terminal status are left
    /// untouched and reported as `Skipped`.
    pub async fn upsert_prospect(
        &self,
        payload: &ProspectPayload,
        cancel: &CancelFlag,
    ) -> Result<UpsertOutcome> {
        self.require_valid_schema(cancel).await?;

        let existing = self.find_by_canonical_key(&payload.canonical_key, cancel).await?;

        match existing {
            Some(page) => {
                let status = page.select("Status").unwrap_or_default();
                if self.is_terminal_status(&status) {
                    debug!(
                        canonical_key = %payload.canonical_key,
                        status = %status,
                        "Existing record is terminal, skipping"
                    );
                    return Ok(UpsertOutcome {
                        crm_page_id: page.id,
                        action: UpsertAction::Skipped,
                    });
                }

                let url = format!("{BASE_URL}/pages/{}", page.id);
                let body = json!({ "properties": payload.to_properties() });
                self.http
                    .execute(
                        SOURCE,
                        "api",
                        cancel,
                        self.auth(self.http.http().patch(&url)).json(&body),
                    )
                    .await?;
                Ok(UpsertOutcome {
                    crm_page_id: page.id,
                    action: UpsertAction::Updated,
                })
            }
            None => {
                let url = format!("{BASE_URL}/pages");
                let body = json!({
                    "parent": { "database_id": self.config.database_id },
                    "properties": payload.to_properties(),
                });
                let response = self
                    .http
                    .execute(
                        SOURCE,
                        "api",
                        cancel,
                        self.auth(self.http.http().post(&url)).json(&body),
                    )
                    .await?;
                let created: Page = response
                    .json()
                    .await
                    .map_err(|e| PipelineError::Permanent(format!("malformed create response: {e}")))?;
                Ok(UpsertOutcome {
                    crm_page_id: created.id,
                    action: UpsertAction::Created,
                })
            }
        }
    }

    async fn find_by_canonical_key(
        &self,
        canonical_key: &str,
        cancel: &CancelFlag,
    ) -> Result<Option<Page>> {
        let url = format!("{BASE_URL}/databases/{}/query", self.config.database_id);
        let body = json!({
            "page_size": 1,
            "filter": {
                "property": "Canonical Key",
                "rich_text": { "equals": canonical_key }
            }
        });
        let response = self
            .http
            .execute(
                SOURCE,
                "api",
                cancel,
                self.auth(self.http.http().post(&url)).json(&body),
            )
            .await?;
        let mut page: QueryResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Permanent(format!("malformed query response: {e}")))?;
        Ok(if page.results.is_empty() {
            None
        } else {
            Some(page.results.remove(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealsignal_common::config::HttpSettings;
    use dealsignal_http::RateLimiter;

    fn client() -> NotionClient {
        let config = NotionConfig {
            api_key: "secret".into(),
            database_id: "db".into(),
            status_auto_push: "Source".into(),
            status_needs_review: "Review".into(),
            terminal_statuses: vec!["Passed".into(), "Lost".into()],
            schema_cache_ttl_hours: 6,
        };
        let http =
            RateLimitedClient::new(&HttpSettings::default(), RateLimiter::uniform(3.0, 3)).unwrap();
        NotionClient::new(config, http)
    }

    #[test]
    fn terminal_statuses_match_case_insensitively() {
        let client = client();
        assert!(client.is_terminal_status("Passed"));
        assert!(client.is_terminal_status("passed"));
        assert!(client.is_terminal_status("LOST"));
        assert!(!client.is_terminal_status("Source"));
        assert!(!client.is_terminal_status(""));
    }

    #[test]
    fn schema_cache_ttl_comes_from_config() {
        let client = client();
        assert_eq!(client.cache_ttl(), Duration::from_secs(6 * 3600));
    }
}
