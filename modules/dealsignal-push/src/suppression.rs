use std::time::Instant;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info};

use dealsignal_common::error::Result;
use dealsignal_common::{candidate_keys, CancelFlag, IdentityEvidence, SuppressionEntry};
use dealsignal_store::SignalStore;
use notion_client::CrmRecord;

use crate::traits::CrmConnector;

/// Mirrors the CRM into the local suppression cache so collectors and the
/// pusher never re-surface a company the fund already tracks.
pub struct SuppressionSync<C: CrmConnector> {
    store: SignalStore,
    crm: C,
    ttl_days: i64,
}

#[derive(Debug, Default)]
pub struct SyncStats {
    pub pages_fetched: u32,
    pub records_processed: u32,
    pub with_strong_key: u32,
    pub with_weak_key: u32,
    pub without_key: u32,
    pub synced: u32,
    pub expired_cleaned: u64,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Suppression Sync ===")?;
        writeln!(f, "CRM pages fetched:  {}", self.pages_fetched)?;
        writeln!(f, "Records processed:  {}", self.records_processed)?;
        writeln!(f, "  strong key:       {}", self.with_strong_key)?;
        writeln!(f, "  weak key:         {}", self.with_weak_key)?;
        writeln!(f, "  no derivable key: {}", self.without_key)?;
        writeln!(f, "Entries synced:     {}", self.synced)?;
        writeln!(f, "Expired cleaned:    {}", self.expired_cleaned)?;
        writeln!(f, "Duration:           {}ms", self.duration_ms)?;
        if self.dry_run {
            writeln!(f, "(dry run, cache untouched)")?;
        }
        Ok(())
    }
}

impl<C: CrmConnector> SuppressionSync<C> {
    pub fn new(store: SignalStore, crm: C, ttl_days: i64) -> Self {
        Self {
            store,
            crm,
            ttl_days,
        }
    }

    pub async fn run(&self, dry_run: bool, cancel: &CancelFlag) -> Result<SyncStats> {
        let started = Instant::now();
        let mut stats = SyncStats {
            dry_run,
            ..SyncStats::default()
        };

        let listing = self.crm.get_suppression_list(cancel).await?;
        stats.pages_fetched = listing.pages_fetched;

        let now = Utc::now();
        let expires_at = now + Duration::days(self.ttl_days.max(1));
        let mut entries = Vec::new();

        for record in &listing.records {
            stats.records_processed += 1;
            let Some(canonical_key) = derive_key(record) else {
                stats.without_key += 1;
                debug!(page = %record.crm_page_id, "CRM record has no derivable key");
                continue;
            };
            if is_strong(&canonical_key) {
                stats.with_strong_key += 1;
            } else {
                stats.with_weak_key += 1;
            }
            entries.push(SuppressionEntry {
                canonical_key,
                crm_page_id: record.crm_page_id.clone(),
                status: record.status.clone(),
                company_name: record.company_name.clone(),
                cached_at: now,
                expires_at,
                metadata: json!({ "source": "suppression_sync" }),
            });
        }

        stats.synced = entries.len() as u32;
        if !dry_run {
            self.store.update_suppression_cache(&entries).await?;
            stats.expired_cleaned = self.store.clean_expired_cache().await?;
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            records = stats.records_processed,
            synced = stats.synced,
            cleaned = stats.expired_cleaned,
            "Suppression sync complete"
        );
        Ok(stats)
    }
}

/// The CRM's own key field wins; otherwise derive one from whatever the
/// record exposes.
fn derive_key(record: &CrmRecord) -> Option<String> {
    if let Some(key) = &record.canonical_key {
        return Some(key.clone());
    }
    let evidence = IdentityEvidence {
        website: record.website.clone(),
        company_name: record.company_name.clone(),
        region: record.region.clone(),
        ..Default::default()
    };
    candidate_keys(&evidence)
        .ok()
        .map(|keys| keys[0].to_string())
}

fn is_strong(canonical_key: &str) -> bool {
    matches!(
        canonical_key.split(':').next().unwrap_or(""),
        "domain" | "companies_house" | "crunchbase" | "pitchbook"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        key: Option<&str>,
        website: Option<&str>,
        name: Option<&str>,
        region: Option<&str>,
    ) -> CrmRecord {
        CrmRecord {
            crm_page_id: "page-1".to_string(),
            status: "Passed".to_string(),
            company_name: name.map(String::from),
            canonical_key: key.map(String::from),
            website: website.map(String::from),
            region: region.map(String::from),
        }
    }

    #[test]
    fn explicit_key_wins_over_derivation() {
        let r = record(Some("domain:acme.ai"), Some("https://other.io"), None, None);
        assert_eq!(derive_key(&r).as_deref(), Some("domain:acme.ai"));
    }

    #[test]
    fn website_derives_a_strong_key() {
        let r = record(None, Some("https://www.acme.ai/"), Some("Acme"), None);
        let key = derive_key(&r).unwrap();
        assert_eq!(key, "domain:acme.ai");
        assert!(is_strong(&key));
    }

    #[test]
    fn name_and_region_fall_back_to_weak_key() {
        let r = record(None, None, Some("Acme Robotics"), Some("London"));
        let key = derive_key(&r).unwrap();
        assert_eq!(key, "name_loc:acme-robotics|london");
        assert!(!is_strong(&key));
    }

    #[test]
    fn bare_records_have_no_key() {
        let r = record(None, None, None, None);
        assert!(derive_key(&r).is_none());
    }
}
