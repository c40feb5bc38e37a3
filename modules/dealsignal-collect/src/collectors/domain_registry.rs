//! Newly registered domains in startup-heavy zones (.ai, .io, .dev).
//! A registration alone is thin evidence, but it carries the strongest
//! possible identity: the domain itself.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use dealsignal_common::error::Result;
use dealsignal_common::{canonical::registrable_domain, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const SEARCH_URL: &str = "https://api.domainsdb.info/v1/domains/search";
const ZONES: &[&str] = &["ai", "io", "dev"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    domains: Vec<DomainRecord>,
}

#[derive(Debug, Deserialize)]
struct DomainRecord {
    domain: String,
    #[serde(default)]
    create_date: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

pub struct DomainRegistryCollector;

impl DomainRegistryCollector {
    pub const NAME: &'static str = "domain_registry";

    pub fn new() -> Self {
        Self
    }
}

impl Default for DomainRegistryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for DomainRegistryCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://api.domainsdb.info/v1/info/stat/")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let mut output = FetchOutput::default();
        for zone in ZONES {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let url = format!(
                "{SEARCH_URL}?zone={zone}&date_from={}&limit=50",
                ctx.window_start_date()
            );
            match ctx
                .http
                .get_json::<SearchResponse>(Self::NAME, "search", &ctx.cancel, &url)
                .await
            {
                Ok(parsed) => map_domains(parsed.domains, &mut output),
                // One zone failing shouldn't lose the others.
                Err(e) => output.push_error(format!("zone {zone}: {e}")),
            }
        }
        Ok(output)
    }
}

fn map_domains(domains: Vec<DomainRecord>, output: &mut FetchOutput) {
    for record in domains {
        let Some(domain) = registrable_domain(&record.domain) else {
            output.push_error(format!("{}: not a registrable domain", record.domain));
            continue;
        };
        let detected_at = record
            .create_date
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let stem = domain.split('.').next().unwrap_or(&domain).to_string();
        let signal = NewSignal::new(
            SignalType::DomainRegistration,
            DomainRegistryCollector::NAME,
            format!("domain:{domain}"),
            detected_at,
        )
        .with_company_name(stem)
        .with_confidence(0.5)
        .with_source_url(format!("https://{domain}"))
        .with_raw_data(serde_json::json!({
            "domain": domain,
            "country": record.country,
        }));
        output.push_signal(signal);
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_become_strong_keys() {
        let mut output = FetchOutput::default();
        let records: Vec<DomainRecord> = serde_json::from_value(serde_json::json!([
            {"domain": "acme.ai", "create_date": "2026-07-20 11:22:33", "country": "US"},
            {"domain": "x", "create_date": null}
        ]))
        .unwrap();

        map_domains(records, &mut output);
        assert_eq!(output.signals.len(), 1);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.signals[0].canonical_key, "domain:acme.ai");
        assert_eq!(output.signals[0].company_name.as_deref(), Some("acme"));
    }
}
