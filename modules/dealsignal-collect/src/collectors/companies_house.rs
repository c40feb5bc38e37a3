//! UK Companies House advanced search. Authoritative registry: both the
//! incorporation stream and the dissolution hard-kill stream come from here.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const SEARCH_URL: &str =
    "https://api.company-information.service.gov.uk/advanced-search/companies";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<CompanyItem>,
}

#[derive(Debug, Deserialize)]
struct CompanyItem {
    company_name: String,
    company_number: String,
    #[serde(default)]
    company_status: Option<String>,
    #[serde(default)]
    date_of_creation: Option<String>,
    #[serde(default)]
    date_of_cessation: Option<String>,
    #[serde(default)]
    registered_office_address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct Address {
    #[serde(default)]
    locality: Option<String>,
}

pub struct CompaniesHouseCollector {
    api_key: Option<String>,
}

impl CompaniesHouseCollector {
    pub const NAME: &'static str = "companies_house";

    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }
}

#[async_trait]
impl Collector for CompaniesHouseCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://api.company-information.service.gov.uk/")
    }

    async fn open(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(PipelineError::Config(
                "COMPANIES_HOUSE_API_KEY is required for the companies_house collector".into(),
            ));
        }
        Ok(())
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let url = format!(
            "{SEARCH_URL}?incorporated_from={}&size=500",
            ctx.window_start_date()
        );

        // Companies House authenticates with the API key as basic-auth user.
        let request = ctx
            .http
            .http()
            .get(&url)
            .basic_auth(api_key, None::<&str>);
        let response = ctx
            .http
            .execute(Self::NAME, "search", &ctx.cancel, request)
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Permanent(format!("unreadable body: {e}")))?;
        let hash = dealsignal_common::response_hash(&body);

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::Permanent(format!("malformed search response: {e}")))?;

        debug!(items = parsed.items.len(), "Companies House search returned");
        Ok(map_items(parsed.items, &hash))
    }
}

fn map_items(items: Vec<CompanyItem>, response_hash: &str) -> FetchOutput {
    let mut output = FetchOutput::default();

    for item in items {
        let dissolved = item
            .company_status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("dissolved"));
        let (signal_type, event_date) = if dissolved {
            (
                SignalType::CompanyDissolved,
                item.date_of_cessation.as_deref(),
            )
        } else {
            (SignalType::Incorporation, item.date_of_creation.as_deref())
        };

        let Some(detected_at) = event_date.and_then(parse_date) else {
            output.push_error(format!("{}: missing event date", item.company_number));
            continue;
        };

        let evidence = IdentityEvidence {
            companies_house_number: Some(item.company_number.clone()),
            company_name: Some(item.company_name.clone()),
            region: item
                .registered_office_address
                .as_ref()
                .and_then(|a| a.locality.clone()),
            ..Default::default()
        };
        let key = match primary_key(&evidence) {
            Ok(key) => key,
            Err(e) => {
                output.push_error(format!("{}: {e}", item.company_number));
                continue;
            }
        };

        let source_url = format!(
            "https://find-and-update.company-information.service.gov.uk/company/{}",
            item.company_number
        );
        let signal = NewSignal::new(signal_type, CompaniesHouseCollector::NAME, key.to_string(), detected_at)
            .with_company_name(&item.company_name)
            .with_confidence(0.9)
            .with_raw_data(serde_json::json!({
                "company_number": item.company_number,
                "company_status": item.company_status,
                "locality": item.registered_office_address.as_ref().and_then(|a| a.locality.clone()),
            }))
            .with_source_url(source_url)
            .with_response_hash(response_hash);
        output.push_signal(signal);
    }

    output
}

fn parse_date(raw: &str) -> Option<chrono::DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<CompanyItem> {
        serde_json::from_value(serde_json::json!([
            {
                "company_name": "Acme Robotics Ltd",
                "company_number": "12345678",
                "company_status": "active",
                "date_of_creation": "2026-07-01",
                "registered_office_address": {"locality": "London"}
            },
            {
                "company_name": "Bust Corp Ltd",
                "company_number": "87654321",
                "company_status": "dissolved",
                "date_of_cessation": "2026-07-15"
            },
            {
                "company_name": "No Date Ltd",
                "company_number": "00000001",
                "company_status": "active"
            }
        ]))
        .unwrap()
    }

    #[test]
    fn active_companies_become_incorporations() {
        let output = map_items(items(), "abc123");
        assert_eq!(output.signals.len(), 2);

        let incorporation = &output.signals[0];
        assert_eq!(incorporation.signal_type, SignalType::Incorporation);
        assert_eq!(incorporation.canonical_key, "companies_house:12345678");
        assert_eq!(incorporation.company_name.as_deref(), Some("Acme Robotics Ltd"));
        assert_eq!(incorporation.source_response_hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn dissolved_companies_become_hard_kills() {
        let output = map_items(items(), "abc123");
        let dissolution = &output.signals[1];
        assert_eq!(dissolution.signal_type, SignalType::CompanyDissolved);
        assert_eq!(dissolution.canonical_key, "companies_house:87654321");
    }

    #[test]
    fn dateless_records_are_errors_not_aborts() {
        let output = map_items(items(), "abc123");
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].contains("00000001"));
    }
}
