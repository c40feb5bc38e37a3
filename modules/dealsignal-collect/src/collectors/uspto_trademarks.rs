//! USPTO trademark application feed. A fresh mark from an unknown owner
//! is often the first public trace of a stealth company.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use dealsignal_common::error::Result;
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const SEARCH_URL: &str = "https://developer.uspto.gov/ds-api/trademarks/v1/applications";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Application>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Application {
    serial_number: String,
    mark_identification: String,
    #[serde(default)]
    owner_name: Option<String>,
    #[serde(default)]
    filing_date: Option<String>,
}

pub struct UsptoTrademarksCollector;

impl UsptoTrademarksCollector {
    pub const NAME: &'static str = "uspto_trademarks";

    pub fn new() -> Self {
        Self
    }
}

impl Default for UsptoTrademarksCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for UsptoTrademarksCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://developer.uspto.gov/")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let url = format!(
            "{SEARCH_URL}?filingDateFrom={}&rows=200",
            ctx.window_start_date()
        );
        let parsed: SearchResponse = ctx
            .http
            .get_json(Self::NAME, "applications", &ctx.cancel, &url)
            .await?;
        Ok(map_applications(parsed.results))
    }
}

fn map_applications(applications: Vec<Application>) -> FetchOutput {
    let mut output = FetchOutput::default();

    for app in applications {
        let Some(owner) = app.owner_name.as_deref().filter(|o| !o.is_empty()) else {
            output.push_error(format!("{}: application without owner", app.serial_number));
            continue;
        };
        let Some(detected_at) = app
            .filing_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
        else {
            output.push_error(format!("{}: unparseable filing date", app.serial_number));
            continue;
        };

        let evidence = IdentityEvidence::from_name_and_region(owner, "us");
        let key = match primary_key(&evidence) {
            Ok(key) => key,
            Err(e) => {
                output.push_error(format!("{}: {e}", app.serial_number));
                continue;
            }
        };

        let source_url = format!("https://tsdr.uspto.gov/#caseNumber={}", app.serial_number);
        let signal = NewSignal::new(
            SignalType::TrademarkFiling,
            UsptoTrademarksCollector::NAME,
            key.to_string(),
            detected_at,
        )
        .with_company_name(owner)
        .with_confidence(0.8)
        .with_raw_data(serde_json::json!({
            "serial_number": app.serial_number,
            "mark": app.mark_identification,
        }))
        .with_source_url(source_url)
        .with_warning_flag("name_only_match");
        output.push_signal(signal);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownerless_applications_are_counted_as_errors() {
        let applications: Vec<Application> = serde_json::from_value(serde_json::json!([
            {"serialNumber": "97100001", "markIdentification": "ACME", "ownerName": "Acme AI Inc", "filingDate": "2026-07-18"},
            {"serialNumber": "97100002", "markIdentification": "GHOST"}
        ]))
        .unwrap();

        let output = map_applications(applications);
        assert_eq!(output.signals.len(), 1);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.signals[0].canonical_key, "name_loc:acme-ai-inc|us");
        assert_eq!(output.signals[0].signal_type, SignalType::TrademarkFiling);
    }
}
