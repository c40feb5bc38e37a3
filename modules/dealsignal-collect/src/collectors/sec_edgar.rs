//! SEC EDGAR full-text search for Form D filings (exempt offerings, the
//! clearest public funding-event trail for US startups).

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const SEARCH_URL: &str = "https://efts.sec.gov/LATEST/search-index";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: OuterHits,
}

#[derive(Debug, Deserialize)]
struct OuterHits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    #[serde(default)]
    display_names: Vec<String>,
    #[serde(default)]
    file_date: Option<String>,
}

pub struct SecEdgarCollector;

impl SecEdgarCollector {
    pub const NAME: &'static str = "sec_edgar";

    pub fn new() -> Self {
        Self
    }
}

impl Default for SecEdgarCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for SecEdgarCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://www.sec.gov/cgi-bin/browse-edgar")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let url = format!(
            "{SEARCH_URL}?q=%22Form+D%22&forms=D&startdt={}&enddt={}",
            ctx.window_start_date(),
            ctx.now.format("%Y-%m-%d"),
        );
        let parsed: SearchResponse = ctx
            .http
            .get_json(Self::NAME, "fulltext", &ctx.cancel, &url)
            .await?;
        Ok(map_hits(parsed.hits.hits))
    }
}

fn map_hits(hits: Vec<Hit>) -> FetchOutput {
    let mut output = FetchOutput::default();

    for hit in hits {
        let Some(raw_name) = hit.source.display_names.first() else {
            output.push_error(format!("{}: filing without a filer name", hit.id));
            continue;
        };
        let company_name = strip_cik_suffix(raw_name);

        let Some(detected_at) = hit
            .source
            .file_date
            .as_deref()
            .and_then(parse_date)
        else {
            output.push_error(format!("{}: filing without a file date", hit.id));
            continue;
        };

        // EDGAR gives us a legal name and nothing else; the identity is
        // a weak name+region key until another source corroborates.
        let evidence = IdentityEvidence::from_name_and_region(company_name.clone(), "us");
        let key = match primary_key(&evidence) {
            Ok(key) => key,
            Err(e) => {
                output.push_error(format!("{}: {e}", hit.id));
                continue;
            }
        };

        let source_url = format!("https://www.sec.gov/Archives/edgar/data/{}", hit.id);
        let signal = NewSignal::new(SignalType::FundingEvent, SecEdgarCollector::NAME, key.to_string(), detected_at)
            .with_company_name(&company_name)
            .with_confidence(0.85)
            .with_raw_data(serde_json::json!({
                "accession": hit.id,
                "form_type": "D",
                "filer": raw_name,
            }))
            .with_source_url(source_url)
            .with_warning_flag("name_only_match");
        output.push_signal(signal);
    }

    output
}

/// "Acme AI Inc. (CIK 0001234567)" -> "Acme AI Inc."
fn strip_cik_suffix(display_name: &str) -> String {
    match display_name.rfind("(CIK") {
        Some(idx) => display_name[..idx].trim().to_string(),
        None => display_name.trim().to_string(),
    }
}

fn parse_date(raw: &str) -> Option<chrono::DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cik_suffix_is_stripped() {
        assert_eq!(
            strip_cik_suffix("Acme AI Inc. (CIK 0001234567)"),
            "Acme AI Inc."
        );
        assert_eq!(strip_cik_suffix("Plain Name LLC"), "Plain Name LLC");
    }

    #[test]
    fn filings_map_to_weak_keyed_funding_events() {
        let hits: Vec<Hit> = serde_json::from_value(serde_json::json!([
            {
                "_id": "0001234567-26-000001",
                "_source": {
                    "display_names": ["Acme AI Inc. (CIK 0001234567)"],
                    "file_date": "2026-07-20"
                }
            },
            {
                "_id": "0001234567-26-000002",
                "_source": { "display_names": [] }
            }
        ]))
        .unwrap();

        let output = map_hits(hits);
        assert_eq!(output.signals.len(), 1);
        assert_eq!(output.errors.len(), 1);

        let signal = &output.signals[0];
        assert_eq!(signal.signal_type, SignalType::FundingEvent);
        assert_eq!(signal.canonical_key, "name_loc:acme-ai-inc|us");
        assert_eq!(signal.warning_flags, vec!["name_only_match"]);
    }
}
