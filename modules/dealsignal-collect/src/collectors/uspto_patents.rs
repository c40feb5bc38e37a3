//! PatentsView search for freshly granted patents with organizational
//! assignees.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use dealsignal_common::error::Result;
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const SEARCH_URL: &str = "https://search.patentsview.org/api/v1/patent/";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    patents: Vec<Patent>,
}

#[derive(Debug, Deserialize)]
struct Patent {
    patent_id: String,
    patent_title: String,
    #[serde(default)]
    patent_date: Option<String>,
    #[serde(default)]
    assignees: Vec<Assignee>,
}

#[derive(Debug, Deserialize)]
struct Assignee {
    #[serde(default)]
    assignee_organization: Option<String>,
}

pub struct UsptoPatentsCollector;

impl UsptoPatentsCollector {
    pub const NAME: &'static str = "uspto_patents";

    pub fn new() -> Self {
        Self
    }
}

impl Default for UsptoPatentsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for UsptoPatentsCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://search.patentsview.org/")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let query = serde_json::json!({
            "_gte": {"patent_date": ctx.window_start_date()}
        });
        let fields = serde_json::json!([
            "patent_id", "patent_title", "patent_date", "assignees.assignee_organization"
        ]);
        let url = format!("{SEARCH_URL}?q={query}&f={fields}&o={{\"size\":200}}");
        let parsed: SearchResponse = ctx
            .http
            .get_json(Self::NAME, "patents", &ctx.cancel, &url)
            .await?;
        Ok(map_patents(parsed.patents))
    }
}

fn map_patents(patents: Vec<Patent>) -> FetchOutput {
    let mut output = FetchOutput::default();

    for patent in patents {
        // Individually-assigned patents are not company evidence.
        let Some(organization) = patent
            .assignees
            .iter()
            .find_map(|a| a.assignee_organization.as_deref())
        else {
            continue;
        };
        let Some(detected_at) = patent
            .patent_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
        else {
            output.push_error(format!("{}: unparseable grant date", patent.patent_id));
            continue;
        };

        let evidence = IdentityEvidence::from_name_and_region(organization, "us");
        let key = match primary_key(&evidence) {
            Ok(key) => key,
            Err(e) => {
                output.push_error(format!("{}: {e}", patent.patent_id));
                continue;
            }
        };

        let source_url = format!("https://patents.google.com/patent/US{}", patent.patent_id);
        let signal = NewSignal::new(
            SignalType::PatentFiling,
            UsptoPatentsCollector::NAME,
            key.to_string(),
            detected_at,
        )
        .with_company_name(organization)
        .with_confidence(0.8)
        .with_raw_data(serde_json::json!({
            "patent_id": patent.patent_id,
            "title": patent.patent_title,
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
    fn individual_assignees_are_skipped_quietly() {
        let patents: Vec<Patent> = serde_json::from_value(serde_json::json!([
            {
                "patent_id": "11999001",
                "patent_title": "Widget",
                "patent_date": "2026-07-14",
                "assignees": [{"assignee_organization": "Acme AI Inc"}]
            },
            {
                "patent_id": "11999002",
                "patent_title": "Gadget",
                "patent_date": "2026-07-15",
                "assignees": [{"assignee_organization": null}]
            }
        ]))
        .unwrap();

        let output = map_patents(patents);
        assert_eq!(output.signals.len(), 1);
        assert!(output.errors.is_empty());
        assert_eq!(output.signals[0].signal_type, SignalType::PatentFiling);
    }
}
