//! Remote-job board feed. Early hiring at an unknown company is a soft
//! but timely signal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use dealsignal_common::error::Result;
use dealsignal_common::{primary_key, slugify, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const API_URL: &str = "https://remoteok.com/api";

/// The feed's first element is a legal notice, not a posting; every field
/// is optional so one malformed entry can't poison the batch.
#[derive(Debug, Deserialize)]
struct Posting {
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct JobBoardsCollector;

impl JobBoardsCollector {
    pub const NAME: &'static str = "job_boards";

    pub fn new() -> Self {
        Self
    }
}

impl Default for JobBoardsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for JobBoardsCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://remoteok.com/api")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let postings: Vec<serde_json::Value> = ctx
            .http
            .get_json(Self::NAME, "api", &ctx.cancel, API_URL)
            .await?;
        let postings: Vec<Posting> = postings
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        Ok(map_postings(postings, ctx.window_start()))
    }
}

fn map_postings(postings: Vec<Posting>, window_start: DateTime<Utc>) -> FetchOutput {
    let mut output = FetchOutput::default();
    let mut seen_companies: Vec<String> = Vec::new();

    for posting in postings {
        let Some(company) = posting.company.as_deref().filter(|c| !c.is_empty()) else {
            continue; // the legal-notice element and junk rows
        };
        let Some(date) = posting.date else {
            continue;
        };
        if date < window_start {
            continue;
        }

        // One signal per company per run; a hiring spree is still one signal.
        let company_slug = slugify(company);
        if seen_companies.contains(&company_slug) {
            continue;
        }
        seen_companies.push(company_slug);

        let region = posting
            .location
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or("remote");
        let evidence = IdentityEvidence::from_name_and_region(company, region);
        let key = match primary_key(&evidence) {
            Ok(key) => key,
            Err(e) => {
                output.push_error(format!("{company}: {e}"));
                continue;
            }
        };

        let signal = NewSignal::new(SignalType::JobPosting, JobBoardsCollector::NAME, key.to_string(), date)
            .with_company_name(company)
            .with_confidence(0.4)
            .with_raw_data(serde_json::json!({
                "position": posting.position,
                "location": posting.location,
                "tags": posting.tags,
            }))
            .with_source_url(posting.url.clone().unwrap_or_default())
            .with_warning_flag("name_only_match");
        output.push_signal(signal);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn one_signal_per_company_inside_the_window() {
        let now = Utc::now();
        let postings: Vec<Posting> = serde_json::from_value(serde_json::json!([
            {"legal": "API terms of service"},
            {"company": "Acme AI", "position": "Founding Engineer", "date": now.to_rfc3339(), "location": "Berlin", "tags": ["rust"]},
            {"company": "Acme AI", "position": "ML Engineer", "date": now.to_rfc3339(), "location": "Berlin"},
            {"company": "Stale Co", "position": "Dev", "date": (now - Duration::days(90)).to_rfc3339()}
        ]))
        .unwrap();

        let output = map_postings(postings, now - Duration::days(7));
        assert_eq!(output.signals.len(), 1);
        let signal = &output.signals[0];
        assert_eq!(signal.canonical_key, "name_loc:acme-ai|berlin");
        assert_eq!(signal.signal_type, SignalType::JobPosting);
    }
}
