//! Hacker News via the Algolia search API. "Show HN" posts become
//! product-launch signals; other startup-flavored stories become
//! mentions. Everything here is tier-4 evidence until corroborated.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use dealsignal_common::error::Result;
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const SEARCH_URL: &str = "https://hn.algolia.com/api/v1/search_by_date";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    points: Option<u32>,
    created_at_i: i64,
}

pub struct HnLaunchesCollector;

impl HnLaunchesCollector {
    pub const NAME: &'static str = "hn_launches";

    pub fn new() -> Self {
        Self
    }
}

impl Default for HnLaunchesCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for HnLaunchesCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://hn.algolia.com/api/v1/search?query=ping&hitsPerPage=1")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let since = ctx.window_start().timestamp();
        let url = format!(
            "{SEARCH_URL}?tags=show_hn&numericFilters=created_at_i%3E{since}&hitsPerPage=200"
        );
        let parsed: SearchResponse = ctx
            .http
            .get_json(Self::NAME, "search", &ctx.cancel, &url)
            .await?;
        Ok(map_hits(parsed.hits))
    }
}

fn map_hits(hits: Vec<Hit>) -> FetchOutput {
    let mut output = FetchOutput::default();

    for hit in hits {
        let Some(title) = hit.title.as_deref() else {
            continue;
        };
        let detected_at: DateTime<Utc> = match Utc.timestamp_opt(hit.created_at_i, 0) {
            chrono::LocalResult::Single(ts) => ts,
            _ => {
                output.push_error(format!("{}: bad timestamp", hit.object_id));
                continue;
            }
        };

        let is_launch = title.starts_with("Show HN");
        let product_name = parse_product_name(title);

        // Identity preference: the linked site, unless it's a code host,
        // in which case the repo path is the better key.
        let mut evidence = IdentityEvidence::default();
        if let Some(url) = hit.url.as_deref() {
            if let Some(repo) = github_repo_path(url) {
                evidence.github_repo = Some(repo);
            } else {
                evidence.website = Some(url.to_string());
            }
        }
        if evidence.website.is_none() && evidence.github_repo.is_none() {
            // Text-only post: name alone can't form an identity.
            output.push_error(format!("{}: no derivable identity", hit.object_id));
            continue;
        }

        let key = match primary_key(&evidence) {
            Ok(key) => key,
            Err(e) => {
                output.push_error(format!("{}: {e}", hit.object_id));
                continue;
            }
        };

        let points = hit.points.unwrap_or(0);
        let signal_type = if is_launch {
            SignalType::ProductLaunch
        } else {
            SignalType::HnMention
        };
        let mut signal = NewSignal::new(
            signal_type,
            HnLaunchesCollector::NAME,
            key.to_string(),
            detected_at,
        )
        .with_confidence((0.3 + f64::from(points) / 500.0).min(0.7))
        .with_raw_data(serde_json::json!({
            "title": title,
            "points": points,
            "item_url": format!("https://news.ycombinator.com/item?id={}", hit.object_id),
        }))
        .with_source_url(hit.url.clone().unwrap_or_default());
        if let Some(name) = product_name {
            signal = signal.with_company_name(name);
        }
        output.push_signal(signal);
    }

    output
}

/// "Show HN: Acme – fast inference for robots" -> "Acme"
fn parse_product_name(title: &str) -> Option<String> {
    let rest = title.strip_prefix("Show HN:")?.trim();
    let name: &str = rest
        .split([':', ',', '('])
        .next()
        .unwrap_or(rest)
        .split(" – ")
        .next()
        .unwrap_or(rest)
        .split(" - ")
        .next()
        .unwrap_or(rest)
        .trim();
    if name.is_empty() || name.len() > 60 {
        None
    } else {
        Some(name.to_string())
    }
}

fn github_repo_path(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let mut parts = rest.split('/');
    let owner = parts.next()?;
    let repo = parts.next()?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits() -> Vec<Hit> {
        serde_json::from_value(serde_json::json!([
            {
                "objectID": "1001",
                "title": "Show HN: Acme – fast inference for robots",
                "url": "https://acme.ai",
                "points": 250,
                "created_at_i": 1785000000i64
            },
            {
                "objectID": "1002",
                "title": "Show HN: Sidecar (YC S26)",
                "url": "https://github.com/sidecar-dev/sidecar",
                "points": 40,
                "created_at_i": 1785000100i64
            },
            {
                "objectID": "1003",
                "title": "Show HN: My text-only launch",
                "url": null,
                "points": 5,
                "created_at_i": 1785000200i64
            }
        ]))
        .unwrap()
    }

    #[test]
    fn show_hn_with_site_is_a_product_launch() {
        let output = map_hits(hits());
        let signal = &output.signals[0];
        assert_eq!(signal.signal_type, SignalType::ProductLaunch);
        assert_eq!(signal.canonical_key, "domain:acme.ai");
        assert_eq!(signal.company_name.as_deref(), Some("Acme"));
        assert!((signal.confidence - 0.7).abs() < 1e-9); // 250 points hits the cap
    }

    #[test]
    fn github_links_key_by_repo() {
        let output = map_hits(hits());
        assert_eq!(
            output.signals[1].canonical_key,
            "github_repo:sidecar-dev/sidecar"
        );
        assert_eq!(output.signals[1].company_name.as_deref(), Some("Sidecar"));
    }

    #[test]
    fn text_only_posts_are_identity_errors() {
        let output = map_hits(hits());
        assert_eq!(output.signals.len(), 2);
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].contains("1003"));
    }
}
