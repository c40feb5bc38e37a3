//! arXiv Atom feed for recent ML/systems papers. A paper only becomes a
//! company signal when it links a code repository we can anchor identity
//! to; pure academia is skipped, not errored.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const QUERY_URL: &str = "https://export.arxiv.org/api/query?search_query=cat:cs.AI+OR+cat:cs.LG&start=0&max_results=100&sortBy=submittedDate&sortOrder=descending";

pub struct ArxivResearchCollector {
    repo_pattern: Regex,
}

impl ArxivResearchCollector {
    pub const NAME: &'static str = "arxiv_research";

    pub fn new() -> Self {
        Self {
            repo_pattern: Regex::new(r"github\.com/([\w.-]+)/([\w.-]+)")
                .expect("static regex"),
        }
    }
}

impl Default for ArxivResearchCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for ArxivResearchCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://export.arxiv.org/api/query?search_query=all:ping&max_results=1")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let (body, hash) = ctx
            .http
            .get_text(Self::NAME, "query", &ctx.cancel, QUERY_URL)
            .await?;
        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| PipelineError::Permanent(format!("unparseable Atom feed: {e}")))?;
        Ok(self.map_feed(feed, ctx, &hash))
    }
}

impl ArxivResearchCollector {
    fn map_feed(
        &self,
        feed: feed_rs::model::Feed,
        ctx: &CollectContext,
        response_hash: &str,
    ) -> FetchOutput {
        let mut output = FetchOutput::default();

        for entry in feed.entries {
            let published = entry.published.or(entry.updated).unwrap_or_else(Utc::now);
            if published < ctx.window_start() {
                continue;
            }

            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_default();
            let summary = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .unwrap_or_default();

            // Only papers that point at a repo carry company identity.
            let Some(captures) = self.repo_pattern.captures(&summary) else {
                continue;
            };
            let repo = format!("{}/{}", &captures[1], &captures[2]);

            let evidence = IdentityEvidence {
                github_repo: Some(repo.clone()),
                ..Default::default()
            };
            let key = match primary_key(&evidence) {
                Ok(key) => key,
                Err(e) => {
                    output.push_error(format!("{}: {e}", entry.id));
                    continue;
                }
            };

            let source_url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();

            let signal = NewSignal::new(
                SignalType::ResearchPaper,
                Self::NAME,
                key.to_string(),
                published,
            )
            .with_confidence(0.55)
            .with_raw_data(serde_json::json!({
                "title": title,
                "repo": repo,
                "arxiv_id": entry.id,
            }))
            .with_source_url(source_url)
            .with_response_hash(response_hash)
            .with_warning_flag("repo_identity_only");
            output.push_signal(signal);
        }

        output
    }
}
