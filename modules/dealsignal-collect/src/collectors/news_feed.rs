//! Startup press RSS. Headlines like "Acme raises $12M Series A" become
//! news-mention signals with the round details preserved in raw_data.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const FEED_URL: &str = "https://techcrunch.com/category/startups/feed/";

pub struct NewsFeedCollector {
    headline_pattern: Regex,
}

impl NewsFeedCollector {
    pub const NAME: &'static str = "news_feed";

    pub fn new() -> Self {
        Self {
            // "Acme raises $12M", "Acme Robotics lands $3.5M seed round"
            headline_pattern: Regex::new(
                r"^(?P<name>[A-Z][\w'&.-]*(?: [A-Z][\w'&.-]*){0,3}) (?:raises|lands|secures|closes|nabs) \$(?P<amount>[\d.]+)(?P<unit>[MBK])",
            )
            .expect("static regex"),
        }
    }

    fn parse_headline(&self, title: &str) -> Option<(String, f64)> {
        let captures = self.headline_pattern.captures(title)?;
        let name = captures.name("name")?.as_str().to_string();
        let amount: f64 = captures.name("amount")?.as_str().parse().ok()?;
        let millions = match captures.name("unit")?.as_str() {
            "B" => amount * 1000.0,
            "M" => amount,
            _ => amount / 1000.0,
        };
        Some((name, millions))
    }
}

impl Default for NewsFeedCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for NewsFeedCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some(FEED_URL)
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let (body, hash) = ctx
            .http
            .get_text(Self::NAME, "rss", &ctx.cancel, FEED_URL)
            .await?;
        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| PipelineError::Permanent(format!("unparseable RSS feed: {e}")))?;

        let mut output = FetchOutput::default();
        for entry in feed.entries {
            let published = entry.published.or(entry.updated).unwrap_or_else(Utc::now);
            if published < ctx.window_start() {
                continue;
            }
            let Some(title) = entry.title.as_ref().map(|t| t.content.clone()) else {
                continue;
            };
            // Non-funding coverage is out of scope for this collector.
            let Some((company_name, millions)) = self.parse_headline(&title) else {
                continue;
            };

            let evidence = IdentityEvidence::from_name_and_region(&company_name, "global");
            let key = match primary_key(&evidence) {
                Ok(key) => key,
                Err(e) => {
                    output.push_error(format!("{title}: {e}"));
                    continue;
                }
            };

            let article_url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let signal = NewSignal::new(
                SignalType::NewsMention,
                Self::NAME,
                key.to_string(),
                published,
            )
            .with_company_name(&company_name)
            .with_confidence(0.6)
            .with_raw_data(serde_json::json!({
                "headline": title,
                "amount_millions_usd": millions,
            }))
            .with_source_url(article_url)
            .with_response_hash(&hash)
            .with_warning_flag("name_only_match");
            output.push_signal(signal);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funding_headlines_parse_name_and_amount() {
        let collector = NewsFeedCollector::new();
        assert_eq!(
            collector.parse_headline("Acme raises $12M to teach robots to fold laundry"),
            Some(("Acme".to_string(), 12.0))
        );
        assert_eq!(
            collector.parse_headline("Acme Robotics lands $3.5M seed round"),
            Some(("Acme Robotics".to_string(), 3.5))
        );
        assert_eq!(
            collector.parse_headline("Borealis secures $1.2B for fusion"),
            Some(("Borealis".to_string(), 1200.0))
        );
    }

    #[test]
    fn non_funding_headlines_are_ignored() {
        let collector = NewsFeedCollector::new();
        assert!(collector.parse_headline("Why the AI boom is different").is_none());
        assert!(collector.parse_headline("Acme shuts down after 3 years").is_none());
    }
}
