//! GitHub search for young repositories accumulating stars fast: the
//! "github_spike" evidence stream for developer-tool companies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use dealsignal_common::error::Result;
use dealsignal_common::{primary_key, IdentityEvidence, NewSignal, SignalType};

use crate::context::CollectContext;
use crate::traits::{Collector, FetchOutput};

const SEARCH_URL: &str = "https://api.github.com/search/repositories";

/// Stars a young repo needs before we call it a spike.
const MIN_STARS: u32 = 50;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    full_name: String,
    html_url: String,
    stargazers_count: u32,
    created_at: DateTime<Utc>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    description: Option<String>,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
    #[serde(rename = "type")]
    owner_type: String,
}

pub struct GithubTrendingCollector {
    token: Option<String>,
}

impl GithubTrendingCollector {
    pub const NAME: &'static str = "github_trending";

    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Collector for GithubTrendingCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ping_url(&self) -> Option<&'static str> {
        Some("https://api.github.com/")
    }

    async fn fetch(&self, ctx: &CollectContext) -> Result<FetchOutput> {
        let url = format!(
            "{SEARCH_URL}?q=created:>={}+stars:>={MIN_STARS}&sort=stars&order=desc&per_page=100",
            ctx.window_start_date()
        );
        let mut request = ctx.http.http().get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = ctx
            .http
            .execute(Self::NAME, "search", &ctx.cancel, request)
            .await?;
        let parsed: SearchResponse = response.json().await.map_err(|e| {
            dealsignal_common::PipelineError::Permanent(format!("malformed search response: {e}"))
        })?;
        Ok(map_repos(parsed.items))
    }
}

fn map_repos(repos: Vec<Repo>) -> FetchOutput {
    let mut output = FetchOutput::default();

    for repo in repos {
        if repo.stargazers_count < MIN_STARS {
            continue;
        }

        let evidence = IdentityEvidence {
            // A real homepage beats the repo slug as identity.
            website: repo.homepage.clone().filter(|h| !h.is_empty()),
            github_org: (repo.owner.owner_type == "Organization")
                .then(|| repo.owner.login.clone()),
            github_repo: Some(repo.full_name.clone()),
            ..Default::default()
        };
        let key = match primary_key(&evidence) {
            Ok(key) => key,
            Err(e) => {
                output.push_error(format!("{}: {e}", repo.full_name));
                continue;
            }
        };

        // More stars, more belief, capped well below certainty.
        let confidence = (0.5 + f64::from(repo.stargazers_count) / 2000.0).min(0.85);

        let mut signal = NewSignal::new(
            SignalType::GithubSpike,
            GithubTrendingCollector::NAME,
            key.to_string(),
            repo.created_at,
        )
        .with_company_name(&repo.owner.login)
        .with_confidence(confidence)
        .with_raw_data(serde_json::json!({
            "repo": repo.full_name,
            "stars": repo.stargazers_count,
            "homepage": repo.homepage,
            "description": repo.description,
        }))
        .with_source_url(repo.html_url.clone());

        if !key.is_strong() {
            signal = signal.with_warning_flag("repo_identity_only");
        }
        output.push_signal(signal);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repos() -> Vec<Repo> {
        serde_json::from_value(serde_json::json!([
            {
                "full_name": "acme-ai/inference-engine",
                "html_url": "https://github.com/acme-ai/inference-engine",
                "stargazers_count": 900,
                "created_at": "2026-07-10T12:00:00Z",
                "homepage": "https://acme.ai",
                "description": "Fast inference",
                "owner": {"login": "acme-ai", "type": "Organization"}
            },
            {
                "full_name": "solo-dev/weekend-project",
                "html_url": "https://github.com/solo-dev/weekend-project",
                "stargazers_count": 120,
                "created_at": "2026-07-12T08:00:00Z",
                "homepage": null,
                "description": null,
                "owner": {"login": "solo-dev", "type": "User"}
            },
            {
                "full_name": "quiet/repo",
                "html_url": "https://github.com/quiet/repo",
                "stargazers_count": 3,
                "created_at": "2026-07-13T08:00:00Z",
                "owner": {"login": "quiet", "type": "User"}
            }
        ]))
        .unwrap()
    }

    #[test]
    fn homepage_wins_over_repo_slug() {
        let output = map_repos(repos());
        assert_eq!(output.signals[0].canonical_key, "domain:acme.ai");
        assert!(output.signals[0].warning_flags.is_empty());
    }

    #[test]
    fn user_repo_without_homepage_gets_weak_key_and_flag() {
        let output = map_repos(repos());
        let signal = &output.signals[1];
        assert_eq!(signal.canonical_key, "github_repo:solo-dev/weekend-project");
        assert_eq!(signal.warning_flags, vec!["repo_identity_only"]);
    }

    #[test]
    fn low_star_repos_are_filtered_out() {
        let output = map_repos(repos());
        assert_eq!(output.signals.len(), 2);
        assert!(output.errors.is_empty());
    }

    #[test]
    fn confidence_scales_with_stars_but_caps() {
        let output = map_repos(repos());
        assert!((output.signals[0].confidence - 0.85).abs() < 1e-9); // 900 stars hits the cap
        assert!((output.signals[1].confidence - 0.56).abs() < 1e-9);
    }
}
